//! Transport bindings for the wirebus engine.
//!
//! Each link implements the engine's [`Transport`] contract: arriving bytes
//! are pushed into the registered handler, outgoing buffers are forwarded
//! verbatim. The tokio-backed links bridge the synchronous engine to async
//! I/O with a reader task per connection and a writer task draining an
//! outgoing channel, so `send` never blocks the caller.

#![forbid(unsafe_code)]

#[cfg(feature = "serial")]
pub mod serial;
#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialLink};

use std::sync::Mutex;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wirebus_core::{RecvHandler, Transport};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A Modbus TCP connection.
///
/// Bytes read from the socket are delivered to the registered handler in
/// whatever chunks the network produces; the engine reassembles frames.
/// Must be constructed inside a tokio runtime.
#[derive(Debug)]
pub struct TcpLink {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    reader: Mutex<Option<OwnedReadHalf>>,
}

impl TcpLink {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, LinkError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (reader, mut writer) = stream.into_split();
        let (outgoing, mut pending) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            while let Some(frame) = pending.recv().await {
                if let Err(err) = writer.write_all(&frame).await {
                    debug!(error = %err, "tcp link write failed");
                    break;
                }
            }
        });
        Self {
            outgoing,
            reader: Mutex::new(Some(reader)),
        }
    }
}

impl Transport for TcpLink {
    fn register_handler(&self, mut handler: RecvHandler) {
        let mut slot = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut reader) = slot.take() else {
            warn!("tcp link handler already registered, ignoring");
            return;
        };
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        debug!("tcp link peer closed the connection");
                        break;
                    }
                    Ok(n) => handler(&buf[..n]),
                    Err(err) => {
                        debug!(error = %err, "tcp link read failed");
                        break;
                    }
                }
            }
        });
    }

    fn send(&self, bytes: &[u8]) {
        if self.outgoing.send(bytes.to_vec()).is_err() {
            debug!("tcp link writer gone, dropping outgoing frame");
        }
    }
}

/// Two in-memory endpoints wired back to back.
///
/// Bytes sent on one endpoint are handed synchronously to the handler
/// registered on the other. Useful for tests and for running a master and a
/// slave engine in one process.
pub struct PairLink {
    local: SharedHandler,
    peer: SharedHandler,
}

type SharedHandler = std::sync::Arc<Mutex<Option<RecvHandler>>>;

impl PairLink {
    pub fn pair() -> (std::sync::Arc<Self>, std::sync::Arc<Self>) {
        let left: SharedHandler = SharedHandler::default();
        let right: SharedHandler = SharedHandler::default();
        let a = Self {
            local: left.clone(),
            peer: right.clone(),
        };
        let b = Self {
            local: right,
            peer: left,
        };
        (std::sync::Arc::new(a), std::sync::Arc::new(b))
    }
}

impl Transport for PairLink {
    fn register_handler(&self, handler: RecvHandler) {
        let mut slot = self.local.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            warn!("pair link handler already registered, replacing");
        }
        *slot = Some(handler);
    }

    fn send(&self, bytes: &[u8]) {
        let mut slot = self.peer.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_mut() {
            Some(handler) => handler(bytes),
            None => debug!("pair link peer has no handler, dropping frame"),
        }
    }
}
