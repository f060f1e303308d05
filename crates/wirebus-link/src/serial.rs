//! Serial port link for Modbus RTU.

use crate::LinkError;
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf};
use tokio::sync::mpsc;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, warn};
use wirebus_core::{RecvHandler, Transport};

/// Line settings for a serial link.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            parity: Parity::None,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

/// A serial port speaking Modbus RTU.
///
/// Must be constructed inside a tokio runtime.
#[derive(Debug)]
pub struct SerialLink {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    reader: Mutex<Option<ReadHalf<SerialStream>>>,
}

impl SerialLink {
    pub fn open(path: &str, baud_rate: u32, config: SerialConfig) -> Result<Self, LinkError> {
        let builder = tokio_serial::new(path, baud_rate)
            .parity(config.parity)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control);
        let stream = builder.open_native_async().map_err(|err| {
            LinkError::Io(std::io::Error::other(format!(
                "failed to open serial port '{path}': {err}"
            )))
        })?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: SerialStream) -> Self {
        let (reader, mut writer) = tokio::io::split(stream);
        let (outgoing, mut pending) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            while let Some(frame) = pending.recv().await {
                if let Err(err) = writer.write_all(&frame).await {
                    debug!(error = %err, "serial link write failed");
                    break;
                }
                if let Err(err) = writer.flush().await {
                    debug!(error = %err, "serial link flush failed");
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

impl Transport for SerialLink {
    fn register_handler(&self, mut handler: RecvHandler) {
        let mut slot = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut reader) = slot.take() else {
            warn!("serial link handler already registered, ignoring");
            return;
        };
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        debug!("serial link closed");
                        break;
                    }
                    Ok(n) => handler(&buf[..n]),
                    Err(err) => {
                        debug!(error = %err, "serial link read failed");
                        break;
                    }
                }
            }
        });
    }

    fn send(&self, bytes: &[u8]) {
        if self.outgoing.send(bytes.to_vec()).is_err() {
            debug!("serial link writer gone, dropping outgoing frame");
        }
    }
}
