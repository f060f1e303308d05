use crate::encoding::Writer;
use crate::error::BusError;
use crate::frame;
use crate::pdu::Packet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, trace};

/// The receive cache never grows past this; older bytes are dropped first.
const MAX_CACHE_LEN: usize = 8192;

/// Which side of the conversation this bus parses for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends requests, parses responses.
    Master,
    /// Receives requests, parses them for the host.
    Slave,
}

/// Wire format spoken on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// MBAP-framed Modbus TCP.
    Tcp,
    /// CRC-trailed Modbus RTU.
    Rtu,
}

/// Callback receiving each chunk of bytes a transport delivers.
pub type RecvHandler = Box<dyn FnMut(&[u8]) + Send>;

/// The transport contract the bus consumes.
///
/// Implementations deliver arriving bytes (any chunking, including empty)
/// through the registered handler and forward outgoing buffers verbatim.
pub trait Transport {
    fn register_handler(&self, handler: RecvHandler);
    fn send(&self, bytes: &[u8]);
}

/// Bus configuration, immutable after construction.
pub struct Config {
    /// Host-supplied monotonic clock; any unit, consistent with
    /// `silence_timeout`.
    pub now: Box<dyn Fn() -> i64 + Send>,
    /// Longest quiet interval tolerated while the cache holds a partial
    /// frame.
    pub silence_timeout: i64,
    /// Close the bus on silence instead of discarding the cache.
    pub close_on_timeout: bool,
    /// Close the bus on any malformed packet instead of reporting it.
    pub close_on_error: bool,
    pub role: Role,
    pub framing: Framing,
    /// Local station address; zero accepts any station.
    pub address: u8,
}

impl Config {
    pub fn new(role: Role, framing: Framing, now: impl Fn() -> i64 + Send + 'static) -> Self {
        Self {
            now: Box::new(now),
            silence_timeout: 1000,
            close_on_timeout: false,
            close_on_error: false,
            role,
            framing,
            address: 0,
        }
    }

    pub fn with_silence_timeout(mut self, silence_timeout: i64) -> Self {
        self.silence_timeout = silence_timeout;
        self
    }

    pub fn with_close_on_timeout(mut self, close_on_timeout: bool) -> Self {
        self.close_on_timeout = close_on_timeout;
        self
    }

    pub fn with_close_on_error(mut self, close_on_error: bool) -> Self {
        self.close_on_error = close_on_error;
        self
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }
}

struct Core {
    config: Config,
    emit: Box<dyn FnMut(Packet) + Send>,
    cache: Vec<u8>,
    closed: bool,
    error_string: String,
    last_byte_received_time: i64,
}

impl Core {
    fn close(&mut self, reason: &str) {
        if !self.closed {
            debug!(reason, "bus closed");
            self.error_string = reason.to_string();
        }
        self.closed = true;
    }

    /// Silence check shared by `feed` and the host-visible refresh.
    ///
    /// The receive timestamp only advances when bytes actually arrived, so a
    /// polling call cannot mask an ongoing silence.
    fn refresh_timeouts(&mut self, bytes_received: bool) {
        let now = (self.config.now)();
        let difference = now - self.last_byte_received_time;
        if bytes_received {
            self.last_byte_received_time = now;
        }
        if difference > self.config.silence_timeout && !self.cache.is_empty() {
            if self.config.close_on_timeout {
                self.close("timeout");
            } else {
                trace!(discarded = self.cache.len(), "silence expired, clearing cache");
                self.cache.clear();
            }
        }
    }

    fn feed(&mut self, data: &[u8]) {
        if self.closed {
            return;
        }
        self.refresh_timeouts(!data.is_empty());
        if self.closed {
            return;
        }
        self.cache.extend_from_slice(data);
        if self.cache.len() > MAX_CACHE_LEN {
            let excess = self.cache.len() - MAX_CACHE_LEN;
            self.cache.drain(..excess);
        }
        if self.cache.is_empty() {
            return;
        }
        let Self {
            cache,
            config,
            emit,
            ..
        } = self;
        let reason = match config.framing {
            Framing::Tcp => {
                frame::tcp::extract(cache, config.role, config.address, config.close_on_error, emit)
            }
            Framing::Rtu => {
                frame::rtu::extract(cache, config.role, config.address, config.close_on_error, emit)
            }
        };
        if let Some(reason) = reason {
            self.close(&reason);
        }
    }

    fn frame_adu(&self, packet: &Packet) -> Result<Vec<u8>, BusError> {
        let mut body = Vec::new();
        packet.encode_body(&mut Writer::new(&mut body))?;
        let mut adu = Vec::new();
        match self.config.framing {
            Framing::Tcp => {
                frame::tcp::encode_adu(&mut adu, packet.header(), packet.wire_function(), &body)?;
            }
            Framing::Rtu => {
                frame::rtu::encode_adu(&mut adu, packet.header(), packet.wire_function(), &body);
            }
        }
        Ok(adu)
    }
}

fn lock(core: &Mutex<Core>) -> MutexGuard<'_, Core> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One Modbus conversation over one transport.
///
/// The bus owns its receive cache and parser state; the transport is held
/// weakly, and the receive handler registered into the transport holds the
/// engine state weakly in turn, so either side may be dropped first. Bytes
/// delivered after the bus is gone are silently discarded.
///
/// Calls on one bus must be serialized by the host, and the emission
/// callback must not call back into the bus.
pub struct Bus<T: Transport + ?Sized> {
    core: Arc<Mutex<Core>>,
    transport: Weak<T>,
}

impl<T: Transport + ?Sized> Bus<T> {
    /// Bind a transport and start parsing whatever it delivers.
    ///
    /// An RTU slave is refused: answering RTU requests needs auto-response
    /// logic the engine does not provide.
    pub fn new(
        transport: &Arc<T>,
        config: Config,
        emit: impl FnMut(Packet) + Send + 'static,
    ) -> Result<Self, BusError> {
        if config.role == Role::Slave && config.framing == Framing::Rtu {
            return Err(BusError::RtuSlaveUnsupported);
        }
        let last_byte_received_time = (config.now)();
        let core = Arc::new(Mutex::new(Core {
            config,
            emit: Box::new(emit),
            cache: Vec::new(),
            closed: false,
            error_string: String::new(),
            last_byte_received_time,
        }));
        let weak = Arc::downgrade(&core);
        transport.register_handler(Box::new(move |bytes| {
            if let Some(core) = weak.upgrade() {
                lock(&core).feed(bytes);
            }
        }));
        Ok(Self {
            core,
            transport: Arc::downgrade(transport),
        })
    }

    /// Frame one packet and hand it to the transport.
    ///
    /// Exactly one ADU reaches the transport per call. Sending still works
    /// after the bus closed; a transport that is already gone is tolerated
    /// and the frame is dropped.
    pub fn send(&self, packet: &Packet) -> Result<(), BusError> {
        let adu = lock(&self.core).frame_adu(packet)?;
        if let Some(transport) = self.transport.upgrade() {
            trace!(len = adu.len(), "sending adu");
            transport.send(&adu);
        } else {
            trace!("transport gone, dropping outgoing adu");
        }
        Ok(())
    }

    /// Whether the bus is still open. Transitions to closed are one-way.
    pub fn open(&self) -> bool {
        !lock(&self.core).closed
    }

    /// The reason for the first close, or an empty string while open.
    pub fn error_string(&self) -> String {
        lock(&self.core).error_string.clone()
    }

    pub fn close(&self) {
        lock(&self.core).close("user");
    }

    /// Re-evaluate the silence timeout without feeding bytes.
    pub fn refresh_timeouts(&self) {
        lock(&self.core).refresh_timeouts(false);
    }
}
