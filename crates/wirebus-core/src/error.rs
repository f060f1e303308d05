use thiserror::Error;

/// Out-of-bounds access in the byte codec.
///
/// The codec signals truncation instead of panicking; parsers translate it
/// into their buffer-more sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("read past end of buffer")]
pub struct Truncated;

/// Errors surfaced by the bus facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    /// An RTU slave would need auto-response logic the engine does not have.
    #[error("cannot construct an rtu slave")]
    RtuSlaveUnsupported,
    /// The engine-internal error packets have no wire representation.
    #[error("packet kind cannot be serialized")]
    NotSendable,
    /// A payload length does not fit the wire format's length field.
    #[error("packet body too large for its length field")]
    BodyTooLarge,
}
