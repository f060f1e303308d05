//! Transport-agnostic Modbus protocol engine.
//!
//! `wirebus-core` turns an opaque byte stream into typed Modbus packets and
//! typed packets back into wire bytes. Transports push arriving chunks into
//! the bus, which reassembles TCP (MBAP) or RTU frames — however the stream
//! is fragmented — and hands each parsed packet to a host callback. The
//! engine is a pure state machine: it does no I/O, spawns nothing and takes
//! its notion of time from the host.

#![forbid(unsafe_code)]

pub mod bus;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod pdu;

pub use bus::{Bus, Config, Framing, RecvHandler, Role, Transport};
pub use error::{BusError, Truncated};
pub use pdu::{ExceptionCode, FunctionCode, Header, Packet};
