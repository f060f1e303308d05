//! Streaming framers for the two wire formats.

pub mod rtu;
pub mod tcp;

use crate::bus::Role;

/// Station filter: masters accept everything, a slave accepts its own
/// address and the broadcast address, and local address zero accepts any.
pub(crate) fn accepts(role: Role, local_address: u8, address: u8) -> bool {
    role == Role::Master || local_address == 0 || address == local_address || address == 0
}
