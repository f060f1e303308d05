use crate::bus::Role;
use crate::encoding::Writer;
use crate::error::BusError;
use crate::frame::accepts;
use crate::pdu::{Header, Packet, ParseOutcome};
use tracing::trace;

/// MBAP header plus the function byte.
pub(crate) const MIN_ADU_LEN: usize = 8;

pub(crate) fn encode_adu(
    out: &mut Vec<u8>,
    header: &Header,
    wire_function: u8,
    body: &[u8],
) -> Result<(), BusError> {
    let length: u16 = (body.len() + 2)
        .try_into()
        .map_err(|_| BusError::BodyTooLarge)?;
    let mut w = Writer::new(out);
    w.write_be_u16(header.transaction_id);
    w.write_be_u16(0);
    w.write_be_u16(length);
    w.write_u8(header.address);
    w.write_u8(wire_function);
    w.write_all(body);
    Ok(())
}

/// Extract every complete ADU from the cache.
///
/// Returns `Some(reason)` when a framing error forces the bus closed;
/// `None` means the loop stopped waiting for more bytes.
pub(crate) fn extract(
    cache: &mut Vec<u8>,
    role: Role,
    local_address: u8,
    close_on_error: bool,
    emit: &mut impl FnMut(Packet),
) -> Option<String> {
    loop {
        let [t0, t1, p0, p1, l0, l1, address, function, rest @ ..] = cache.as_slice() else {
            return None;
        };
        let transaction_id = u16::from_be_bytes([*t0, *t1]);
        if u16::from_be_bytes([*p0, *p1]) != 0 {
            return Some("invalid protocol id".to_string());
        }
        let length = u16::from_be_bytes([*l0, *l1]);
        if length < 2 {
            return Some("invalid length".to_string());
        }
        let body_len = usize::from(length) - 2;
        if rest.len() < body_len {
            return None;
        }
        let address = *address;
        let raw_function = *function;
        let outcome = accepts(role, local_address, address).then(|| {
            Packet::parse_body(role, transaction_id, address, raw_function, &rest[..body_len])
        });
        cache.drain(..MIN_ADU_LEN + body_len);
        let Some(outcome) = outcome else {
            trace!(address, "dropping frame for another station");
            continue;
        };
        match outcome {
            // The full declared payload was available, so a parser asking
            // for more bytes means the length field and payload disagree.
            ParseOutcome::NotEnoughData => {
                return Some(format!("not enough data read: 0/{body_len}"));
            }
            ParseOutcome::Parsed { packet, consumed } => {
                if packet.is_error_report() {
                    if close_on_error {
                        return Some("packet error".to_string());
                    }
                    emit(packet);
                } else if consumed != body_len {
                    return Some(format!("not enough data read: {consumed}/{body_len}"));
                } else {
                    trace!(transaction_id, address, function = raw_function, "emitting packet");
                    emit(packet);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{encode_adu, extract};
    use crate::bus::Role;
    use crate::pdu::{FunctionCode, Header, Packet};

    fn run(cache: &mut Vec<u8>, role: Role, local_address: u8) -> (Vec<Packet>, Option<String>) {
        let mut packets = Vec::new();
        let reason = extract(cache, role, local_address, false, &mut |p| packets.push(p));
        (packets, reason)
    }

    #[test]
    fn encodes_mbap_header() {
        let header = Header::new(0x0001, 0x11, FunctionCode::ReadHoldingRegisters);
        let mut out = Vec::new();
        encode_adu(&mut out, &header, 0x03, &[0x00, 0x6B, 0x00, 0x03]).unwrap();
        assert_eq!(
            out,
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]
        );
    }

    #[test]
    fn extracts_single_request() {
        let mut cache = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x42, 0x01, 0x01, 0x00, 0x00, 0x01];
        let (packets, reason) = run(&mut cache, Role::Slave, 0x42);
        assert_eq!(reason, None);
        assert!(cache.is_empty());
        match &packets[..] {
            [Packet::ReadCoilsRequest(request)] => {
                assert_eq!(request.header.address, 0x42);
                assert_eq!(request.first_coil, 0x0100);
                assert_eq!(request.coil_count, 1);
            }
            other => panic!("unexpected packets: {other:?}"),
        }
    }

    #[test]
    fn wrong_address_is_consumed_silently() {
        let mut cache = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x43, 0x01, 0x01, 0x00, 0x00, 0x01];
        let (packets, reason) = run(&mut cache, Role::Slave, 0x42);
        assert_eq!(reason, None);
        assert!(packets.is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn nonzero_protocol_id_closes() {
        let mut cache = vec![0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 0x42, 0x01, 0x01, 0x00, 0x00, 0x01];
        let (packets, reason) = run(&mut cache, Role::Slave, 0x42);
        assert_eq!(reason.as_deref(), Some("invalid protocol id"));
        assert!(packets.is_empty());
    }

    #[test]
    fn undersized_length_closes() {
        let mut cache = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x42, 0x01];
        let (_, reason) = run(&mut cache, Role::Slave, 0x42);
        assert_eq!(reason.as_deref(), Some("invalid length"));
    }

    #[test]
    fn declared_length_longer_than_parse_closes() {
        // Read-coils request payload plus one stray byte the parser never touches.
        let mut cache = vec![
            0x00, 0x00, 0x00, 0x00, 0x00, 0x07, 0x42, 0x01, 0x01, 0x00, 0x00, 0x01, 0xAA,
        ];
        let (packets, reason) = run(&mut cache, Role::Slave, 0x42);
        assert_eq!(reason.as_deref(), Some("not enough data read: 4/5"));
        assert!(packets.is_empty());
    }

    #[test]
    fn waits_for_full_declared_payload() {
        let mut cache = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x42, 0x01, 0x01, 0x00];
        let (packets, reason) = run(&mut cache, Role::Slave, 0x42);
        assert_eq!(reason, None);
        assert!(packets.is_empty());
        assert_eq!(cache.len(), 10);
    }
}
