use crate::bus::Role;
use crate::encoding::Writer;
use crate::frame::accepts;
use crate::pdu::{Header, Packet, ParseOutcome};
use tracing::trace;

/// Station address, function byte and the two CRC bytes.
pub(crate) const MIN_ADU_LEN: usize = 4;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC16_TABLE: [u16; 256] = build_crc16_table();

/// Modbus RTU CRC-16, byte-swapped so the low CRC byte goes first on the
/// wire when the result is written big-endian.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for byte in data {
        let idx = ((crc ^ u16::from(*byte)) & 0x00FF) as usize;
        crc = (crc >> 8) ^ CRC16_TABLE[idx];
    }
    crc.rotate_left(8)
}

pub(crate) fn encode_adu(out: &mut Vec<u8>, header: &Header, wire_function: u8, body: &[u8]) {
    let mut w = Writer::new(out);
    w.write_u8(header.address);
    w.write_u8(wire_function);
    w.write_all(body);
    let crc = crc16(w.as_written());
    w.write_be_u16(crc);
}

/// Try to read one complete frame at the start of `buf`.
///
/// Returns the frame length (CRC included) and the parsed packet, or `None`
/// if no CRC-valid frame starts here.
fn try_frame(buf: &[u8], role: Role) -> Option<(usize, Packet)> {
    let [address, function, body @ ..] = buf else {
        return None;
    };
    let outcome = Packet::parse_body(role, 0, *address, *function, body);
    let ParseOutcome::Parsed { packet, consumed } = outcome else {
        return None;
    };
    let frame_len = 2 + consumed;
    let crc_bytes = buf.get(frame_len..frame_len + 2)?;
    let wire_crc = u16::from_be_bytes([crc_bytes[0], crc_bytes[1]]);
    if wire_crc != crc16(&buf[..frame_len]) {
        return None;
    }
    Some((frame_len + 2, packet))
}

/// Extract every complete frame from the cache.
///
/// RTU carries no length field, so a failed parse or CRC mismatch at the
/// cache head may just mean the receiver started mid-frame: the engine
/// retries at every offset and accepts the first CRC-valid frame, discarding
/// the noise in front of it.
pub(crate) fn extract(
    cache: &mut Vec<u8>,
    role: Role,
    local_address: u8,
    close_on_error: bool,
    emit: &mut impl FnMut(Packet),
) -> Option<String> {
    loop {
        if cache.len() < MIN_ADU_LEN {
            return None;
        }
        let mut hit = None;
        for offset in 0..cache.len() {
            if let Some((frame_len, packet)) = try_frame(&cache[offset..], role) {
                hit = Some((offset, frame_len, packet));
                break;
            }
        }
        let Some((offset, frame_len, packet)) = hit else {
            return None;
        };
        if offset > 0 {
            trace!(discarded = offset, "resynchronized rtu stream");
        }
        let address = packet.header().address;
        cache.drain(..offset + frame_len);
        if !accepts(role, local_address, address) {
            trace!(address, "dropping frame for another station");
            continue;
        }
        if packet.is_error_report() {
            if close_on_error {
                return Some("packet error".to_string());
            }
            emit(packet);
            continue;
        }
        trace!(address, frame_len, "emitting packet");
        emit(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::{crc16, encode_adu, extract};
    use crate::bus::Role;
    use crate::pdu::{FunctionCode, Header, Packet};

    fn collect(cache: &mut Vec<u8>, role: Role) -> Vec<Packet> {
        let mut packets = Vec::new();
        let reason = extract(cache, role, 0, false, &mut |p| packets.push(p));
        assert_eq!(reason, None);
        packets
    }

    #[test]
    fn crc16_known_vectors() {
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), 0xC5CD);
        assert_eq!(crc16(&[0x01, 0x04, 0x02, 0xFF, 0xFF]), 0xB880);
        assert_eq!(crc16(&[0x01, 0x04, 0x00, 0x35, 0x00, 0x27]), 0x001E);
    }

    #[test]
    fn encode_appends_crc_low_byte_first() {
        let header = Header::new(0, 0x01, FunctionCode::ReadInputRegisters);
        let mut out = Vec::new();
        encode_adu(&mut out, &header, 0x04, &[0x00, 0x35, 0x00, 0x27]);
        assert_eq!(out, &[0x01, 0x04, 0x00, 0x35, 0x00, 0x27, 0x00, 0x1E]);
    }

    #[test]
    fn extracts_frame_at_cache_head() {
        let mut cache = vec![0x01, 0x04, 0x02, 0xFF, 0xFF, 0xB8, 0x80];
        let packets = collect(&mut cache, Role::Master);
        assert_eq!(packets.len(), 1);
        assert!(cache.is_empty());
        match &packets[0] {
            Packet::ReadInputRegistersResponse(response) => {
                assert_eq!(response.register_data, vec![0xFFFF]);
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn skips_noise_before_frame() {
        let mut cache = vec![0x55, 0x01, 0x04, 0x02, 0xFF, 0xFF, 0xB8, 0x80];
        let packets = collect(&mut cache, Role::Master);
        assert_eq!(packets.len(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn keeps_partial_frame() {
        let mut cache = vec![0x01, 0x04, 0x02, 0xFF, 0xFF, 0xB8];
        let packets = collect(&mut cache, Role::Master);
        assert!(packets.is_empty());
        assert_eq!(cache.len(), 6);
    }

    #[test]
    fn corrupted_crc_yields_nothing() {
        let mut cache = vec![0x01, 0x04, 0x02, 0xFF, 0xFF, 0xB8, 0x81];
        let packets = collect(&mut cache, Role::Master);
        assert!(packets.is_empty());
    }
}
