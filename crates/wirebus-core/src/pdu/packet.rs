use crate::bus::Role;
use crate::encoding::Writer;
use crate::error::{BusError, Truncated};
use crate::pdu::{
    ExceptionResponse, FunctionCode, ReadCoilsRequest, ReadCoilsResponse,
    ReadHoldingRegistersRequest, ReadHoldingRegistersResponse, ReadInputRegistersRequest,
    ReadInputRegistersResponse, WriteMultipleRegistersRequest, WriteMultipleRegistersResponse,
    WriteSingleRegisterRequest, WriteSingleRegisterResponse,
};

/// Fields shared by every packet: the TCP transaction id (zero on RTU), the
/// station address and the function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    pub transaction_id: u16,
    pub address: u8,
    pub function: FunctionCode,
}

impl Header {
    pub const fn new(transaction_id: u16, address: u8, function: FunctionCode) -> Self {
        Self {
            transaction_id,
            address,
            function,
        }
    }
}

/// Why a packet body failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyError {
    /// The body is shorter than the packet needs; buffer more bytes.
    NotEnoughData,
    /// A declared length is structurally impossible.
    Malformed,
    /// Declared element count and byte count disagree.
    Internal { consumed: usize },
}

impl From<Truncated> for BodyError {
    fn from(_: Truncated) -> Self {
        Self::NotEnoughData
    }
}

/// Result of running a per-function parser over a packet body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParseOutcome {
    /// A packet (possibly an error report) plus the payload bytes it covers.
    Parsed { packet: Packet, consumed: usize },
    /// Wait for more bytes; never surfaced to the host.
    NotEnoughData,
}

pub(crate) fn read_u16_array(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

pub(crate) fn write_u16_array(w: &mut Writer<'_>, values: &[u16]) {
    for value in values {
        w.write_be_u16(*value);
    }
}

/// Every packet the engine can emit or send.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Packet {
    ReadCoilsRequest(ReadCoilsRequest),
    ReadCoilsResponse(ReadCoilsResponse),
    ReadHoldingRegistersRequest(ReadHoldingRegistersRequest),
    ReadHoldingRegistersResponse(ReadHoldingRegistersResponse),
    ReadInputRegistersRequest(ReadInputRegistersRequest),
    ReadInputRegistersResponse(ReadInputRegistersResponse),
    WriteSingleRegisterRequest(WriteSingleRegisterRequest),
    WriteSingleRegisterResponse(WriteSingleRegisterResponse),
    WriteMultipleRegistersRequest(WriteMultipleRegistersRequest),
    WriteMultipleRegistersResponse(WriteMultipleRegistersResponse),
    ExceptionResponse(ExceptionResponse),
    /// A recognized function code with a payload the engine cannot accept.
    PacketError { header: Header },
    /// A function code the engine does not know.
    UnknownPacket { header: Header },
    /// A structurally valid frame whose fields contradict each other.
    InternalError { header: Header },
}

impl Packet {
    pub fn header(&self) -> &Header {
        match self {
            Self::ReadCoilsRequest(p) => &p.header,
            Self::ReadCoilsResponse(p) => &p.header,
            Self::ReadHoldingRegistersRequest(p) => &p.header,
            Self::ReadHoldingRegistersResponse(p) => &p.header,
            Self::ReadInputRegistersRequest(p) => &p.header,
            Self::ReadInputRegistersResponse(p) => &p.header,
            Self::WriteSingleRegisterRequest(p) => &p.header,
            Self::WriteSingleRegisterResponse(p) => &p.header,
            Self::WriteMultipleRegistersRequest(p) => &p.header,
            Self::WriteMultipleRegistersResponse(p) => &p.header,
            Self::ExceptionResponse(p) => &p.header,
            Self::PacketError { header }
            | Self::UnknownPacket { header }
            | Self::InternalError { header } => header,
        }
    }

    /// Whether this packet reports a parse failure instead of wire content.
    pub fn is_error_report(&self) -> bool {
        matches!(
            self,
            Self::PacketError { .. } | Self::UnknownPacket { .. } | Self::InternalError { .. }
        )
    }

    /// The function byte this packet puts on the wire.
    pub(crate) fn wire_function(&self) -> u8 {
        match self {
            Self::ExceptionResponse(p) => p.header.function.as_u8() | 0x80,
            other => other.header().function.as_u8(),
        }
    }

    /// Parse one packet body.
    ///
    /// `role` selects the parser direction: masters parse responses, slaves
    /// parse requests. On the master side any function byte with the
    /// exception bit set is an exception response carrying one byte of
    /// exception code, whatever the underlying function is.
    pub(crate) fn parse_body(
        role: Role,
        transaction_id: u16,
        address: u8,
        raw_function: u8,
        body: &[u8],
    ) -> ParseOutcome {
        if role == Role::Master && FunctionCode::is_exception(raw_function) {
            let function = FunctionCode::from_u8(raw_function & 0x7F);
            let header = Header::new(transaction_id, address, function);
            return finish(header, ExceptionResponse::parse_body(header, body), Self::ExceptionResponse);
        }

        let function = FunctionCode::from_u8(raw_function);
        let header = Header::new(transaction_id, address, function);
        match (role, function) {
            (Role::Master, FunctionCode::ReadCoils) => {
                finish(header, ReadCoilsResponse::parse_body(header, body), Self::ReadCoilsResponse)
            }
            (Role::Master, FunctionCode::ReadHoldingRegisters) => finish(
                header,
                ReadHoldingRegistersResponse::parse_body(header, body),
                Self::ReadHoldingRegistersResponse,
            ),
            (Role::Master, FunctionCode::ReadInputRegisters) => finish(
                header,
                ReadInputRegistersResponse::parse_body(header, body),
                Self::ReadInputRegistersResponse,
            ),
            (Role::Master, FunctionCode::WriteSingleRegister) => finish(
                header,
                WriteSingleRegisterResponse::parse_body(header, body),
                Self::WriteSingleRegisterResponse,
            ),
            (Role::Master, FunctionCode::WriteMultipleRegisters) => finish(
                header,
                WriteMultipleRegistersResponse::parse_body(header, body),
                Self::WriteMultipleRegistersResponse,
            ),
            (Role::Slave, FunctionCode::ReadCoils) => {
                finish(header, ReadCoilsRequest::parse_body(header, body), Self::ReadCoilsRequest)
            }
            (Role::Slave, FunctionCode::ReadHoldingRegisters) => finish(
                header,
                ReadHoldingRegistersRequest::parse_body(header, body),
                Self::ReadHoldingRegistersRequest,
            ),
            (Role::Slave, FunctionCode::ReadInputRegisters) => finish(
                header,
                ReadInputRegistersRequest::parse_body(header, body),
                Self::ReadInputRegistersRequest,
            ),
            (Role::Slave, FunctionCode::WriteSingleRegister) => finish(
                header,
                WriteSingleRegisterRequest::parse_body(header, body),
                Self::WriteSingleRegisterRequest,
            ),
            (Role::Slave, FunctionCode::WriteMultipleRegisters) => finish(
                header,
                WriteMultipleRegistersRequest::parse_body(header, body),
                Self::WriteMultipleRegistersRequest,
            ),
            (_, FunctionCode::Unknown(_)) => ParseOutcome::Parsed {
                packet: Self::UnknownPacket { header },
                consumed: 0,
            },
            // Recognized codes without a parser for this direction.
            _ => ParseOutcome::Parsed {
                packet: Self::PacketError { header },
                consumed: 0,
            },
        }
    }

    /// Serialize the packet body (everything after the function byte).
    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), BusError> {
        match self {
            Self::ReadCoilsRequest(p) => Ok(p.encode_body(w)),
            Self::ReadCoilsResponse(p) => p.encode_body(w),
            Self::ReadHoldingRegistersRequest(p) => Ok(p.encode_body(w)),
            Self::ReadHoldingRegistersResponse(p) => p.encode_body(w),
            Self::ReadInputRegistersRequest(p) => Ok(p.encode_body(w)),
            Self::ReadInputRegistersResponse(p) => p.encode_body(w),
            Self::WriteSingleRegisterRequest(p) => Ok(p.encode_body(w)),
            Self::WriteSingleRegisterResponse(p) => Ok(p.encode_body(w)),
            Self::WriteMultipleRegistersRequest(p) => p.encode_body(w),
            Self::WriteMultipleRegistersResponse(p) => Ok(p.encode_body(w)),
            Self::ExceptionResponse(p) => Ok(p.encode_body(w)),
            Self::PacketError { .. } | Self::UnknownPacket { .. } | Self::InternalError { .. } => {
                Err(BusError::NotSendable)
            }
        }
    }
}

fn finish<P>(
    header: Header,
    result: Result<(P, usize), BodyError>,
    wrap: impl FnOnce(P) -> Packet,
) -> ParseOutcome {
    match result {
        Ok((packet, consumed)) => ParseOutcome::Parsed {
            packet: wrap(packet),
            consumed,
        },
        Err(BodyError::NotEnoughData) => ParseOutcome::NotEnoughData,
        Err(BodyError::Malformed) => ParseOutcome::Parsed {
            packet: Packet::PacketError { header },
            consumed: 0,
        },
        Err(BodyError::Internal { consumed }) => ParseOutcome::Parsed {
            packet: Packet::InternalError { header },
            consumed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{Packet, ParseOutcome};
    use crate::bus::Role;
    use crate::encoding::Writer;
    use crate::error::BusError;
    use crate::pdu::{ExceptionCode, FunctionCode};

    fn parsed(outcome: ParseOutcome) -> (Packet, usize) {
        match outcome {
            ParseOutcome::Parsed { packet, consumed } => (packet, consumed),
            ParseOutcome::NotEnoughData => panic!("expected a parsed packet"),
        }
    }

    #[test]
    fn master_parses_exception_for_any_function() {
        // 0xC1 masks to 0x41, which no parser handles; the exception bit wins.
        let (packet, consumed) = parsed(Packet::parse_body(Role::Master, 0, 0x11, 0xC1, &[0x02]));
        assert_eq!(consumed, 1);
        match packet {
            Packet::ExceptionResponse(response) => {
                assert_eq!(response.exception, ExceptionCode::IllegalDataAddress);
                assert_eq!(response.header.function, FunctionCode::Unknown(0x41));
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn slave_reports_unknown_function() {
        let (packet, consumed) = parsed(Packet::parse_body(Role::Slave, 0, 0x11, 0x41, &[0x00]));
        assert_eq!(consumed, 0);
        assert!(matches!(packet, Packet::UnknownPacket { .. }));
    }

    #[test]
    fn slave_rejects_unhandled_known_function() {
        // Write-single-coil is a recognized code without a request parser.
        let body = [0x00, 0x01, 0xFF, 0x00];
        let (packet, _) = parsed(Packet::parse_body(Role::Slave, 0, 0x11, 0x05, &body));
        assert!(matches!(packet, Packet::PacketError { .. }));
    }

    #[test]
    fn master_waits_on_short_response() {
        let outcome = Packet::parse_body(Role::Master, 0, 0x11, 0x04, &[]);
        assert_eq!(outcome, ParseOutcome::NotEnoughData);
    }

    #[test]
    fn error_reports_are_not_sendable() {
        let (packet, _) = parsed(Packet::parse_body(Role::Slave, 0, 0x11, 0x41, &[]));
        let mut buf = Vec::new();
        assert_eq!(
            packet.encode_body(&mut Writer::new(&mut buf)).unwrap_err(),
            BusError::NotSendable
        );
    }

    #[test]
    fn exception_wire_function_restores_high_bit() {
        let (packet, _) = parsed(Packet::parse_body(Role::Master, 0, 0x11, 0x83, &[0x01]));
        assert_eq!(packet.wire_function(), 0x83);
    }
}
