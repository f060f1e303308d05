use crate::encoding::Writer;
use crate::pdu::packet::{BodyError, Header};

/// Modbus exception codes carried by exception responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Acknowledge,
    SlaveDeviceBusy,
    NegativeAcknowledge,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayNoResponse,
    Unknown(u8),
}

impl ExceptionCode {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::SlaveDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::SlaveDeviceBusy,
            0x07 => Self::NegativeAcknowledge,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayNoResponse,
            other => Self::Unknown(other),
        }
    }

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::SlaveDeviceFailure => 0x04,
            Self::Acknowledge => 0x05,
            Self::SlaveDeviceBusy => 0x06,
            Self::NegativeAcknowledge => 0x07,
            Self::MemoryParityError => 0x08,
            Self::GatewayPathUnavailable => 0x0A,
            Self::GatewayNoResponse => 0x0B,
            Self::Unknown(raw) => raw,
        }
    }
}

/// An exception response as seen by a master.
///
/// The header keeps the function code with the exception bit cleared; the
/// serializer restores the bit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExceptionResponse {
    pub header: Header,
    pub exception: ExceptionCode,
}

impl ExceptionResponse {
    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let Some(raw) = body.first() else {
            return Err(BodyError::NotEnoughData);
        };
        let response = Self {
            header,
            exception: ExceptionCode::from_u8(*raw),
        };
        Ok((response, 1))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) {
        w.write_u8(self.exception.as_u8());
    }
}
