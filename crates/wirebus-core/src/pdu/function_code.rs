/// Modbus function codes recognized by the engine.
///
/// Unrecognized codes are preserved as `Unknown` so the bus can report the
/// raw byte back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
    Unknown(u8),
}

impl FunctionCode {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::Unknown(code) => code,
        }
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            other => Self::Unknown(other),
        }
    }

    /// Bit 7 set marks a response as a Modbus exception.
    pub const fn is_exception(value: u8) -> bool {
        (value & 0x80) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::FunctionCode;

    #[test]
    fn maps_known_codes() {
        assert_eq!(FunctionCode::from_u8(0x03), FunctionCode::ReadHoldingRegisters);
        assert_eq!(FunctionCode::from_u8(0x10), FunctionCode::WriteMultipleRegisters);
        assert_eq!(FunctionCode::ReadInputRegisters.as_u8(), 0x04);
    }

    #[test]
    fn preserves_unknown_codes() {
        assert_eq!(FunctionCode::from_u8(0x41), FunctionCode::Unknown(0x41));
        assert_eq!(FunctionCode::Unknown(0x41).as_u8(), 0x41);
    }

    #[test]
    fn exception_bit_is_detected() {
        assert!(FunctionCode::is_exception(0x83));
        assert!(!FunctionCode::is_exception(0x03));
    }
}
