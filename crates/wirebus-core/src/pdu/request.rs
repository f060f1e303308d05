use crate::encoding::{Reader, Writer};
use crate::error::BusError;
use crate::pdu::packet::{read_u16_array, write_u16_array, BodyError, Header};
use crate::pdu::FunctionCode;

fn read_range(body: &[u8]) -> Result<(u16, u16), BodyError> {
    let mut r = Reader::new(body);
    let first = r.read_be_u16()?;
    let count = r.read_be_u16()?;
    Ok((first, count))
}

/// Request to read a run of coils (function code 1).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadCoilsRequest {
    pub header: Header,
    pub first_coil: u16,
    pub coil_count: u16,
}

impl ReadCoilsRequest {
    pub fn new(transaction_id: u16, address: u8, first_coil: u16, coil_count: u16) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::ReadCoils),
            first_coil,
            coil_count,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let (first_coil, coil_count) = read_range(body)?;
        let request = Self {
            header,
            first_coil,
            coil_count,
        };
        Ok((request, 4))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) {
        w.write_be_u16(self.first_coil);
        w.write_be_u16(self.coil_count);
    }
}

/// Request to read a run of holding registers (function code 3).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadHoldingRegistersRequest {
    pub header: Header,
    pub first_register: u16,
    pub register_count: u16,
}

impl ReadHoldingRegistersRequest {
    pub fn new(transaction_id: u16, address: u8, first_register: u16, register_count: u16) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::ReadHoldingRegisters),
            first_register,
            register_count,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let (first_register, register_count) = read_range(body)?;
        let request = Self {
            header,
            first_register,
            register_count,
        };
        Ok((request, 4))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) {
        w.write_be_u16(self.first_register);
        w.write_be_u16(self.register_count);
    }
}

/// Request to read a run of input registers (function code 4).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadInputRegistersRequest {
    pub header: Header,
    pub first_register: u16,
    pub register_count: u16,
}

impl ReadInputRegistersRequest {
    pub fn new(transaction_id: u16, address: u8, first_register: u16, register_count: u16) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::ReadInputRegisters),
            first_register,
            register_count,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let (first_register, register_count) = read_range(body)?;
        let request = Self {
            header,
            first_register,
            register_count,
        };
        Ok((request, 4))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) {
        w.write_be_u16(self.first_register);
        w.write_be_u16(self.register_count);
    }
}

/// Request to write one holding register (function code 6).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteSingleRegisterRequest {
    pub header: Header,
    pub register_index: u16,
    pub register_value: u16,
}

impl WriteSingleRegisterRequest {
    pub fn new(transaction_id: u16, address: u8, register_index: u16, register_value: u16) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::WriteSingleRegister),
            register_index,
            register_value,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let (register_index, register_value) = read_range(body)?;
        let request = Self {
            header,
            register_index,
            register_value,
        };
        Ok((request, 4))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) {
        w.write_be_u16(self.register_index);
        w.write_be_u16(self.register_value);
    }
}

/// Request to write a run of holding registers (function code 16).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteMultipleRegistersRequest {
    pub header: Header,
    pub first_register: u16,
    pub register_content: Vec<u16>,
}

impl WriteMultipleRegistersRequest {
    pub fn new(
        transaction_id: u16,
        address: u8,
        first_register: u16,
        register_content: Vec<u16>,
    ) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::WriteMultipleRegisters),
            first_register,
            register_content,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let mut r = Reader::new(body);
        let first_register = r.read_be_u16()?;
        let register_count = r.read_be_u16()?;
        let byte_count = usize::from(r.read_u8()?);
        if byte_count % 2 != 0 {
            return Err(BodyError::Malformed);
        }
        let Ok(bytes) = r.read_exact(byte_count) else {
            return Err(BodyError::NotEnoughData);
        };
        let consumed = 5 + byte_count;
        let register_content = read_u16_array(bytes);
        if usize::from(register_count) != register_content.len() {
            return Err(BodyError::Internal { consumed });
        }
        let request = Self {
            header,
            first_register,
            register_content,
        };
        Ok((request, consumed))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), BusError> {
        let register_count: u16 = self
            .register_content
            .len()
            .try_into()
            .map_err(|_| BusError::BodyTooLarge)?;
        let byte_count: u8 = (self.register_content.len() * 2)
            .try_into()
            .map_err(|_| BusError::BodyTooLarge)?;
        w.write_be_u16(self.first_register);
        w.write_be_u16(register_count);
        w.write_u8(byte_count);
        write_u16_array(w, &self.register_content);
        Ok(())
    }
}
