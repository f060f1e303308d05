use crate::encoding::{Reader, Writer};
use crate::error::BusError;
use crate::pdu::packet::{read_u16_array, write_u16_array, BodyError, Header};
use crate::pdu::FunctionCode;

fn read_counted_bytes<'a>(r: &mut Reader<'a>) -> Result<&'a [u8], BodyError> {
    let byte_count = usize::from(r.read_u8()?);
    let Ok(bytes) = r.read_exact(byte_count) else {
        return Err(BodyError::NotEnoughData);
    };
    Ok(bytes)
}

fn parse_register_data(body: &[u8]) -> Result<(Vec<u16>, usize), BodyError> {
    let mut r = Reader::new(body);
    let bytes = read_counted_bytes(&mut r)?;
    if bytes.len() % 2 != 0 {
        return Err(BodyError::Malformed);
    }
    Ok((read_u16_array(bytes), 1 + bytes.len()))
}

fn encode_register_data(w: &mut Writer<'_>, register_data: &[u16]) -> Result<(), BusError> {
    let byte_count: u8 = (register_data.len() * 2)
        .try_into()
        .map_err(|_| BusError::BodyTooLarge)?;
    w.write_u8(byte_count);
    write_u16_array(w, register_data);
    Ok(())
}

/// Coil states returned for function code 1.
///
/// The first requested coil is the least significant bit of the first data
/// byte; the final byte is zero-padded, so the vector length is always a
/// multiple of eight.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadCoilsResponse {
    pub header: Header,
    pub coil_data: Vec<bool>,
}

impl ReadCoilsResponse {
    pub fn new(transaction_id: u16, address: u8, coil_data: Vec<bool>) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::ReadCoils),
            coil_data,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let mut r = Reader::new(body);
        let bytes = read_counted_bytes(&mut r)?;
        let mut coil_data = Vec::with_capacity(bytes.len() * 8);
        for byte in bytes {
            for bit in 0..8 {
                coil_data.push((byte & (1u8 << bit)) != 0);
            }
        }
        let response = Self { header, coil_data };
        Ok((response, 1 + bytes.len()))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), BusError> {
        let byte_count: u8 = self
            .coil_data
            .len()
            .div_ceil(8)
            .try_into()
            .map_err(|_| BusError::BodyTooLarge)?;
        w.write_u8(byte_count);
        for chunk in self.coil_data.chunks(8) {
            let mut byte = 0u8;
            for (bit, value) in chunk.iter().enumerate() {
                if *value {
                    byte |= 1u8 << bit;
                }
            }
            w.write_u8(byte);
        }
        Ok(())
    }
}

/// Register values returned for function code 3.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadHoldingRegistersResponse {
    pub header: Header,
    pub register_data: Vec<u16>,
}

impl ReadHoldingRegistersResponse {
    pub fn new(transaction_id: u16, address: u8, register_data: Vec<u16>) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::ReadHoldingRegisters),
            register_data,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let (register_data, consumed) = parse_register_data(body)?;
        let response = Self {
            header,
            register_data,
        };
        Ok((response, consumed))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), BusError> {
        encode_register_data(w, &self.register_data)
    }
}

/// Register values returned for function code 4.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadInputRegistersResponse {
    pub header: Header,
    pub register_data: Vec<u16>,
}

impl ReadInputRegistersResponse {
    pub fn new(transaction_id: u16, address: u8, register_data: Vec<u16>) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::ReadInputRegisters),
            register_data,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let (register_data, consumed) = parse_register_data(body)?;
        let response = Self {
            header,
            register_data,
        };
        Ok((response, consumed))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), BusError> {
        encode_register_data(w, &self.register_data)
    }
}

/// Echo of a single-register write (function code 6).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteSingleRegisterResponse {
    pub header: Header,
    pub register_index: u16,
    pub register_value: u16,
}

impl WriteSingleRegisterResponse {
    pub fn new(transaction_id: u16, address: u8, register_index: u16, register_value: u16) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::WriteSingleRegister),
            register_index,
            register_value,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let mut r = Reader::new(body);
        let register_index = r.read_be_u16()?;
        let register_value = r.read_be_u16()?;
        let response = Self {
            header,
            register_index,
            register_value,
        };
        Ok((response, 4))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) {
        w.write_be_u16(self.register_index);
        w.write_be_u16(self.register_value);
    }
}

/// Acknowledgement of a multi-register write (function code 16).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteMultipleRegistersResponse {
    pub header: Header,
    pub first_register: u16,
    pub register_count: u16,
}

impl WriteMultipleRegistersResponse {
    pub fn new(transaction_id: u16, address: u8, first_register: u16, register_count: u16) -> Self {
        Self {
            header: Header::new(transaction_id, address, FunctionCode::WriteMultipleRegisters),
            first_register,
            register_count,
        }
    }

    pub(crate) fn parse_body(header: Header, body: &[u8]) -> Result<(Self, usize), BodyError> {
        let mut r = Reader::new(body);
        let first_register = r.read_be_u16()?;
        let register_count = r.read_be_u16()?;
        let response = Self {
            header,
            first_register,
            register_count,
        };
        Ok((response, 4))
    }

    pub(crate) fn encode_body(&self, w: &mut Writer<'_>) {
        w.write_be_u16(self.first_register);
        w.write_be_u16(self.register_count);
    }
}
