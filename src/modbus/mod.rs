//! Modbus RTU framing: request encoders, CRC and the byte-fed response
//! parser. Pure logic, no hardware knowledge - the bus engine feeds it
//! from the byte streams.

pub mod crc;
pub mod frame;
pub mod parser;

/// Function codes this master produces on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Function {
    ReadCoils = 0x01,
    ReadHoldingRegisters = 0x03,
    WriteSingleCoil = 0x05,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
}

impl Function {
    pub fn from_u8(value: u8) -> Option<Function> {
        match value {
            0x01 => Some(Function::ReadCoils),
            0x03 => Some(Function::ReadHoldingRegisters),
            0x05 => Some(Function::WriteSingleCoil),
            0x0F => Some(Function::WriteMultipleCoils),
            0x10 => Some(Function::WriteMultipleRegisters),
            _ => None,
        }
    }

    pub fn is_read(self) -> bool {
        matches!(self, Function::ReadCoils | Function::ReadHoldingRegisters)
    }

    pub fn is_write(self) -> bool {
        !self.is_read()
    }
}

/// Highest valid slave address on an RTU bus.
pub const MAX_SLAVE_ADDRESS: u8 = 247;
