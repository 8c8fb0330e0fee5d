//! Modbus RTU request encoders.
//!
//! Every builder writes into a caller-provided buffer and returns the
//! frame length, or 0 if the function is not encodable or the buffer is
//! too small - the engine treats 0 as "skip this transaction" and logs.
//!
//! Reads always scan one 16-bit word equivalent: 16 coils or a single
//! holding register. Writes carry exactly one value: a single coil
//! (0x05, or 0x0F encoded as a one-coil batch) or one register via Write
//! Multiple Registers (0x10, quantity 1).

use crate::modbus::Function;
use crate::modbus::crc::compute_crc;

fn finish(frame: &mut [u8], data_len: usize) -> usize {
    let crc = compute_crc(&frame[..data_len]);
    frame[data_len] = (crc & 0xFF) as u8; // CRC low byte first
    frame[data_len + 1] = (crc >> 8) as u8;
    data_len + 2
}

/// Read Coils (0x01), quantity fixed at 16.
///
/// Frame: `[slave][0x01][startHi][startLo][quantHi][quantLo][CRClo][CRChi]`
pub fn read_coils_frame(slave: u8, address: u16, frame: &mut [u8]) -> usize {
    const LEN: usize = 6;
    if frame.len() < LEN + 2 {
        return 0;
    }

    frame[0] = slave;
    frame[1] = Function::ReadCoils as u8;
    frame[2] = (address >> 8) as u8;
    frame[3] = (address & 0xFF) as u8;
    frame[4] = 0x00;
    frame[5] = 16; // one word worth of coils

    finish(frame, LEN)
}

/// Read Holding Registers (0x03), quantity fixed at 1.
pub fn read_holding_registers_frame(slave: u8, address: u16, frame: &mut [u8]) -> usize {
    const LEN: usize = 6;
    if frame.len() < LEN + 2 {
        return 0;
    }

    frame[0] = slave;
    frame[1] = Function::ReadHoldingRegisters as u8;
    frame[2] = (address >> 8) as u8;
    frame[3] = (address & 0xFF) as u8;
    frame[4] = 0x00;
    frame[5] = 0x01;

    finish(frame, LEN)
}

/// Write Single Coil (0x05). Nonzero maps to ON (0xFF00).
pub fn write_single_coil_frame(slave: u8, address: u16, on: bool, frame: &mut [u8]) -> usize {
    const LEN: usize = 6;
    if frame.len() < LEN + 2 {
        return 0;
    }

    frame[0] = slave;
    frame[1] = Function::WriteSingleCoil as u8;
    frame[2] = (address >> 8) as u8;
    frame[3] = (address & 0xFF) as u8;
    // Per the Modbus spec: ON = 0xFF00, OFF = 0x0000.
    frame[4] = if on { 0xFF } else { 0x00 };
    frame[5] = 0x00;

    finish(frame, LEN)
}

/// Write Multiple Coils (0x0F) carrying exactly one coil.
pub fn write_multiple_coils_frame(slave: u8, address: u16, on: bool, frame: &mut [u8]) -> usize {
    const LEN: usize = 8;
    if frame.len() < LEN + 2 {
        return 0;
    }

    frame[0] = slave;
    frame[1] = Function::WriteMultipleCoils as u8;
    frame[2] = (address >> 8) as u8;
    frame[3] = (address & 0xFF) as u8;
    frame[4] = 0x00;
    frame[5] = 0x01; // quantity
    frame[6] = 0x01; // byte count
    frame[7] = if on { 0x01 } else { 0x00 };

    finish(frame, LEN)
}

/// Write Multiple Registers (0x10) carrying exactly one register.
///
/// Frame: `[slave][0x10][startHi][startLo][quantHi][quantLo][count][valHi][valLo][CRClo][CRChi]`
pub fn write_multiple_registers_frame(
    slave: u8,
    address: u16,
    value: u16,
    frame: &mut [u8],
) -> usize {
    const LEN: usize = 9;
    if frame.len() < LEN + 2 {
        return 0;
    }

    frame[0] = slave;
    frame[1] = Function::WriteMultipleRegisters as u8;
    frame[2] = (address >> 8) as u8;
    frame[3] = (address & 0xFF) as u8;
    frame[4] = 0x00;
    frame[5] = 0x01; // quantity
    frame[6] = 0x02; // byte count
    frame[7] = (value >> 8) as u8;
    frame[8] = (value & 0xFF) as u8;

    finish(frame, LEN)
}

/// Build a read request for a periodic scan or a host READ command.
///
/// Returns 0 for non-read functions.
pub fn read_frame(function: u8, slave: u8, address: u16, frame: &mut [u8]) -> usize {
    match Function::from_u8(function) {
        Some(Function::ReadCoils) => read_coils_frame(slave, address, frame),
        Some(Function::ReadHoldingRegisters) => read_holding_registers_frame(slave, address, frame),
        _ => 0,
    }
}

/// Build a write request for a host WRITE command.
///
/// Returns 0 for non-write functions.
pub fn write_frame(function: u8, slave: u8, address: u16, value: u16, frame: &mut [u8]) -> usize {
    match Function::from_u8(function) {
        Some(Function::WriteSingleCoil) => write_single_coil_frame(slave, address, value != 0, frame),
        Some(Function::WriteMultipleCoils) => {
            write_multiple_coils_frame(slave, address, value != 0, frame)
        }
        Some(Function::WriteMultipleRegisters) => {
            write_multiple_registers_frame(slave, address, value, frame)
        }
        _ => 0,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_read_holding_registers_layout() {
        let mut buf = [0u8; 16];
        let len = read_holding_registers_frame(0x07, 0x0010, &mut buf);

        assert_eq!(len, 8);
        assert_eq!(&buf[..6], &[0x07, 0x03, 0x00, 0x10, 0x00, 0x01]);
    }

    #[test_case]
    fn test_read_coils_scans_sixteen() {
        let mut buf = [0u8; 16];
        let len = read_coils_frame(0x02, 0x0000, &mut buf);

        assert_eq!(len, 8);
        assert_eq!(&buf[..6], &[0x02, 0x01, 0x00, 0x00, 0x00, 0x10]);
    }

    #[test_case]
    fn test_write_register_matches_wire_example() {
        // slave 7, register 0x0020 := 0x1234
        let mut buf = [0u8; 16];
        let len = write_multiple_registers_frame(0x07, 0x0020, 0x1234, &mut buf);

        assert_eq!(len, 11);
        assert_eq!(
            &buf[..9],
            &[0x07, 0x10, 0x00, 0x20, 0x00, 0x01, 0x02, 0x12, 0x34]
        );
    }

    #[test_case]
    fn test_write_coil_value_mapping() {
        let mut on = [0u8; 16];
        let mut off = [0u8; 16];
        write_single_coil_frame(0x01, 0x0005, true, &mut on);
        write_single_coil_frame(0x01, 0x0005, false, &mut off);

        assert_eq!(&on[4..6], &[0xFF, 0x00]);
        assert_eq!(&off[4..6], &[0x00, 0x00]);
    }

    #[test_case]
    fn test_crc_is_low_byte_first() {
        let mut buf = [0u8; 16];
        let len = read_holding_registers_frame(0x01, 0x0000, &mut buf);

        // Canonical frame 01 03 00 00 00 01 -> CRC bytes 84 0A on the wire
        assert_eq!(len, 8);
        assert_eq!(buf[6], 0x84);
        assert_eq!(buf[7], 0x0A);
    }

    #[test_case]
    fn test_dispatch_rejects_wrong_direction() {
        let mut buf = [0u8; 16];
        assert_eq!(read_frame(0x10, 1, 0, &mut buf), 0);
        assert_eq!(write_frame(0x03, 1, 0, 0, &mut buf), 0);
        assert_eq!(read_frame(0x99, 1, 0, &mut buf), 0);
    }

    #[test_case]
    fn test_small_buffer_rejected() {
        let mut buf = [0u8; 4];
        assert_eq!(read_coils_frame(1, 0, &mut buf), 0);
    }
}
