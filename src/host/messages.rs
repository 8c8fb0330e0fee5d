//! Typed host messages and their packed wire codecs.
//!
//! Every frame on the host link carries a 6-bit message id and a packed
//! little-endian payload. `Command` is the shared record for one-shot
//! traffic in both directions: the `type` byte on the wire selects the
//! variant, and `seq` pairs a reply with the command that caused it.

extern crate alloc;

use alloc::vec::Vec;

/// Frame ids on the host link (6-bit space).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    ConfigBus = 0x01,
    ConfigBusReply = 0x02,
    /// Emitted when a periodic read observes a change.
    PeriodicReadReply = 0x04,
    CommandRead = 0x08,
    CommandReadReply = 0x09,
    CommandWrite = 0x0A,
    CommandWriteReply = 0x0B,
    PicoReady = 0x3D,
    PicoReset = 0x3E,
    Heartbeat = 0x3F,
}

impl MessageId {
    pub fn from_u8(value: u8) -> Option<MessageId> {
        match value {
            0x01 => Some(MessageId::ConfigBus),
            0x02 => Some(MessageId::ConfigBusReply),
            0x04 => Some(MessageId::PeriodicReadReply),
            0x08 => Some(MessageId::CommandRead),
            0x09 => Some(MessageId::CommandReadReply),
            0x0A => Some(MessageId::CommandWrite),
            0x0B => Some(MessageId::CommandWriteReply),
            0x3D => Some(MessageId::PicoReady),
            0x3E => Some(MessageId::PicoReset),
            0x3F => Some(MessageId::Heartbeat),
            _ => None,
        }
    }
}

/// Addressable register on one of the buses.
///
/// Wire layout: `bus u8 | slave u8 | function u8 | address u16`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Device {
    pub bus: u8,
    pub slave: u8,
    pub function: u8,
    pub address: u16,
}

impl Device {
    pub const WIRE_SIZE: usize = 5;

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.bus;
        buf[1] = self.slave;
        buf[2] = self.function;
        buf[3] = (self.address & 0xFF) as u8;
        buf[4] = (self.address >> 8) as u8;
    }

    pub fn decode(buf: &[u8]) -> Device {
        Device {
            bus: buf[0],
            slave: buf[1],
            function: buf[2],
            address: (buf[3] as u16) | ((buf[4] as u16) << 8),
        }
    }
}

/// Variant payload of a [`Command`], selected by the wire `type` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Read,
    Write {
        data: u16,
    },
    ConfigBusReply {
        bus: u8,
        done: bool,
        already_configured: bool,
        invalid_bus: bool,
    },
    ReadReply {
        done: bool,
        data: u16,
    },
    WriteReply {
        done: bool,
    },
    PeriodicChange {
        data: u16,
        data_mask: u16,
    },
}

impl CommandKind {
    /// The frame id a command of this kind travels under.
    pub fn message_id(&self) -> MessageId {
        match self {
            CommandKind::Read => MessageId::CommandRead,
            CommandKind::Write { .. } => MessageId::CommandWrite,
            CommandKind::ConfigBusReply { .. } => MessageId::ConfigBusReply,
            CommandKind::ReadReply { .. } => MessageId::CommandReadReply,
            CommandKind::WriteReply { .. } => MessageId::CommandWriteReply,
            CommandKind::PeriodicChange { .. } => MessageId::PeriodicReadReply,
        }
    }
}

/// One-shot command/reply record, reply-paired by `seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub seq: u8,
    pub device: Device,
    pub kind: CommandKind,
}

/// Fixed prefix: type, seq, device.
const COMMAND_HEADER_SIZE: usize = 2 + Device::WIRE_SIZE;

impl Command {
    /// Largest encoded command (CONFIG_BUS_REPLY / PERIODIC_CHANGE).
    pub const MAX_WIRE_SIZE: usize = COMMAND_HEADER_SIZE + 4;

    /// Serialize into `buf`; returns the encoded length.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.kind.message_id() as u8;
        buf[1] = self.seq;
        self.device.encode(&mut buf[2..7]);

        let tail = &mut buf[COMMAND_HEADER_SIZE..];
        let tail_len = match self.kind {
            CommandKind::Read => 0,
            CommandKind::Write { data } => {
                tail[0] = (data & 0xFF) as u8;
                tail[1] = (data >> 8) as u8;
                2
            }
            CommandKind::ConfigBusReply {
                bus,
                done,
                already_configured,
                invalid_bus,
            } => {
                tail[0] = bus;
                tail[1] = done as u8;
                tail[2] = already_configured as u8;
                tail[3] = invalid_bus as u8;
                4
            }
            CommandKind::ReadReply { done, data } => {
                tail[0] = done as u8;
                tail[1] = (data & 0xFF) as u8;
                tail[2] = (data >> 8) as u8;
                3
            }
            CommandKind::WriteReply { done } => {
                tail[0] = done as u8;
                1
            }
            CommandKind::PeriodicChange { data, data_mask } => {
                tail[0] = (data & 0xFF) as u8;
                tail[1] = (data >> 8) as u8;
                tail[2] = (data_mask & 0xFF) as u8;
                tail[3] = (data_mask >> 8) as u8;
                4
            }
        };

        COMMAND_HEADER_SIZE + tail_len
    }

    /// Parse a command payload. `None` on unknown type or short payload.
    pub fn decode(payload: &[u8]) -> Option<Command> {
        if payload.len() < COMMAND_HEADER_SIZE {
            return None;
        }

        let seq = payload[1];
        let device = Device::decode(&payload[2..7]);
        let tail = &payload[COMMAND_HEADER_SIZE..];

        let kind = match MessageId::from_u8(payload[0])? {
            MessageId::CommandRead => CommandKind::Read,
            MessageId::CommandWrite => {
                if tail.len() < 2 {
                    return None;
                }
                CommandKind::Write {
                    data: (tail[0] as u16) | ((tail[1] as u16) << 8),
                }
            }
            MessageId::ConfigBusReply => {
                if tail.len() < 4 {
                    return None;
                }
                CommandKind::ConfigBusReply {
                    bus: tail[0],
                    done: tail[1] != 0,
                    already_configured: tail[2] != 0,
                    invalid_bus: tail[3] != 0,
                }
            }
            MessageId::CommandReadReply => {
                if tail.len() < 3 {
                    return None;
                }
                CommandKind::ReadReply {
                    done: tail[0] != 0,
                    data: (tail[1] as u16) | ((tail[2] as u16) << 8),
                }
            }
            MessageId::CommandWriteReply => {
                if tail.is_empty() {
                    return None;
                }
                CommandKind::WriteReply { done: tail[0] != 0 }
            }
            MessageId::PeriodicReadReply => {
                if tail.len() < 4 {
                    return None;
                }
                CommandKind::PeriodicChange {
                    data: (tail[0] as u16) | ((tail[1] as u16) << 8),
                    data_mask: (tail[2] as u16) | ((tail[3] as u16) << 8),
                }
            }
            _ => return None,
        };

        Some(Command { seq, device, kind })
    }
}

/// Parsed CONFIG_BUS message.
///
/// Wire layout: `baudrate u32 | periodic_interval_ms u16 | bus u8 | n u8
/// | device[n]`.
#[derive(Debug, Clone)]
pub struct ConfigBus {
    pub baudrate: u32,
    pub periodic_interval: u16,
    pub bus: u8,
    pub periodic_reads: Vec<Device>,
}

impl ConfigBus {
    const HEADER_SIZE: usize = 8;

    pub fn decode(payload: &[u8]) -> Option<ConfigBus> {
        if payload.len() < Self::HEADER_SIZE {
            return None;
        }

        let baudrate = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let periodic_interval = u16::from_le_bytes([payload[4], payload[5]]);
        let bus = payload[6];
        let count = payload[7] as usize;

        if payload.len() < Self::HEADER_SIZE + count * Device::WIRE_SIZE {
            return None;
        }

        let mut periodic_reads = Vec::with_capacity(count);
        for i in 0..count {
            let at = Self::HEADER_SIZE + i * Device::WIRE_SIZE;
            periodic_reads.push(Device::decode(&payload[at..at + Device::WIRE_SIZE]));
        }

        Some(ConfigBus {
            baudrate,
            periodic_interval,
            bus,
            periodic_reads,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_device_wire_layout() {
        let device = Device {
            bus: 2,
            slave: 7,
            function: 0x03,
            address: 0x0010,
        };

        let mut buf = [0u8; 5];
        device.encode(&mut buf);
        // address is little-endian on the wire
        assert_eq!(buf, [2, 7, 0x03, 0x10, 0x00]);
        assert_eq!(Device::decode(&buf), device);
    }

    #[test_case]
    fn test_periodic_change_layout() {
        let command = Command {
            seq: 0,
            device: Device {
                bus: 2,
                slave: 7,
                function: 0x03,
                address: 0x0010,
            },
            kind: CommandKind::PeriodicChange {
                data: 0x002A,
                data_mask: 0x002A,
            },
        };

        let mut buf = [0u8; Command::MAX_WIRE_SIZE];
        let len = command.encode(&mut buf);

        assert_eq!(len, 11);
        assert_eq!(buf[0], MessageId::PeriodicReadReply as u8);
        assert_eq!(&buf[7..11], &[0x2A, 0x00, 0x2A, 0x00]);
        assert_eq!(Command::decode(&buf[..len]), Some(command));
    }

    #[test_case]
    fn test_read_command_roundtrip() {
        let command = Command {
            seq: 5,
            device: Device {
                bus: 2,
                slave: 9,
                function: 0x03,
                address: 0x0000,
            },
            kind: CommandKind::Read,
        };

        let mut buf = [0u8; Command::MAX_WIRE_SIZE];
        let len = command.encode(&mut buf);
        assert_eq!(len, 7); // header only
        assert_eq!(Command::decode(&buf[..len]), Some(command));
    }

    #[test_case]
    fn test_write_command_carries_value() {
        let command = Command {
            seq: 6,
            device: Device {
                bus: 2,
                slave: 7,
                function: 0x10,
                address: 0x0020,
            },
            kind: CommandKind::Write { data: 0x1234 },
        };

        let mut buf = [0u8; Command::MAX_WIRE_SIZE];
        let len = command.encode(&mut buf);
        assert_eq!(len, 9);
        assert_eq!(&buf[7..9], &[0x34, 0x12]);
    }

    #[test_case]
    fn test_config_bus_reply_flags() {
        let command = Command {
            seq: 1,
            device: Device::default(),
            kind: CommandKind::ConfigBusReply {
                bus: 9,
                done: false,
                already_configured: false,
                invalid_bus: true,
            },
        };

        let mut buf = [0u8; Command::MAX_WIRE_SIZE];
        let len = command.encode(&mut buf);
        assert_eq!(len, 11);
        assert_eq!(&buf[7..11], &[9, 0, 0, 1]);
        assert_eq!(Command::decode(&buf[..len]), Some(command));
    }

    #[test_case]
    fn test_config_bus_decode() {
        // baudrate 115200, interval 100 ms, bus 2, one periodic read
        let payload = [
            0x00, 0xC2, 0x01, 0x00, // baudrate
            0x64, 0x00, // interval
            0x02, // bus
            0x01, // n
            0x02, 0x07, 0x03, 0x10, 0x00, // device
        ];

        let config = ConfigBus::decode(&payload).unwrap();
        assert_eq!(config.baudrate, 115_200);
        assert_eq!(config.periodic_interval, 100);
        assert_eq!(config.bus, 2);
        assert_eq!(config.periodic_reads.len(), 1);
        assert_eq!(
            config.periodic_reads[0],
            Device {
                bus: 2,
                slave: 7,
                function: 0x03,
                address: 0x0010
            }
        );
    }

    #[test_case]
    fn test_config_bus_short_payload_rejected() {
        // Claims two devices but carries one
        let payload = [
            0x00, 0xC2, 0x01, 0x00, 0x64, 0x00, 0x02, 0x02, //
            0x02, 0x07, 0x03, 0x10, 0x00,
        ];
        assert!(ConfigBus::decode(&payload).is_none());
    }

    #[test_case]
    fn test_decode_rejects_garbage() {
        assert!(Command::decode(&[]).is_none());
        assert!(Command::decode(&[0x55, 1, 2, 3, 4, 5, 6]).is_none());
        // WRITE with a truncated value
        assert!(Command::decode(&[0x0A, 1, 2, 3, 4, 5, 6, 7]).is_none());
    }
}
