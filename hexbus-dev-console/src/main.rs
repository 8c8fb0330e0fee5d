//! HEXBUS Development Console
//!
//! Bench tool speaking the gateway's framed host protocol over a serial
//! character device. Configure the port first (the tool does not touch
//! termios):
//!
//! ```bash
//! stty -F /dev/ttyUSB0 230400 raw -echo
//!
//! # Configure bus 2 at 115200 baud, poll register 0x0010 of slave 7
//! hexbus-dev-console config /dev/ttyUSB0 2 115200 100 7:3:16
//!
//! # One-shot read / write (bus slave function address [value])
//! hexbus-dev-console read  /dev/ttyUSB0 2 7 3 16
//! hexbus-dev-console write /dev/ttyUSB0 2 7 16 32 0x1234
//!
//! # Decode everything the gateway sends
//! hexbus-dev-console listen /dev/ttyUSB0
//! ```

use std::env;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::process::exit;

// Frame constants shared with the firmware's host/framing module.
const SOF: u8 = 0xAA;
const EOF_BYTE: u8 = 0x55;
const STUFF: u8 = 0x55;

// Message ids.
const MSG_CONFIG_BUS: u8 = 0x01;
const MSG_CONFIG_BUS_REPLY: u8 = 0x02;
const MSG_PERIODIC_READ_REPLY: u8 = 0x04;
const MSG_COMMAND_READ: u8 = 0x08;
const MSG_COMMAND_READ_REPLY: u8 = 0x09;
const MSG_COMMAND_WRITE: u8 = 0x0A;
const MSG_COMMAND_WRITE_REPLY: u8 = 0x0B;
const MSG_PICO_READY: u8 = 0x3D;
const MSG_PICO_RESET: u8 = 0x3E;
const MSG_HEARTBEAT: u8 = 0x3F;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        exit(1);
    }

    let result = match args[1].as_str() {
        "config" if args.len() >= 6 => config(&args[2], &args[3..]),
        "read" if args.len() == 7 => command(&args[2], MSG_COMMAND_READ, &args[3..], None),
        "write" if args.len() == 8 => {
            let value = parse_u16(&args[7]);
            command(&args[2], MSG_COMMAND_WRITE, &args[3..7], Some(value))
        }
        "reset" if args.len() == 3 => send(&args[2], MSG_PICO_RESET, &[]),
        "listen" if args.len() == 3 => listen(&args[2]),
        "help" | "--help" | "-h" => {
            print_usage();
            exit(0);
        }
        _ => {
            print_usage();
            exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        exit(1);
    }
}

fn print_usage() {
    eprintln!("HEXBUS Development Console");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  hexbus-dev-console config <port> <bus> <baud> <interval_ms> <slave:fn:addr>...");
    eprintln!("  hexbus-dev-console read   <port> <bus> <slave> <function> <address>");
    eprintln!("  hexbus-dev-console write  <port> <bus> <slave> <function> <address> <value>");
    eprintln!("  hexbus-dev-console reset  <port>");
    eprintln!("  hexbus-dev-console listen <port>");
}

fn parse_u16(s: &str) -> u16 {
    if let Some(hex) = s.strip_prefix("0x") {
        u16::from_str_radix(hex, 16).expect("bad hex value")
    } else {
        s.parse().expect("bad value")
    }
}

// ============================================================================
// Framing
// ============================================================================

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

fn encode_frame(id: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![id & 0x3F, payload.len() as u8];
    body.extend_from_slice(payload);
    let crc = crc32(&body);
    body.extend_from_slice(&crc.to_be_bytes());

    let mut wire = vec![SOF, SOF, SOF];
    let mut run = 0;
    for byte in body {
        wire.push(byte);
        if byte == SOF {
            run += 1;
            if run == 2 {
                wire.push(STUFF);
                run = 0;
            }
        } else {
            run = 0;
        }
    }
    wire.push(EOF_BYTE);
    wire
}

/// Minimal streaming parser mirroring the firmware side.
struct Parser {
    buffer: Vec<u8>,
    sof_run: u8,
    in_frame: bool,
    expect_stuff: bool,
}

impl Parser {
    fn new() -> Self {
        Parser {
            buffer: Vec::new(),
            sof_run: 0,
            in_frame: false,
            expect_stuff: false,
        }
    }

    fn feed(&mut self, byte: u8) -> Option<(u8, Vec<u8>)> {
        if !self.in_frame {
            if byte == SOF {
                self.sof_run += 1;
                if self.sof_run == 3 {
                    self.sof_run = 0;
                    self.in_frame = true;
                    self.buffer.clear();
                    self.expect_stuff = false;
                }
            } else {
                self.sof_run = 0;
            }
            return None;
        }

        if self.expect_stuff {
            self.expect_stuff = false;
            match byte {
                STUFF => return None,
                SOF => {
                    self.buffer.clear();
                    return None;
                }
                _ => {
                    self.in_frame = false;
                    return None;
                }
            }
        }
        if byte == SOF {
            self.sof_run += 1;
            if self.sof_run == 2 {
                self.sof_run = 0;
                self.expect_stuff = true;
            }
        } else {
            self.sof_run = 0;
        }

        self.buffer.push(byte);

        // id + len + payload + crc32 + eof
        if self.buffer.len() >= 2 {
            let payload_len = self.buffer[1] as usize;
            let total = 2 + payload_len + 4 + 1;
            if self.buffer.len() == total {
                self.in_frame = false;
                let frame = std::mem::take(&mut self.buffer);
                let crc_at = 2 + payload_len;
                let wire_crc = u32::from_be_bytes(frame[crc_at..crc_at + 4].try_into().unwrap());
                if frame[total - 1] == EOF_BYTE && crc32(&frame[..crc_at]) == wire_crc {
                    return Some((frame[0], frame[2..crc_at].to_vec()));
                }
            }
        }

        None
    }
}

// ============================================================================
// Commands
// ============================================================================

fn open_port(path: &str) -> std::io::Result<std::fs::File> {
    OpenOptions::new().read(true).write(true).open(path)
}

fn send(path: &str, id: u8, payload: &[u8]) -> std::io::Result<()> {
    let mut port = open_port(path)?;
    port.write_all(&encode_frame(id, payload))?;
    println!("sent frame id {:#04x}, {} byte payload", id, payload.len());
    Ok(())
}

fn device_bytes(bus: u8, slave: u8, function: u8, address: u16) -> [u8; 5] {
    [
        bus,
        slave,
        function,
        (address & 0xFF) as u8,
        (address >> 8) as u8,
    ]
}

fn config(path: &str, args: &[String]) -> std::io::Result<()> {
    let bus: u8 = args[0].parse().expect("bad bus");
    let baud: u32 = args[1].parse().expect("bad baudrate");
    let interval: u16 = args[2].parse().expect("bad interval");

    let mut payload = Vec::new();
    payload.extend_from_slice(&baud.to_le_bytes());
    payload.extend_from_slice(&interval.to_le_bytes());
    payload.push(bus);
    payload.push((args.len() - 3) as u8);

    for spec in &args[3..] {
        let parts: Vec<&str> = spec.split(':').collect();
        assert_eq!(parts.len(), 3, "periodic read spec is slave:function:address");
        let slave: u8 = parts[0].parse().expect("bad slave");
        let function: u8 = parts[1].parse().expect("bad function");
        let address: u16 = parts[2].parse().expect("bad address");
        payload.extend_from_slice(&device_bytes(bus, slave, function, address));
    }

    send(path, MSG_CONFIG_BUS, &payload)?;
    wait_reply(path)
}

fn command(path: &str, id: u8, args: &[String], value: Option<u16>) -> std::io::Result<()> {
    let bus: u8 = args[0].parse().expect("bad bus");
    let slave: u8 = args[1].parse().expect("bad slave");
    let function: u8 = args[2].parse().expect("bad function");
    let address: u16 = args[3].parse().expect("bad address");

    let mut payload = vec![id, next_seq()];
    payload.extend_from_slice(&device_bytes(bus, slave, function, address));
    if let Some(value) = value {
        payload.extend_from_slice(&value.to_le_bytes());
    }

    send(path, id, &payload)?;
    wait_reply(path)
}

fn next_seq() -> u8 {
    // Wall-clock derived; good enough to eyeball reply pairing
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_millis() as u8
}

fn wait_reply(path: &str) -> std::io::Result<()> {
    let mut port = open_port(path)?;
    let mut parser = Parser::new();
    let mut byte = [0u8; 1];

    loop {
        port.read_exact(&mut byte)?;
        if let Some((id, payload)) = parser.feed(byte[0]) {
            if id == MSG_HEARTBEAT {
                continue;
            }
            describe(id, &payload);
            return Ok(());
        }
    }
}

fn listen(path: &str) -> std::io::Result<()> {
    let mut port = open_port(path)?;
    let mut parser = Parser::new();
    let mut byte = [0u8; 1];

    loop {
        port.read_exact(&mut byte)?;
        if let Some((id, payload)) = parser.feed(byte[0]) {
            describe(id, &payload);
        }
    }
}

fn describe(id: u8, payload: &[u8]) {
    match id {
        MSG_PICO_READY => println!("PICO_READY"),
        MSG_HEARTBEAT => println!("HEARTBEAT"),
        MSG_CONFIG_BUS_REPLY if payload.len() >= 11 => {
            println!(
                "CONFIG_BUS_REPLY bus={} done={} already_configured={} invalid_bus={}",
                payload[7],
                payload[8] != 0,
                payload[9] != 0,
                payload[10] != 0
            );
        }
        MSG_PERIODIC_READ_REPLY if payload.len() >= 11 => {
            println!(
                "PERIODIC_READ_REPLY bus={} slave={} addr={} data={:#06x} mask={:#06x}",
                payload[2],
                payload[3],
                u16::from_le_bytes([payload[5], payload[6]]),
                u16::from_le_bytes([payload[7], payload[8]]),
                u16::from_le_bytes([payload[9], payload[10]])
            );
        }
        MSG_COMMAND_READ_REPLY if payload.len() >= 10 => {
            println!(
                "COMMAND_READ_REPLY seq={} done={} data={:#06x}",
                payload[1],
                payload[7] != 0,
                u16::from_le_bytes([payload[8], payload[9]])
            );
        }
        MSG_COMMAND_WRITE_REPLY if payload.len() >= 8 => {
            println!(
                "COMMAND_WRITE_REPLY seq={} done={}",
                payload[1],
                payload[7] != 0
            );
        }
        _ => println!("frame id {:#04x}: {:02x?}", id, payload),
    }
}
