//! Host protocol endpoint.
//!
//! Single task owning the host UART: feeds inbound bytes to the framing
//! parser and dispatches the typed messages, drains the change and reply
//! queues filled by the bus engines, and emits the periodic heartbeat.
//! Outbound frames go through one guarded path so each frame hits the
//! wire indivisibly no matter which context produced it.

pub mod framing;
pub mod messages;

use crate::bus;
use crate::config;
use crate::drivers::watchdog;
use crate::serial::HOST_UART;
use crate::sync::{MessageQueue, Mutex};
use framing::{FrameParser, MAX_ENCODED_FRAME, encode_frame};
use log::{debug, error, info};
use messages::{Command, CommandKind, ConfigBus, Device, MessageId};

/// Change events from every bus engine (PERIODIC_CHANGE commands).
pub static HOST_CHANGE_QUEUE: MessageQueue<Command, { config::HOST_QUEUE_LENGTH }> =
    MessageQueue::new();

/// Command replies from every bus engine.
pub static HOST_COMMAND_QUEUE: MessageQueue<Command, { config::HOST_QUEUE_LENGTH }> =
    MessageQueue::new();

/// Serializes outbound frame emission across tasks.
static FRAME_TX: Mutex<()> = Mutex::new(());

/// Emit one framed message on the host link, indivisibly.
pub fn send_frame(id: MessageId, payload: &[u8]) {
    let mut wire = [0u8; MAX_ENCODED_FRAME];
    let len = encode_frame(id as u8, payload, &mut wire);

    let _guard = FRAME_TX.lock();
    HOST_UART.write_bytes(&wire[..len]);
}

fn send_command(command: &Command) {
    let mut payload = [0u8; Command::MAX_WIRE_SIZE];
    let len = command.encode(&mut payload);
    send_frame(command.kind.message_id(), &payload[..len]);
}

/// The host endpoint task.
pub struct HostEndpoint {
    parser: FrameParser,
    next_heartbeat: u64,
}

impl HostEndpoint {
    pub const fn new() -> Self {
        HostEndpoint {
            parser: FrameParser::new(),
            next_heartbeat: 0,
        }
    }

    /// Bring up the link and announce liveness. All configuration is
    /// re-sent by the host after it sees PICO_READY; nothing persists
    /// across resets.
    pub fn init(&mut self, now_ms: u64) {
        HOST_UART.init();
        self.next_heartbeat = now_ms + config::HOST_HEARTBEAT_INTERVAL;
        send_frame(MessageId::PicoReady, &[]);
        info!("Host endpoint ready");
    }

    /// One loop slot: inbound bytes, one change, one reply, heartbeat.
    pub fn poll(&mut self, now_ms: u64) {
        let mut buffer = [0u8; config::HOST_UART_BUFFER_SIZE];
        let count = HOST_UART.read_bytes(&mut buffer);
        for &byte in &buffer[..count] {
            if let Some(frame) = self.parser.process_byte(byte) {
                handle_frame(frame.id, frame.payload);
            }
        }

        if let Some(change) = HOST_CHANGE_QUEUE.receive() {
            debug!(
                "Sending change: slave {} addr {}",
                change.device.slave, change.device.address
            );
            send_command(&change);
        }

        if let Some(reply) = HOST_COMMAND_QUEUE.receive() {
            send_command(&reply);
        }

        if now_ms >= self.next_heartbeat {
            send_frame(MessageId::Heartbeat, &[]);
            self.next_heartbeat = now_ms + config::HOST_HEARTBEAT_INTERVAL;
        }
    }
}

impl Default for HostEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Inbound dispatch
// ============================================================================

fn handle_frame(id: u8, payload: &[u8]) {
    match MessageId::from_u8(id) {
        Some(MessageId::ConfigBus) => handle_config_bus(payload),
        Some(MessageId::CommandRead) | Some(MessageId::CommandWrite) => {
            if let Some(command) = Command::decode(payload) {
                forward_command(command);
            }
        }
        Some(MessageId::PicoReset) => {
            info!("Host requested reset");
            watchdog::reboot_shortly();
        }
        // Unknown or outbound-only ids are ignored.
        _ => {}
    }
}

fn handle_config_bus(payload: &[u8]) {
    let Some(config) = ConfigBus::decode(payload) else {
        error!("Malformed CONFIG_BUS payload ({} bytes)", payload.len());
        return;
    };

    let result = bus::start_bus(
        config.bus,
        config.baudrate,
        config.periodic_interval,
        &config.periodic_reads,
    );

    let (done, already_configured, invalid_bus) = match result {
        Ok(()) => (true, false, false),
        Err(bus::ConfigError::AlreadyConfigured) => {
            error!("Bus {} already configured!", config.bus);
            (false, true, false)
        }
        Err(bus::ConfigError::InvalidBus) => {
            error!("Invalid bus number {}!", config.bus);
            (false, false, true)
        }
    };

    let reply = Command {
        seq: 0,
        device: Device {
            bus: config.bus,
            ..Device::default()
        },
        kind: CommandKind::ConfigBusReply {
            bus: config.bus,
            done,
            already_configured,
            invalid_bus,
        },
    };
    send_command(&reply);
}

fn forward_command(command: Command) {
    let bus = command.device.bus;
    let Some(queue) = bus::BUS_COMMAND_QUEUES.get(bus as usize) else {
        // Invalid bus id: dropped without a reply.
        return;
    };

    // A valid but never-configured bus has no engine to time out on the
    // wire; answer for it immediately so every accepted command still
    // gets exactly one reply.
    if !bus::bus_is_configured(bus) {
        let kind = match command.kind {
            CommandKind::Read => CommandKind::ReadReply {
                done: false,
                data: 0,
            },
            _ => CommandKind::WriteReply { done: false },
        };
        send_command(&Command {
            seq: command.seq,
            device: command.device,
            kind,
        });
        return;
    }

    if !queue.send(command) {
        error!("Bus {} command queue full, command dropped", bus);
    }
}
