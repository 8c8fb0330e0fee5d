//! Per-bus Modbus engine.
//!
//! One engine owns one RS-485 channel and serializes everything on it:
//! the periodic register scans and the one-shot host commands. A
//! transaction is write-request / settle / parse-response, expressed as a
//! small state machine stepped from the core 1 loop at 1 ms ticks so six
//! engines interleave without threads. At most one request is ever in
//! flight per bus.
//!
//! Scheduling follows the periodic list in order, one entry considered
//! per tick; the command queue is consulted when the scan cursor wraps,
//! which bounds command latency at one full list traversal plus the
//! running transaction.

extern crate alloc;

use crate::config;
use crate::drivers::timer::SystemTimer;
use crate::host;
use crate::host::messages::{Command, CommandKind, Device};
use crate::modbus::frame as framer;
use crate::modbus::parser::{Frame, ParseResult, Parser};
use crate::serial::pio::{PioUart, get_pio_uart};
use crate::sync::{MessageQueue, Mutex};
use alloc::vec::Vec;
use log::{debug, error, info};

/// Host-issued commands waiting for their bus, indexed by bus id.
///
/// The queues are static so the host endpoint can enqueue without
/// touching engine state; an engine only ever drains its own slot.
pub static BUS_COMMAND_QUEUES: [MessageQueue<Command, { config::BUS_QUEUE_LENGTH }>;
    config::COUNT_PIO_UARTS] =
    [const { MessageQueue::new() }; config::COUNT_PIO_UARTS];

/// Engine slots, polled by the core 1 loop. Written once per bus by the
/// CONFIG_BUS handler.
static ENGINES: [Mutex<Option<BusEngine>>; config::COUNT_PIO_UARTS] =
    [const { Mutex::new(None) }; config::COUNT_PIO_UARTS];

/// One standing periodic poll instruction.
pub struct PeriodicRead {
    pub device: Device,
    /// Tick (ms) at which the next poll is due. Only the owning engine
    /// task ever updates this.
    pub next_run: u64,
    /// Last observed value; zero until the first successful read, which
    /// is why the host learns every nonzero register right after
    /// configuration.
    pub last_data: u16,
}

/// Immutable-after-init description of one configured bus.
pub struct BusContext {
    pub uart: &'static PioUart,
    pub bus: u8,
    pub baudrate: u32,
    pub interval_ms: u64,
    pub periodic_reads: Vec<PeriodicRead>,
}

/// Errors surfaced to the host in CONFIG_BUS_REPLY flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    InvalidBus,
    AlreadyConfigured,
}

/// Whether a bus id has an engine attached.
pub fn bus_is_configured(bus: u8) -> bool {
    match ENGINES.get(bus as usize) {
        Some(slot) => slot.lock().is_some(),
        None => false,
    }
}

/// Allocate and start an engine for `config`-described bus.
///
/// Claims the PIO channel (panicking if the board is out of state
/// machines), builds the periodic read list and parks the engine in its
/// slot for the core 1 loop to pick up.
pub fn start_bus(
    bus: u8,
    baudrate: u32,
    interval_ms: u16,
    devices: &[Device],
) -> Result<(), ConfigError> {
    if bus as usize >= config::COUNT_PIO_UARTS {
        return Err(ConfigError::InvalidBus);
    }
    if bus_is_configured(bus) {
        return Err(ConfigError::AlreadyConfigured);
    }

    let uart = get_pio_uart(bus).ok_or(ConfigError::InvalidBus)?;
    uart.set_baudrate(baudrate);
    uart.init();

    let now = SystemTimer::now_ms();
    let periodic_reads = devices
        .iter()
        .map(|&device| PeriodicRead {
            device,
            next_run: now + interval_ms as u64,
            last_data: 0,
        })
        .collect();

    let context = BusContext {
        uart,
        bus,
        baudrate: if baudrate > 0 {
            baudrate
        } else {
            config::PIO_UART_DEFAULT_BAUDRATE
        },
        interval_ms: interval_ms as u64,
        periodic_reads,
    };

    info!(
        "Bus {} configured: {} baud, {} periodic reads every {} ms",
        bus,
        context.baudrate,
        context.periodic_reads.len(),
        interval_ms
    );

    *ENGINES[bus as usize].lock() = Some(BusEngine::new(context));
    Ok(())
}

/// Step every configured engine. Called from the core 1 loop.
pub fn poll_engines(now_ms: u64) {
    for slot in &ENGINES {
        if let Some(engine) = slot.lock().as_mut() {
            engine.poll(now_ms);
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// What the in-flight transaction is for.
enum Transaction {
    Periodic(usize),
    Command(Command),
}

/// Phase of the current transaction.
enum TurnState {
    /// No request on the wire; scanning for work.
    Idle,
    /// Request queued to the UART; waiting out the TX/turnaround slot.
    TxSettle { until: u64 },
    /// Collecting the response byte stream.
    Receive { deadline: u64 },
}

/// Outcome of one transaction.
enum Outcome {
    Response(Frame),
    Timeout,
    ProtocolError,
}

pub struct BusEngine {
    context: BusContext,
    parser: Parser,
    frame: Frame,
    state: TurnState,
    current: Option<Transaction>,
    /// Next periodic list index to consider.
    cursor: usize,
    /// Post-write settle slot, derived from the baudrate (~10 wire
    /// bytes), floored at BUS_DELAY_WRITE_READ.
    settle_ms: u64,
    /// Tick after which the next timeout message may be logged.
    next_timeout_log: u64,
}

impl BusEngine {
    pub fn new(context: BusContext) -> Self {
        let settle_ms =
            ((100 * 1_000_000) / context.baudrate as u64).div_ceil(1000).max(config::BUS_DELAY_WRITE_READ);

        BusEngine {
            context,
            parser: Parser::new(),
            frame: Frame::default(),
            state: TurnState::Idle,
            current: None,
            cursor: 0,
            settle_ms,
            next_timeout_log: 0,
        }
    }

    /// Advance the engine by one 1 ms slot.
    pub fn poll(&mut self, now: u64) {
        match self.state {
            TurnState::Idle => self.pick_work(now),

            TurnState::TxSettle { until } => {
                if now >= until {
                    self.parser.reset();
                    self.state = TurnState::Receive {
                        deadline: now + config::BUS_TIMEOUT_RESPONSE,
                    };
                }
            }

            TurnState::Receive { deadline } => {
                // Drain whatever arrived during this slot.
                while let Some(byte) = self.context.uart.read_byte() {
                    match self.parser.process_byte(&mut self.frame, byte) {
                        ParseResult::Incomplete => continue,
                        ParseResult::Complete => {
                            let frame = self.frame;
                            self.complete(now, Outcome::Response(frame));
                            return;
                        }
                        ParseResult::Error => {
                            self.complete(now, Outcome::ProtocolError);
                            return;
                        }
                    }
                }

                if now >= deadline {
                    self.complete(now, Outcome::Timeout);
                }
            }
        }
    }

    /// Idle-state scheduler: one periodic entry per slot, command queue
    /// at the list boundary.
    fn pick_work(&mut self, now: u64) {
        if self.cursor < self.context.periodic_reads.len() {
            let index = self.cursor;
            if now >= self.context.periodic_reads[index].next_run {
                self.start_periodic(now, index);
            } else {
                self.cursor += 1;
            }
            return;
        }

        // List boundary: at most one command, then wrap.
        self.cursor = 0;
        if let Some(command) = BUS_COMMAND_QUEUES[self.context.bus as usize].receive() {
            self.start_command(now, command);
        }
    }

    fn start_periodic(&mut self, now: u64, index: usize) {
        let mut request = [0u8; config::BUS_MODBUS_FRAME_BUFFER_SIZE];
        let device = self.context.periodic_reads[index].device;

        let len = framer::read_frame(device.function, device.slave, device.address, &mut request);
        if len == 0 {
            error!(
                "Bus {}: cannot encode periodic read, function {:#04x}",
                self.context.bus, device.function
            );
            // Reschedule so a bad entry does not spin the engine.
            self.context.periodic_reads[index].next_run = now + self.context.interval_ms;
            self.cursor += 1;
            return;
        }

        debug!(
            "Bus {}: periodic read {} (slave {} addr {})",
            self.context.bus, index, device.slave, device.address
        );

        self.transmit(now, &request[..len]);
        self.current = Some(Transaction::Periodic(index));
    }

    fn start_command(&mut self, now: u64, command: Command) {
        let mut request = [0u8; config::BUS_MODBUS_FRAME_BUFFER_SIZE];
        let device = command.device;

        let len = match command.kind {
            CommandKind::Read => {
                framer::read_frame(device.function, device.slave, device.address, &mut request)
            }
            CommandKind::Write { data } => framer::write_frame(
                device.function,
                device.slave,
                device.address,
                data,
                &mut request,
            ),
            // Only READ/WRITE ever reach a bus queue.
            _ => 0,
        };

        if len == 0 {
            error!(
                "Bus {}: cannot encode command, function {:#04x}",
                self.context.bus, device.function
            );
            self.push_reply(build_command_reply(&command, None));
            return;
        }

        self.transmit(now, &request[..len]);
        self.current = Some(Transaction::Command(command));
    }

    /// Flush stale RX bytes, queue the request and enter the settle slot.
    fn transmit(&mut self, now: u64, request: &[u8]) {
        self.context.uart.rx_flush();
        self.context.uart.write_bytes(request);
        self.state = TurnState::TxSettle {
            until: now + self.settle_ms,
        };
    }

    /// Wrap up the in-flight transaction and return to Idle.
    fn complete(&mut self, now: u64, outcome: Outcome) {
        self.state = TurnState::Idle;

        match self.current.take() {
            Some(Transaction::Periodic(index)) => {
                self.finish_periodic(now, index, outcome);
            }
            Some(Transaction::Command(command)) => {
                let frame = self.accepted_frame(outcome, command.device.function);
                self.push_reply(build_command_reply(&command, frame.as_ref()));
            }
            None => {}
        }
    }

    fn finish_periodic(&mut self, now: u64, index: usize, outcome: Outcome) {
        let bus = self.context.bus;
        let entry = &mut self.context.periodic_reads[index];

        match outcome {
            Outcome::Response(frame) => {
                if frame.function_code == entry.device.function {
                    if let Some(change) = process_periodic_reply(entry, &frame) {
                        let command = Command {
                            seq: 0,
                            device: entry.device,
                            kind: change,
                        };
                        info!(
                            "Bus {} change detected - slave {} addr {} = {:#06x}",
                            bus,
                            entry.device.slave,
                            entry.device.address,
                            entry.last_data
                        );
                        if !host::HOST_CHANGE_QUEUE.send(command) {
                            error!("Bus {}: change queue full, event dropped", bus);
                        }
                    }
                } else {
                    error!(
                        "Bus {}: wrong function code {:#04x} from slave {}",
                        bus, frame.function_code, entry.device.slave
                    );
                }
            }
            Outcome::ProtocolError => {
                error!(
                    "Bus {}: error parsing frame from slave {} addr {}",
                    bus, entry.device.slave, entry.device.address
                );
            }
            Outcome::Timeout => {
                if now >= self.next_timeout_log {
                    error!(
                        "Bus {}: timeout, slave {} addr {}",
                        bus, entry.device.slave, entry.device.address
                    );
                    self.next_timeout_log = now + config::BUS_DELAY_TIMEOUT_MSG;
                }
            }
        }

        // Reschedule from the present whether or not the read succeeded.
        entry.next_run = now + self.context.interval_ms;
        self.cursor += 1;
    }

    /// Filter a transaction outcome down to a frame whose function code
    /// matches the request (an exception response or foreign frame counts
    /// as failure).
    fn accepted_frame(&mut self, outcome: Outcome, function: u8) -> Option<Frame> {
        match outcome {
            Outcome::Response(frame) if frame.function_code == function => Some(frame),
            Outcome::Response(frame) => {
                error!(
                    "Bus {}: reply function {:#04x} does not match request {:#04x}",
                    self.context.bus, frame.function_code, function
                );
                None
            }
            Outcome::Timeout => {
                if SystemTimer::now_ms() >= self.next_timeout_log {
                    error!("Bus {}: command timeout", self.context.bus);
                    self.next_timeout_log =
                        SystemTimer::now_ms() + config::BUS_DELAY_TIMEOUT_MSG;
                }
                None
            }
            Outcome::ProtocolError => {
                error!("Bus {}: command response unparseable", self.context.bus);
                None
            }
        }
    }

    fn push_reply(&self, reply: Command) {
        if !host::HOST_COMMAND_QUEUE.send(reply) {
            error!(
                "Bus {}: host reply queue full, reply dropped",
                self.context.bus
            );
        }
    }
}

// ============================================================================
// Pure helpers
// ============================================================================

/// Change detection over one periodic reply.
///
/// Requires exactly one 16-bit word of payload. Updates `last_data`
/// unconditionally; returns the change event iff any byte differs from
/// the previous observation, with `data_mask` = old XOR new.
fn process_periodic_reply(entry: &mut PeriodicRead, frame: &Frame) -> Option<CommandKind> {
    if frame.data_size != 2 {
        error!(
            "Periodic reply data size {} (want 2), slave {}",
            frame.data_size, entry.device.slave
        );
        return None;
    }

    let new = ((frame.data[0] as u16) << 8) | frame.data[1] as u16;
    let mask = new ^ entry.last_data;
    entry.last_data = new;

    if mask != 0 {
        Some(CommandKind::PeriodicChange {
            data: new,
            data_mask: mask,
        })
    } else {
        None
    }
}

/// Synthesize the reply for a serviced command. `frame` is `Some` only
/// when a response with the matching function code arrived in time.
fn build_command_reply(command: &Command, frame: Option<&Frame>) -> Command {
    let done = frame.is_some();

    let kind = match command.kind {
        CommandKind::Read => {
            let data = match frame {
                Some(frame) if frame.data_size >= 2 => {
                    ((frame.data[0] as u16) << 8) | frame.data[1] as u16
                }
                _ => 0,
            };
            CommandKind::ReadReply { done, data }
        }
        _ => CommandKind::WriteReply { done },
    };

    Command {
        seq: command.seq,
        device: command.device,
        kind,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn read_entry() -> PeriodicRead {
        PeriodicRead {
            device: Device {
                bus: 2,
                slave: 7,
                function: 0x03,
                address: 0x0010,
            },
            next_run: 0,
            last_data: 0,
        }
    }

    fn reply_frame(data: [u8; 2]) -> Frame {
        let mut frame = Frame::default();
        frame.slave = 7;
        frame.function_code = 0x03;
        frame.data[..2].copy_from_slice(&data);
        frame.data_size = 2;
        frame
    }

    #[test_case]
    fn test_first_nonzero_observation_reports_change() {
        let mut entry = read_entry();
        let change = process_periodic_reply(&mut entry, &reply_frame([0x00, 0x2A]));

        assert_eq!(
            change,
            Some(CommandKind::PeriodicChange {
                data: 0x002A,
                data_mask: 0x002A,
            })
        );
        assert_eq!(entry.last_data, 0x002A);
    }

    #[test_case]
    fn test_first_zero_observation_is_silent() {
        let mut entry = read_entry();
        assert_eq!(process_periodic_reply(&mut entry, &reply_frame([0, 0])), None);
    }

    #[test_case]
    fn test_low_byte_change_mask() {
        let mut entry = read_entry();
        entry.last_data = 0x002A;

        let change = process_periodic_reply(&mut entry, &reply_frame([0x00, 0x2B]));
        assert_eq!(
            change,
            Some(CommandKind::PeriodicChange {
                data: 0x002B,
                data_mask: 0x0001,
            })
        );
    }

    #[test_case]
    fn test_unchanged_value_is_silent() {
        let mut entry = read_entry();
        entry.last_data = 0x1234;
        assert_eq!(
            process_periodic_reply(&mut entry, &reply_frame([0x12, 0x34])),
            None
        );
        assert_eq!(entry.last_data, 0x1234);
    }

    #[test_case]
    fn test_wrong_data_size_rejected_without_update() {
        let mut entry = read_entry();
        entry.last_data = 0x0001;

        let mut frame = reply_frame([0xFF, 0xFF]);
        frame.data_size = 4;

        assert_eq!(process_periodic_reply(&mut entry, &frame), None);
        assert_eq!(entry.last_data, 0x0001, "rejected reply must not update state");
    }

    #[test_case]
    fn test_read_reply_success() {
        let command = Command {
            seq: 5,
            device: Device {
                bus: 2,
                slave: 9,
                function: 0x03,
                address: 0,
            },
            kind: CommandKind::Read,
        };

        let frame = reply_frame([0xAB, 0xCD]);
        let reply = build_command_reply(&command, Some(&frame));

        assert_eq!(reply.seq, 5);
        assert_eq!(
            reply.kind,
            CommandKind::ReadReply {
                done: true,
                data: 0xABCD,
            }
        );
    }

    #[test_case]
    fn test_read_reply_timeout() {
        let command = Command {
            seq: 5,
            device: Device {
                bus: 2,
                slave: 9,
                function: 0x03,
                address: 0,
            },
            kind: CommandKind::Read,
        };

        let reply = build_command_reply(&command, None);
        assert_eq!(
            reply.kind,
            CommandKind::ReadReply {
                done: false,
                data: 0,
            }
        );
    }

    #[test_case]
    fn test_write_reply_pairs_seq() {
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

        let frame = {
            let mut f = Frame::default();
            f.function_code = 0x10;
            f
        };

        let reply = build_command_reply(&command, Some(&frame));
        assert_eq!(reply.seq, 6);
        assert_eq!(reply.kind, CommandKind::WriteReply { done: true });
    }

    #[test_case]
    fn test_settle_time_floors_at_minimum() {
        // At 115200 baud ten wire bytes take under a millisecond; the
        // configured floor keeps the turnaround slot conservative.
        let fast = ((100u64 * 1_000_000) / 115_200)
            .div_ceil(1000)
            .max(config::BUS_DELAY_WRITE_READ);
        assert_eq!(fast, config::BUS_DELAY_WRITE_READ);

        let slow = ((100u64 * 1_000_000) / 9600)
            .div_ceil(1000)
            .max(config::BUS_DELAY_WRITE_READ);
        assert_eq!(slow, 11);
    }
}
