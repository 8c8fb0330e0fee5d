//! Firmware-wide configuration constants.
//!
//! Timing values, queue depths and the board pin map live here so the
//! rest of the crate never hard-codes a number twice.

// ============================================================================
// Bus configuration
// ============================================================================

/// Scratch buffer size for building/parsing one Modbus RTU frame.
pub const BUS_MODBUS_FRAME_BUFFER_SIZE: usize = 64;

/// Minimum interval between repeated timeout log messages, per bus (ms).
pub const BUS_DELAY_TIMEOUT_MSG: u64 = 5000;

/// How long to wait for a slave response before giving up (ms).
pub const BUS_TIMEOUT_RESPONSE: u64 = 20;

/// Floor for the post-write settle delay before reading the reply (ms).
///
/// The actual delay is derived from the bus baudrate (time of ~10 wire
/// bytes) and never goes below this.
pub const BUS_DELAY_WRITE_READ: u64 = 3;

/// Per-bus command queue depth (host -> engine).
pub const BUS_QUEUE_LENGTH: usize = 50;

// ============================================================================
// Host configuration
// ============================================================================

/// Host link queue depths (engine -> host), one for changes, one for replies.
pub const HOST_QUEUE_LENGTH: usize = 200;

/// Interval between outgoing heartbeat frames (ms).
pub const HOST_HEARTBEAT_INTERVAL: u64 = 1000;

/// Scratch size for draining the host UART each loop.
pub const HOST_UART_BUFFER_SIZE: usize = 64;

// ============================================================================
// Serial subsystem
// ============================================================================

/// Capacity of every RX/TX byte stream. Must be a power of two.
pub const SERIAL_STREAM_SIZE: usize = 256;

/// Number of hardware UART slots (RP2350 has UART0/UART1).
pub const COUNT_HW_UARTS: usize = 2;

/// Number of RS-485 channels carried on PIO soft UARTs.
pub const COUNT_PIO_UARTS: usize = 6;

/// Cadence of the maintenance pass over all active UARTs (ms).
pub const SERIAL_MAINTENANCE_INTERVAL: u64 = 25;

/// Default host link baudrate.
pub const HW_UART_DEFAULT_BAUDRATE: u32 = 230_400;

/// Default RS-485 baudrate, used when CONFIG_BUS carries zero.
pub const PIO_UART_DEFAULT_BAUDRATE: u32 = 115_200;

/// Console (log output) baudrate.
pub const CONSOLE_BAUDRATE: u32 = 115_200;

// ============================================================================
// DMX configuration
// ============================================================================

/// Channels carried in the DMX universe (excluding the start code).
pub const DMX_MAX_CHANNELS: usize = 12;

/// Interval between universe refreshes (ms), ~12 Hz.
pub const DMX_DELAY_BETWEEN_WRITES: u64 = 1000 / 12;

/// DMX write queue depth.
pub const DMX_WRITE_QUEUE_LENGTH: usize = 100;

/// DMX wire rate is fixed by the standard.
pub const DMX_BAUDRATE: u32 = 250_000;

// ============================================================================
// LED configuration
// ============================================================================

/// Serial-activity indicator.
pub const LED_PIN_ACT: u32 = 2;

/// Liveness indicator (on-board LED on the Pico 2).
pub const LED_PIN_BUILTIN: u32 = 25;

/// Activity blink half-period base (ms).
pub const LED_ACT_DELAY: u64 = 40;

/// Liveness blink half-period base (ms).
pub const LED_BUILTIN_DELAY: u64 = 250;

// ============================================================================
// Resource usage reporting
// ============================================================================

/// Interval between resource usage reports (ms).
pub const RES_USAGE_STATS_DELAY: u64 = 5000;

// ============================================================================
// Pin map
// ============================================================================

/// Console UART0: TX/RX.
pub const CONSOLE_TX_PIN: u32 = 0;
pub const CONSOLE_RX_PIN: u32 = 1;

/// Host link UART1: TX/RX.
pub const HOST_TX_PIN: u32 = 4;
pub const HOST_RX_PIN: u32 = 5;

/// RS-485 channels: (rx, tx, en) per bus, indexed by bus id 0..5.
pub const BUS_PINS: [(u32, u32, u32); COUNT_PIO_UARTS] = [
    (7, 8, 9),
    (10, 11, 12),
    (13, 14, 15),
    (18, 16, 17),
    (19, 20, 21),
    (28, 26, 27),
];

/// DMX output reuses the bus 6 transceiver when enabled.
pub const DMX_TX_PIN: u32 = 26;
pub const DMX_EN_PIN: u32 = 27;
