//! PL011 UART driver (RP2350 UART0/UART1).
//!
//! The RP2350 integrates two ARM PL011 UARTs. This module provides the
//! register-level driver plus the console writer used by the `print!`
//! macros and the logger. The interrupt-fed byte-stream endpoints for the
//! host link live in `serial::hw` on top of [`Pl011`].
//!
//! Reference: [ARM PL011 TRM](https://developer.arm.com/documentation/ddi0183/latest/)
//! and RP2350 datasheet, Section 12.1.

use crate::drivers::clocks;
use core::fmt;
use lazy_static::lazy_static;
use spin::Mutex;
use volatile::Volatile;

/// UART0 base address (console).
pub const UART0_BASE: usize = 0x4007_0000;

/// UART1 base address (host link).
pub const UART1_BASE: usize = 0x4007_8000;

/// PL011 register bit definitions.
#[allow(dead_code)]
pub mod pl011_flags {
    // Flag Register (FR) bits - TRM Section 3.3.6
    pub const FR_TXFF: u32 = 1 << 5; // Transmit FIFO full
    pub const FR_RXFE: u32 = 1 << 4; // Receive FIFO empty
    pub const FR_BUSY: u32 = 1 << 3; // Transmitting

    // Line Control Register (LCRH) bits - TRM Section 3.3.7
    pub const LCRH_FEN: u32 = 1 << 4; // FIFO enable
    pub const LCRH_WLEN_8BIT: u32 = 0b11 << 5; // 8-bit word length

    // Control Register (CR) bits - TRM Section 3.3.8
    pub const CR_UARTEN: u32 = 1 << 0; // UART enable
    pub const CR_TXE: u32 = 1 << 8; // Transmit enable
    pub const CR_RXE: u32 = 1 << 9; // Receive enable

    // Data Register (DR) bits - TRM Section 3.3.1
    pub const DR_DATA_MASK: u32 = 0xFF; // Data bits [7:0]

    // Interrupt Mask Set/Clear Register (IMSC) - TRM Section 3.3.11
    pub const IMSC_RXIM: u32 = 1 << 4; // Receive interrupt mask
    pub const IMSC_TXIM: u32 = 1 << 5; // Transmit interrupt mask
    pub const IMSC_RTIM: u32 = 1 << 6; // Receive timeout interrupt mask

    // Masked Interrupt Status Register (MIS) - TRM Section 3.3.12
    pub const MIS_RXMIS: u32 = 1 << 4; // Receive masked interrupt status
    pub const MIS_TXMIS: u32 = 1 << 5; // Transmit masked interrupt status
    pub const MIS_RTMIS: u32 = 1 << 6; // Receive timeout masked interrupt status

    // Interrupt Clear Register (ICR) - TRM Section 3.3.13
    pub const ICR_ALL: u32 = 0x7FF; // Clear all interrupts
}

/// PL011 register block.
#[repr(C)]
pub struct Pl011Registers {
    dr: Volatile<u32>, // 0x00 - Data Register
    _rsv0: [u32; 5],
    fr: Volatile<u32>, // 0x18 - Flag Register
    _rsv1: [u32; 2],
    ibrd: Volatile<u32>, // 0x24 - Integer Baud Rate Divisor
    fbrd: Volatile<u32>, // 0x28 - Fractional Baud Rate Divisor
    lcrh: Volatile<u32>, // 0x2C - Line Control Register
    cr: Volatile<u32>,   // 0x30 - Control Register
    ifls: Volatile<u32>, // 0x34 - Interrupt FIFO Level Select
    imsc: Volatile<u32>, // 0x38 - Interrupt Mask Set/Clear
    _ris: [u32; 1],      // 0x3C - Raw Interrupt Status
    mis: Volatile<u32>,  // 0x40 - Masked Interrupt Status
    icr: Volatile<u32>,  // 0x44 - Interrupt Clear Register
}

/// One PL011 instance.
pub struct Pl011 {
    registers: &'static mut Pl011Registers,
}

impl Pl011 {
    /// Create a driver over one of the two UART register blocks.
    ///
    /// # Safety
    ///
    /// `base` must be `UART0_BASE` or `UART1_BASE`, and the caller must
    /// ensure a single `Pl011` value per block is ever used for
    /// configuration. FIFO accessors are safe from ISR context because
    /// DR reads/writes on distinct directions do not interfere.
    pub const unsafe fn new(base: usize) -> Self {
        Pl011 {
            // SAFETY: base points at a PL011 register block that is always
            // mapped; Pl011Registers matches the TRM layout.
            registers: unsafe { &mut *(base as *mut Pl011Registers) },
        }
    }

    /// Initialize for `baudrate`, 8N1, FIFOs enabled, all IRQs masked.
    pub fn init(&mut self, baudrate: u32) {
        // Disable while reprogramming
        self.registers.cr.write(0);
        self.registers.imsc.write(0);
        self.registers.icr.write(pl011_flags::ICR_ALL);

        // Baud divisor from clk_peri: divisor = clk / (16 * baud), with the
        // fractional part in 1/64ths (TRM Section 3.3.5 rounding).
        let divisor_x8 = 8 * clocks::CLK_PERI_HZ / baudrate;
        let ibrd = divisor_x8 >> 7;
        let fbrd = ((divisor_x8 & 0x7f) + 1) / 2;
        self.registers.ibrd.write(ibrd);
        self.registers.fbrd.write(fbrd);

        // 8 data bits, no parity, 1 stop, FIFO on. LCRH write also latches
        // the baud divisors.
        self.registers
            .lcrh
            .write(pl011_flags::LCRH_FEN | pl011_flags::LCRH_WLEN_8BIT);

        // Interrupt at 1/2 FIFO depth both directions (reset value, set
        // explicitly so the RX latency budget is visible here).
        self.registers.ifls.write(0b010_010);

        self.registers
            .cr
            .write(pl011_flags::CR_UARTEN | pl011_flags::CR_TXE | pl011_flags::CR_RXE);
    }

    /// True if the TX FIFO can accept another byte.
    #[inline]
    pub fn is_writable(&self) -> bool {
        (self.registers.fr.read() & pl011_flags::FR_TXFF) == 0
    }

    /// True if the RX FIFO holds at least one byte.
    #[inline]
    pub fn is_readable(&self) -> bool {
        (self.registers.fr.read() & pl011_flags::FR_RXFE) == 0
    }

    /// Push one byte into the TX FIFO. Caller checks `is_writable` first.
    #[inline]
    pub fn write_fifo(&mut self, byte: u8) {
        self.registers.dr.write(byte as u32);
    }

    /// Pop one byte from the RX FIFO. Caller checks `is_readable` first.
    #[inline]
    pub fn read_fifo(&mut self) -> u8 {
        (self.registers.dr.read() & pl011_flags::DR_DATA_MASK) as u8
    }

    /// Enable RX + RX-timeout interrupts (leaves TX mask untouched).
    pub fn enable_rx_interrupt(&mut self) {
        let imsc = self.registers.imsc.read();
        self.registers
            .imsc
            .write(imsc | pl011_flags::IMSC_RXIM | pl011_flags::IMSC_RTIM);
    }

    /// Enable or disable the TX (FIFO level) interrupt.
    pub fn set_tx_interrupt(&mut self, enabled: bool) {
        let imsc = self.registers.imsc.read();
        if enabled {
            self.registers.imsc.write(imsc | pl011_flags::IMSC_TXIM);
        } else {
            self.registers.imsc.write(imsc & !pl011_flags::IMSC_TXIM);
        }
    }

    /// Masked interrupt status: RX or RX-timeout pending.
    #[inline]
    pub fn is_rx_irq(&self) -> bool {
        (self.registers.mis.read() & (pl011_flags::MIS_RXMIS | pl011_flags::MIS_RTMIS)) != 0
    }

    /// Masked interrupt status: TX FIFO level pending.
    #[inline]
    pub fn is_tx_irq(&self) -> bool {
        (self.registers.mis.read() & pl011_flags::MIS_TXMIS) != 0
    }

    /// Clear latched RX/RX-timeout interrupt status.
    #[inline]
    pub fn clear_rx_irq(&mut self) {
        self.registers
            .icr
            .write(pl011_flags::MIS_RXMIS | pl011_flags::MIS_RTMIS);
    }
}

// ============================================================================
// Console
// ============================================================================

lazy_static! {
    /// Console writer over UART0, shared by `print!` and the logger.
    pub static ref WRITER: Mutex<ConsoleWriter> = Mutex::new(ConsoleWriter::new());
}

/// Blocking console writer for log output.
pub struct ConsoleWriter {
    uart: Pl011,
    initialized: bool,
}

impl ConsoleWriter {
    const fn new() -> Self {
        ConsoleWriter {
            // SAFETY: UART0_BASE is the console UART; the WRITER mutex is
            // the only configuration path for this block.
            uart: unsafe { Pl011::new(UART0_BASE) },
            initialized: false,
        }
    }

    /// Initialize the console UART. Idempotent.
    pub fn init(&mut self) {
        use crate::config;
        use crate::drivers::gpio::{Function, Gpio};

        let gpio = Gpio::new();
        gpio.set_function(config::CONSOLE_TX_PIN, Function::Uart);
        gpio.set_function(config::CONSOLE_RX_PIN, Function::Uart);

        self.uart.init(config::CONSOLE_BAUDRATE);
        self.initialized = true;
    }

    /// Write a single byte, waiting for FIFO space.
    pub fn write_byte(&mut self, byte: u8) {
        if !self.initialized {
            self.init();
        }

        while !self.uart.is_writable() {}
        self.uart.write_fifo(byte);
    }

    /// Write a string, translating `\n` to `\r\n`.
    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}
