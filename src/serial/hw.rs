//! Hardware-UART byte-stream endpoint.
//!
//! Wraps one PL011 in a pair of [`ByteStream`]s so tasks see non-blocking
//! reads and writes while the interrupt handler moves bytes to and from
//! the FIFOs. The host link (UART1) is the only endpoint of this kind;
//! the console UART stays a plain blocking writer.

use crate::config;
use crate::drivers::gpio::{Function, Gpio, Pull};
use crate::drivers::resets;
use crate::drivers::uart::{Pl011, UART1_BASE};
use crate::interrupts;
use crate::serial::stream::ByteStream;
use core::sync::atomic::{AtomicBool, Ordering};

/// Interrupt-fed endpoint over one hardware UART.
pub struct HwUart {
    base: usize,
    baudrate: u32,
    tx_pin: u32,
    rx_pin: u32,
    irq: u32,
    pub tx_stream: ByteStream,
    pub rx_stream: ByteStream,
    /// Set on any non-empty I/O; cleared by the maintenance pass.
    pub activity: AtomicBool,
}

/// The host protocol link.
pub static HOST_UART: HwUart = HwUart {
    base: UART1_BASE,
    baudrate: config::HW_UART_DEFAULT_BAUDRATE,
    tx_pin: config::HOST_TX_PIN,
    rx_pin: config::HOST_RX_PIN,
    irq: interrupts::irq::UART1_IRQ,
    tx_stream: ByteStream::new(),
    rx_stream: ByteStream::new(),
    activity: AtomicBool::new(false),
};

impl HwUart {
    #[inline]
    fn pl011(&self) -> Pl011 {
        // SAFETY: base is one of the two PL011 blocks; configuration goes
        // only through init(), FIFO accessors are direction-exclusive.
        unsafe { Pl011::new(self.base) }
    }

    /// Bring up the UART: pads, baudrate, RX interrupts, NVIC line.
    pub fn init(&'static self) {
        resets::bring_up(resets::Block::Uart1);

        let gpio = Gpio::new();
        gpio.set_function(self.tx_pin, Function::Uart);
        gpio.set_function(self.rx_pin, Function::Uart);
        gpio.set_pull(self.tx_pin, Pull::Up);
        gpio.set_pull(self.rx_pin, Pull::Up);

        let mut uart = self.pl011();
        uart.init(self.baudrate);
        uart.enable_rx_interrupt();

        crate::serial::register_hw_uart(self);
        interrupts::clear_pending(self.irq);
        interrupts::enable(self.irq);
    }

    /// Move bytes from the TX stream into the hardware FIFO.
    ///
    /// Callers are the interrupt handler and the IRQ-masked section of
    /// `write_bytes`; the mask keeps the stream single-consumer.
    fn fill_tx_fifo(&self) {
        let mut uart = self.pl011();
        while uart.is_writable() {
            match self.tx_stream.pop() {
                Some(byte) => uart.write_fifo(byte),
                None => break,
            }
        }
    }

    /// Queue `src` for transmission. Never blocks.
    ///
    /// The PL011 transmit interrupt fires on a level *transition*, so an
    /// idle FIFO must be primed from here; the IRQ mask keeps the
    /// in-flight interrupt handler off the TX stream meanwhile. Whatever
    /// does not fit the FIFO drains through the interrupt. A full stream
    /// drops the tail of `src` and latches overrun.
    pub fn write_bytes(&self, src: &[u8]) -> usize {
        if src.is_empty() {
            return 0;
        }

        let written = self.tx_stream.push_slice(src);

        crate::sync::mutex::with_irqs_masked(|| {
            self.fill_tx_fifo();
            if !self.tx_stream.is_empty() {
                self.pl011().set_tx_interrupt(true);
            }
        });

        self.activity.store(true, Ordering::Relaxed);
        written
    }

    /// Drain up to `dst.len()` received bytes. Never blocks.
    pub fn read_bytes(&self, dst: &mut [u8]) -> usize {
        self.rx_stream.pop_slice(dst)
    }

    /// Read a single received byte.
    pub fn read_byte(&self) -> Option<u8> {
        self.rx_stream.pop()
    }

    /// Discard everything in the RX path, hardware FIFO included.
    pub fn rx_flush(&self) {
        let mut uart = self.pl011();
        while uart.is_readable() {
            let _ = uart.read_fifo();
        }
        self.rx_stream.drain();
    }

    /// Free space in the TX stream.
    pub fn tx_space(&self) -> usize {
        self.tx_stream.free_space()
    }

    /// Interrupt body, shared by RX and TX conditions.
    ///
    /// Invariants: never blocks, drains the RX FIFO completely per
    /// invocation, and disables the TX interrupt the moment the TX
    /// stream runs dry.
    fn handle_interrupt(&self) {
        let mut uart = self.pl011();

        if uart.is_rx_irq() {
            let mut any = false;
            while uart.is_readable() {
                self.rx_stream.push(uart.read_fifo());
                any = true;
            }
            if any {
                self.activity.store(true, Ordering::Relaxed);
            }
            uart.clear_rx_irq();
        }

        if uart.is_tx_irq() {
            self.fill_tx_fifo();
            if self.tx_stream.is_empty() {
                uart.set_tx_interrupt(false);
            }
        }
    }
}

/// UART1 interrupt entry (host link).
#[unsafe(no_mangle)]
pub extern "C" fn isr_uart1() {
    HOST_UART.handle_interrupt();
}

/// UART0 interrupt entry. The console never unmasks its interrupts, so
/// this only backstops a spurious NVIC assertion.
#[unsafe(no_mangle)]
pub extern "C" fn isr_uart0() {
    interrupts::clear_pending(interrupts::irq::UART0_IRQ);
}
