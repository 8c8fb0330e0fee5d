//! PIO soft-UART endpoints for the six RS-485 channels.
//!
//! Each channel consumes one state machine per direction: RX programs
//! share PIO0, TX programs share PIO1. The TX program drives the RS-485
//! driver-enable pin through its second side-set bit, so the transceiver
//! is released exactly when the stop bit of the last buffered byte has
//! left the shift register - that moment is also reported back as the
//! TX-done flag through a state machine IRQ.
//!
//! Interrupt partitioning (one handler per PIO block line, fanning out
//! over the active channel table):
//! - PIO0 line 0: RX FIFO not empty, all channels
//! - PIO1 line 0: TX done, all channels
//! - PIO1 line 1: TX FIFO not full, all channels
//!
//! TX-done and TX-FIFO share a peripheral and must stay on distinct
//! lines; the constants below are checked at compile time.

use crate::config;
use crate::drivers::gpio::{Function, Gpio, Pull};
use crate::drivers::pio::{
    self, IrqIndex, SmConfig, clkdiv_for_rate, execctrl, pinctrl, shiftctrl, PIO0_BASE, PIO1_BASE,
};
use crate::drivers::{clocks, resets};
use crate::interrupts;
use crate::serial::stream::ByteStream;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

/// PIO block hosting every RX state machine.
const RX_PIO_BASE: usize = PIO0_BASE;

/// PIO block hosting every TX state machine.
const TX_PIO_BASE: usize = PIO1_BASE;

/// Interrupt line assignment per block.
const RX_FIFO_IRQ_INDEX: IrqIndex = IrqIndex::Irq0;
const TX_DONE_IRQ_INDEX: IrqIndex = IrqIndex::Irq0;
const TX_FIFO_IRQ_INDEX: IrqIndex = IrqIndex::Irq1;

// TX-done and TX-FIFO-not-full must use distinct lines of the TX block,
// otherwise one handler would have to disambiguate the other's sources.
const _: () = assert!(TX_DONE_IRQ_INDEX as usize != TX_FIFO_IRQ_INDEX as usize);

/// Soft-UART TX program, 8 cycles per bit, side-set = {bit0: TX, bit1: EN}.
///
/// ```text
/// .program uart_tx
/// .side_set 2
///         pull block      side 0b01       ; idle mark, driver disabled
/// start:  set x, 7        side 0b10 [7]   ; start bit, driver enabled
/// bitloop:
///         out pins, 1     side 0b10
///         jmp x-- bitloop side 0b10 [6]   ; 8 cycles per data bit
///         mov x, status   side 0b11 [5]   ; stop bit; STATUS = TX FIFO empty?
///         jmp !x next     side 0b11       ; more queued: keep driver enabled
///         irq set 0 rel   side 0b01       ; drained: raise TX-done, release
/// .wrap                                   ; back to the blocking pull
/// next:   pull block      side 0b11
///         jmp start       side 0b11
/// ```
const UART_TX_PROGRAM: [u16; 9] = [
    0x88a0, // pull block           side 0b01
    0xf727, // set x, 7             side 0b10 [7]
    0x7001, // out pins, 1          side 0b10
    0x1642, // jmp x-- 2            side 0b10 [6]
    0xbd25, // mov x, status        side 0b11 [5]
    0x1827, // jmp !x 7             side 0b11
    0xc810, // irq set 0 rel        side 0b01
    0x98a0, // pull block           side 0b11
    0x1801, // jmp 1                side 0b11
];
const UART_TX_WRAP: (u32, u32) = (0, 6);
const UART_TX_CYCLES_PER_BIT: u32 = 8;

/// Soft-UART RX program, 8 cycles per bit, LSB-first into the high byte.
///
/// ```text
/// .program uart_rx
/// start:  wait 0 pin 0            ; stall until start bit
///         set x, 7        [10]    ; sample mid-bit from here on
/// bitloop:
///         in pins, 1
///         jmp x-- bitloop [6]
///         jmp pin good            ; stop bit high -> byte is sound
///         irq 4 rel               ; framing error / break
///         wait 1 pin 0            ; wait for idle, discard the byte
///         jmp start
/// good:   push block
/// .wrap
/// ```
const UART_RX_PROGRAM: [u16; 9] = [
    0x2020, // wait 0 pin 0
    0xea27, // set x, 7             [10]
    0x4001, // in pins, 1
    0x0642, // jmp x-- 2            [6]
    0x00c8, // jmp pin 8
    0xc014, // irq 4 rel
    0x20a0, // wait 1 pin 0
    0x0000, // jmp 0
    0x8020, // push block
];
const UART_RX_WRAP: (u32, u32) = (0, 8);
const UART_RX_CYCLES_PER_BIT: u32 = 8;

/// One RS-485 soft-UART channel.
pub struct PioUart {
    /// Bus id, 0..5. Also indexes the active channel table.
    pub id: u8,
    rx_pin: u32,
    tx_pin: u32,
    en_pin: u32,
    baudrate: AtomicU32,
    rx_sm: AtomicU8,
    tx_sm: AtomicU8,
    initialized: AtomicBool,
    /// True while the line is idle; cleared on write, set by TX-done.
    pub tx_done: AtomicBool,
    pub tx_stream: ByteStream,
    pub rx_stream: ByteStream,
    /// Set on any non-empty I/O; cleared by the maintenance pass.
    pub activity: AtomicBool,
}

impl PioUart {
    const fn new(id: u8) -> Self {
        let (rx_pin, tx_pin, en_pin) = config::BUS_PINS[id as usize];
        PioUart {
            id,
            rx_pin,
            tx_pin,
            en_pin,
            baudrate: AtomicU32::new(config::PIO_UART_DEFAULT_BAUDRATE),
            rx_sm: AtomicU8::new(0),
            tx_sm: AtomicU8::new(0),
            initialized: AtomicBool::new(false),
            tx_done: AtomicBool::new(true),
            tx_stream: ByteStream::new(),
            rx_stream: ByteStream::new(),
            activity: AtomicBool::new(false),
        }
    }
}

/// The six channels, indexed by bus id.
pub static PIO_UARTS: [PioUart; config::COUNT_PIO_UARTS] = [
    PioUart::new(0),
    PioUart::new(1),
    PioUart::new(2),
    PioUart::new(3),
    PioUart::new(4),
    PioUart::new(5),
];

/// Look up a channel by bus id.
pub fn get_pio_uart(index: u8) -> Option<&'static PioUart> {
    PIO_UARTS.get(index as usize)
}

/// Program load offsets, shared by every channel on the block.
static RX_PROGRAM_OFFSET: spin::Mutex<Option<u32>> = spin::Mutex::new(None);
static TX_PROGRAM_OFFSET: spin::Mutex<Option<u32>> = spin::Mutex::new(None);

impl PioUart {
    /// Override the default baudrate. Takes effect at `init`.
    pub fn set_baudrate(&self, baudrate: u32) {
        if baudrate > 0 {
            self.baudrate.store(baudrate, Ordering::Relaxed);
        }
    }

    /// Claim state machines on both blocks and start the channel.
    ///
    /// # Panics
    ///
    /// Panics if either block has no free state machine. That means the
    /// board is configured beyond its hardware and only a reboot (via the
    /// watchdog on panic) recovers.
    pub fn init(&'static self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }

        let baud = self.baudrate.load(Ordering::Relaxed);
        let gpio = Gpio::new();

        // RX: PIO0 state machine watching rx_pin.
        {
            let mut block = pio::PIO0.lock();

            let offset = {
                let mut loaded = RX_PROGRAM_OFFSET.lock();
                match *loaded {
                    Some(offset) => offset,
                    None => {
                        let offset = block
                            .add_program(&UART_RX_PROGRAM)
                            .expect("No PIO0 instruction space for RX program!");
                        *loaded = Some(offset);
                        offset
                    }
                }
            };

            let sm = match block.claim_sm() {
                Some(sm) => sm,
                None => panic!("No RX State Machine available!"),
            };
            self.rx_sm.store(sm, Ordering::Relaxed);

            gpio.set_function(self.rx_pin, Function::Pio0);
            gpio.set_pull(self.rx_pin, Pull::Up);

            let config = SmConfig {
                clkdiv: clkdiv_for_rate(clocks::CLK_SYS_HZ, UART_RX_CYCLES_PER_BIT, baud),
                execctrl: execctrl::wrap(offset + UART_RX_WRAP.0, offset + UART_RX_WRAP.1)
                    | execctrl::jmp_pin(self.rx_pin),
                shiftctrl: shiftctrl::IN_SHIFTDIR_RIGHT,
                pinctrl: pinctrl::in_pins(self.rx_pin),
            };
            block.sm_init(sm, &config);
            block.sm_exec(sm, offset as u16); // jmp to program start
            block.sm_set_enabled(sm, true);

            block.set_irq_source_enabled(
                RX_FIFO_IRQ_INDEX,
                pio::source_rx_not_empty(sm),
                true,
            );
        }

        // TX: PIO1 state machine driving tx_pin, en_pin = tx_pin + 1.
        {
            let mut block = pio::PIO1.lock();

            let offset = {
                let mut loaded = TX_PROGRAM_OFFSET.lock();
                match *loaded {
                    Some(offset) => offset,
                    None => {
                        let offset = block
                            .add_program(&UART_TX_PROGRAM)
                            .expect("No PIO1 instruction space for TX program!");
                        *loaded = Some(offset);
                        offset
                    }
                }
            };

            let sm = match block.claim_sm() {
                Some(sm) => sm,
                None => panic!("No TX State Machine available!"),
            };
            self.tx_sm.store(sm, Ordering::Relaxed);

            debug_assert_eq!(
                self.en_pin,
                self.tx_pin + 1,
                "side-set pins are consecutive"
            );
            gpio.set_function(self.tx_pin, Function::Pio1);
            gpio.set_function(self.en_pin, Function::Pio1);
            gpio.set_pull(self.tx_pin, Pull::Up);

            let config = SmConfig {
                clkdiv: clkdiv_for_rate(clocks::CLK_SYS_HZ, UART_TX_CYCLES_PER_BIT, baud),
                execctrl: execctrl::wrap(offset + UART_TX_WRAP.0, offset + UART_TX_WRAP.1)
                    | execctrl::status_tx_less_than(1),
                shiftctrl: shiftctrl::OUT_SHIFTDIR_RIGHT,
                pinctrl: pinctrl::out_pins(self.tx_pin, 1)
                    | pinctrl::sideset_pins(self.tx_pin, 2),
            };
            block.sm_init(sm, &config);

            // Line to mark, driver released, both pins outputs. Exec'd
            // instructions carry side-set bits too, so keep TX=1 EN=0
            // through the whole setup.
            block.sm_exec(sm, 0xe801); // set pins, 0b01    side 0b01
            block.sm_exec(sm, 0xe883); // set pindirs, 0b11 side 0b01
            block.sm_exec(sm, 0x0800 | offset as u16); // jmp offset side 0b01
            block.sm_set_enabled(sm, true);

            block.set_irq_source_enabled(TX_DONE_IRQ_INDEX, pio::source_sm_irq(sm), true);
            // TX FIFO line starts masked; write_bytes unmasks on demand.
            block.set_irq_source_enabled(TX_FIFO_IRQ_INDEX, pio::source_tx_not_full(sm), false);
        }

        crate::serial::register_pio_uart(self);

        interrupts::clear_pending(interrupts::irq::PIO0_IRQ_0);
        interrupts::enable(interrupts::irq::PIO0_IRQ_0);
        interrupts::clear_pending(interrupts::irq::PIO1_IRQ_0);
        interrupts::enable(interrupts::irq::PIO1_IRQ_0);
        interrupts::clear_pending(interrupts::irq::PIO1_IRQ_1);
        interrupts::enable(interrupts::irq::PIO1_IRQ_1);
    }

    /// Move bytes from the TX stream into the state machine FIFO.
    ///
    /// Only the TX FIFO interrupt handler calls this: the stream's
    /// consumer role belongs to the ISR alone, so a task queuing bytes
    /// never races it.
    fn fill_tx_fifo(&self) {
        let sm = self.tx_sm.load(Ordering::Relaxed);
        while !pio::tx_full(TX_PIO_BASE, sm) {
            match self.tx_stream.pop() {
                Some(byte) => pio::tx_push(TX_PIO_BASE, sm, byte),
                None => break,
            }
        }
    }

    /// Queue `src` for transmission. Never blocks.
    ///
    /// Unmasking the TX FIFO source is enough to start draining: the
    /// FIFO has room, so the interrupt fires as soon as the NVIC sees
    /// the line.
    pub fn write_bytes(&self, src: &[u8]) -> usize {
        if src.is_empty() {
            return 0;
        }

        let written = self.tx_stream.push_slice(src);
        self.tx_done.store(false, Ordering::Relaxed);

        pio::set_irq_source_enabled_raw(
            TX_PIO_BASE,
            TX_FIFO_IRQ_INDEX,
            pio::source_tx_not_full(self.tx_sm.load(Ordering::Relaxed)),
            true,
        );

        self.activity.store(true, Ordering::Relaxed);
        written
    }

    /// Read a single received byte.
    pub fn read_byte(&self) -> Option<u8> {
        self.rx_stream.pop()
    }

    /// Drain up to `dst.len()` received bytes. Never blocks.
    pub fn read_bytes(&self, dst: &mut [u8]) -> usize {
        self.rx_stream.pop_slice(dst)
    }

    /// Discard everything in the RX path, FIFO included.
    pub fn rx_flush(&self) {
        let sm = self.rx_sm.load(Ordering::Relaxed);
        while !pio::rx_empty(RX_PIO_BASE, sm) {
            let _ = pio::rx_pull(RX_PIO_BASE, sm);
        }
        self.rx_stream.drain();
    }

    /// Free space in the TX stream.
    pub fn tx_space(&self) -> usize {
        self.tx_stream.free_space()
    }

    /// True once the last queued byte's stop bit has left the line and
    /// the RS-485 driver has been released.
    pub fn is_tx_done(&self) -> bool {
        self.tx_done.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Interrupt fan-out
// ============================================================================

/// PIO0 line 0: RX FIFO not empty on any channel.
#[unsafe(no_mangle)]
pub extern "C" fn isr_pio0_irq0() {
    for uart in crate::serial::active_pio_uarts() {
        let sm = uart.rx_sm.load(Ordering::Relaxed);
        let mut any = false;
        while !pio::rx_empty(RX_PIO_BASE, sm) {
            uart.rx_stream.push(pio::rx_pull(RX_PIO_BASE, sm));
            any = true;
        }
        if any {
            uart.activity.store(true, Ordering::Relaxed);
        }
    }
}

/// PIO1 line 0: TX shift register drained on some channel.
#[unsafe(no_mangle)]
pub extern "C" fn isr_pio1_irq0() {
    for uart in crate::serial::active_pio_uarts() {
        let sm = uart.tx_sm.load(Ordering::Relaxed);
        if pio::sm_irq_get(TX_PIO_BASE, sm) {
            uart.tx_done.store(true, Ordering::Relaxed);
            pio::sm_irq_clear(TX_PIO_BASE, sm);
        }
    }
}

/// PIO1 line 1: TX FIFO not full on some channel.
#[unsafe(no_mangle)]
pub extern "C" fn isr_pio1_irq1() {
    for uart in crate::serial::active_pio_uarts() {
        let sm = uart.tx_sm.load(Ordering::Relaxed);
        if !pio::tx_full(TX_PIO_BASE, sm) {
            uart.fill_tx_fifo();

            if uart.tx_stream.is_empty() {
                pio::set_irq_source_enabled_raw(
                    TX_PIO_BASE,
                    TX_FIFO_IRQ_INDEX,
                    pio::source_tx_not_full(sm),
                    false,
                );
            }
        }
    }
}

/// Release both PIO blocks from reset. Called once at startup.
pub fn init_pio_blocks() {
    resets::bring_up(resets::Block::Pio0);
    resets::bring_up(resets::Block::Pio1);
}
