//! RP2350 PIO block driver.
//!
//! Each PIO block has 32 shared instruction slots and four state machines,
//! every one with its own clock divider, 4-deep TX/RX FIFOs and two
//! interrupt request lines (IRQ0/IRQ1) with independently maskable
//! sources. This driver covers what the soft-UART and DMX channels need:
//! program loading with JMP relocation, state machine claim/configure,
//! FIFO access and interrupt-source routing.
//!
//! Configuration goes through the locked [`PioBlock`] singletons; the hot
//! FIFO and IRQ-flag paths are free functions over the raw block base so
//! interrupt handlers never take a lock.
//!
//! Reference: RP2350 datasheet, Section 11.

use core::ptr::{read_volatile, write_volatile};
use lazy_static::lazy_static;
use spin::Mutex;

/// PIO0 base address.
pub const PIO0_BASE: usize = 0x5020_0000;

/// PIO1 base address.
pub const PIO1_BASE: usize = 0x5030_0000;

/// Instruction slots per block.
pub const INSTR_SLOTS: u32 = 32;

/// State machines per block.
pub const NUM_SMS: u8 = 4;

/// Register offsets from a PIO block base.
#[allow(dead_code)]
mod offset {
    pub const CTRL: usize = 0x000;
    pub const FSTAT: usize = 0x004;
    pub const FDEBUG: usize = 0x008;
    pub const FLEVEL: usize = 0x00c;
    pub const TXF0: usize = 0x010; // TXF0..TXF3, 4 bytes apart
    pub const RXF0: usize = 0x020; // RXF0..RXF3, 4 bytes apart
    pub const IRQ: usize = 0x030; // SM IRQ flags, write 1 to clear
    pub const INSTR_MEM0: usize = 0x048; // 32 slots, 4 bytes apart
    pub const SM0_CLKDIV: usize = 0x0c8; // 6 registers per SM
    pub const GPIOBASE: usize = 0x168;
    pub const INTR: usize = 0x16c;
    pub const IRQ0_INTE: usize = 0x170;
    pub const IRQ0_INTS: usize = 0x178;
    pub const IRQ1_INTE: usize = 0x17c;
    pub const IRQ1_INTS: usize = 0x184;

    /// Stride of the per-SM register group (CLKDIV..PINCTRL).
    pub const SM_STRIDE: usize = 0x18;
    pub const SM_CLKDIV: usize = 0x0;
    pub const SM_EXECCTRL: usize = 0x4;
    pub const SM_SHIFTCTRL: usize = 0x8;
    pub const SM_INSTR: usize = 0x10;
    pub const SM_PINCTRL: usize = 0x14;
}

/// Interrupt sources, as bit positions in INTR / IRQn_INTE / IRQn_INTS.
///
/// Layout: bits 0..3 = SMx RX FIFO not empty, bits 4..7 = SMx TX FIFO not
/// full, bits 8..15 = state machine IRQ flags 0..7.
#[inline]
pub fn source_rx_not_empty(sm: u8) -> u32 {
    1 << sm
}

#[inline]
pub fn source_tx_not_full(sm: u8) -> u32 {
    1 << (4 + sm)
}

#[inline]
pub fn source_sm_irq(flag: u8) -> u32 {
    1 << (8 + flag)
}

/// Which of the block's two NVIC lines a source is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum IrqIndex {
    Irq0 = 0,
    Irq1 = 1,
}

/// Per-state-machine configuration, written verbatim into the SM registers.
#[derive(Debug, Clone, Copy)]
pub struct SmConfig {
    pub clkdiv: u32,
    pub execctrl: u32,
    pub shiftctrl: u32,
    pub pinctrl: u32,
}

/// EXECCTRL field constructors.
pub mod execctrl {
    /// Side-set is optional per instruction (top bit of the delay/side
    /// field becomes the enable).
    pub const SIDE_EN: u32 = 1 << 30;

    /// Program wrap range: after executing `top`, fetch from `bottom`.
    pub fn wrap(bottom: u32, top: u32) -> u32 {
        (bottom << 7) | (top << 12)
    }

    /// STATUS asserts all-ones while the TX FIFO holds fewer than `n`.
    pub fn status_tx_less_than(n: u32) -> u32 {
        n // STATUS_SEL = 0 (TX level) in bits 6:5
    }

    /// Input pin tested by `jmp pin`.
    pub fn jmp_pin(pin: u32) -> u32 {
        pin << 24
    }
}

/// SHIFTCTRL field constructors.
pub mod shiftctrl {
    pub const AUTOPUSH: u32 = 1 << 16;
    pub const AUTOPULL: u32 = 1 << 17;
    pub const IN_SHIFTDIR_RIGHT: u32 = 1 << 18;
    pub const OUT_SHIFTDIR_RIGHT: u32 = 1 << 19;
}

/// PINCTRL field constructors.
pub mod pinctrl {
    pub fn out_pins(base: u32, count: u32) -> u32 {
        base | (count << 20)
    }

    pub fn set_pins(base: u32, count: u32) -> u32 {
        (base << 5) | (count << 26)
    }

    pub fn sideset_pins(base: u32, count: u32) -> u32 {
        (base << 10) | (count << 29)
    }

    pub fn in_pins(base: u32) -> u32 {
        base << 15
    }
}

/// Fixed-point clock divider for `cycles_per_bit * baud` execution rate.
pub fn clkdiv_for_rate(clk_hz: u32, cycles_per_bit: u32, baud: u32) -> u32 {
    let denom = cycles_per_bit * baud;
    let int = clk_hz / denom;
    let rem = clk_hz % denom;
    let frac = ((rem as u64 * 256) / denom as u64) as u32;
    (int << 16) | (frac << 8)
}

#[inline]
unsafe fn reg(base: usize, offset: usize) -> *mut u32 {
    (base + offset) as *mut u32
}

// ============================================================================
// Configuration interface (locked)
// ============================================================================

lazy_static! {
    pub static ref PIO0: Mutex<PioBlock> = Mutex::new(PioBlock::new(PIO0_BASE));
    pub static ref PIO1: Mutex<PioBlock> = Mutex::new(PioBlock::new(PIO1_BASE));
}

/// One PIO block plus its allocation bookkeeping.
pub struct PioBlock {
    base: usize,
    claimed_sms: u8,
    next_instr: u32,
}

impl PioBlock {
    const fn new(base: usize) -> Self {
        PioBlock {
            base,
            claimed_sms: 0,
            next_instr: 0,
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Claim the lowest free state machine, or `None` if all four are taken.
    pub fn claim_sm(&mut self) -> Option<u8> {
        for sm in 0..NUM_SMS {
            if self.claimed_sms & (1 << sm) == 0 {
                self.claimed_sms |= 1 << sm;
                return Some(sm);
            }
        }
        None
    }

    /// Load a program into instruction memory, relocating JMP targets.
    ///
    /// Returns the load offset, or `None` if the block has no room left.
    pub fn add_program(&mut self, program: &[u16]) -> Option<u32> {
        let offset = self.next_instr;
        if offset + program.len() as u32 > INSTR_SLOTS {
            return None;
        }

        for (i, &instr) in program.iter().enumerate() {
            // JMP is the all-zero major opcode; its 5-bit target is
            // program-relative and must be rebased to the load offset.
            let relocated = if instr & 0xe000 == 0x0000 {
                instr + offset as u16
            } else {
                instr
            };

            // SAFETY: INSTR_MEM slot index is bounded by the room check.
            unsafe {
                write_volatile(
                    reg(self.base, offset::INSTR_MEM0 + (offset as usize + i) * 4),
                    relocated as u32,
                );
            }
        }

        self.next_instr += program.len() as u32;
        Some(offset)
    }

    /// Program one state machine, leaving it disabled.
    ///
    /// The caller force-executes any pin/pindir setup and the initial JMP
    /// with [`sm_exec`](Self::sm_exec), then starts the machine with
    /// [`sm_set_enabled`](Self::sm_set_enabled).
    pub fn sm_init(&mut self, sm: u8, config: &SmConfig) {
        let sm_base = offset::SM0_CLKDIV + sm as usize * offset::SM_STRIDE;

        // SAFETY: All offsets are within the block's register map for a
        // claimed SM; the SM is disabled while reconfigured.
        unsafe {
            // Disable
            let ctrl = reg(self.base, offset::CTRL);
            write_volatile(ctrl, read_volatile(ctrl) & !(1 << sm));

            write_volatile(reg(self.base, sm_base + offset::SM_CLKDIV), config.clkdiv);
            write_volatile(
                reg(self.base, sm_base + offset::SM_EXECCTRL),
                config.execctrl,
            );
            write_volatile(
                reg(self.base, sm_base + offset::SM_SHIFTCTRL),
                config.shiftctrl,
            );
            write_volatile(
                reg(self.base, sm_base + offset::SM_PINCTRL),
                config.pinctrl,
            );

            // Drain both FIFOs by toggling FJOIN_RX (changing the join
            // configuration clears FIFO state).
            let shift = reg(self.base, sm_base + offset::SM_SHIFTCTRL);
            write_volatile(shift, config.shiftctrl ^ (1 << 31));
            write_volatile(shift, config.shiftctrl);

            // Restart the SM and its clock divider.
            write_volatile(ctrl, read_volatile(ctrl) | (1 << (4 + sm)) | (1 << (8 + sm)));
        }
    }

    /// Start or stop one state machine.
    pub fn sm_set_enabled(&mut self, sm: u8, enabled: bool) {
        // SAFETY: CTRL.SM_ENABLE read-modify-write on a claimed SM.
        unsafe {
            let ctrl = reg(self.base, offset::CTRL);
            if enabled {
                write_volatile(ctrl, read_volatile(ctrl) | (1 << sm));
            } else {
                write_volatile(ctrl, read_volatile(ctrl) & !(1 << sm));
            }
        }
    }

    /// Force-execute one instruction on a (possibly stopped) SM.
    ///
    /// Used for pin and pindir setup before a program starts: a bare JMP
    /// encoding doubles as "jump to address", and SET instructions drive
    /// pins through the SM's PINCTRL mapping.
    pub fn sm_exec(&mut self, sm: u8, instr: u16) {
        let sm_base = offset::SM0_CLKDIV + sm as usize * offset::SM_STRIDE;
        // SAFETY: SM_INSTR accepts any encoded instruction.
        unsafe {
            write_volatile(reg(self.base, sm_base + offset::SM_INSTR), instr as u32);
        }
    }

    /// Route an interrupt source to one of the block's NVIC lines.
    pub fn set_irq_source_enabled(&mut self, index: IrqIndex, source_bit: u32, enabled: bool) {
        set_irq_source_enabled_raw(self.base, index, source_bit, enabled);
    }
}

// ============================================================================
// Hot paths (raw base, ISR safe)
// ============================================================================

/// Bus-level atomic register aliases (RP2350 datasheet, Section 2.1.3):
/// writing through these performs a hardware bit-set/bit-clear.
const ATOMIC_SET: usize = 0x2000;
const ATOMIC_CLR: usize = 0x3000;

/// Enable/disable an interrupt source. Also callable from ISR context to
/// silence the TX FIFO line once a stream drains.
///
/// Uses the atomic set/clear aliases: a task enabling one source and an
/// ISR disabling another must not lose each other's bits to a
/// read-modify-write race.
pub fn set_irq_source_enabled_raw(base: usize, index: IrqIndex, source_bit: u32, enabled: bool) {
    let inte = match index {
        IrqIndex::Irq0 => offset::IRQ0_INTE,
        IrqIndex::Irq1 => offset::IRQ1_INTE,
    };
    let alias = if enabled { ATOMIC_SET } else { ATOMIC_CLR };

    // SAFETY: The aliased write touches exactly the source bit.
    unsafe {
        write_volatile(reg(base + alias, inte), source_bit);
    }
}

/// Pending (masked) interrupt status for one NVIC line.
#[inline]
pub fn irq_status(base: usize, index: IrqIndex) -> u32 {
    let ints = match index {
        IrqIndex::Irq0 => offset::IRQ0_INTS,
        IrqIndex::Irq1 => offset::IRQ1_INTS,
    };
    // SAFETY: INTS is read-only.
    unsafe { read_volatile(reg(base, ints)) }
}

/// True if `sm`'s TX FIFO is full.
#[inline]
pub fn tx_full(base: usize, sm: u8) -> bool {
    // FSTAT.TXFULL occupies bits 16..19
    // SAFETY: FSTAT is read-only.
    unsafe { read_volatile(reg(base, offset::FSTAT)) & (1 << (16 + sm)) != 0 }
}

/// True if `sm`'s RX FIFO is empty.
#[inline]
pub fn rx_empty(base: usize, sm: u8) -> bool {
    // FSTAT.RXEMPTY occupies bits 8..11
    // SAFETY: FSTAT is read-only.
    unsafe { read_volatile(reg(base, offset::FSTAT)) & (1 << (8 + sm)) != 0 }
}

/// Push one byte into `sm`'s TX FIFO. Caller checks `tx_full` first.
#[inline]
pub fn tx_push(base: usize, sm: u8, byte: u8) {
    // SAFETY: TXFn is write-only; a push on a non-full FIFO is always valid.
    unsafe {
        write_volatile(reg(base, offset::TXF0 + sm as usize * 4), byte as u32);
    }
}

/// Pop one byte from `sm`'s RX FIFO. Caller checks `rx_empty` first.
///
/// The RX shift register shifts right, so an 8-bit frame lands in the top
/// byte of the FIFO word.
#[inline]
pub fn rx_pull(base: usize, sm: u8) -> u8 {
    // SAFETY: RXFn read pops the FIFO; guarded by rx_empty.
    unsafe { (read_volatile(reg(base, offset::RXF0 + sm as usize * 4)) >> 24) as u8 }
}

/// True if state machine IRQ flag `flag` is raised.
#[inline]
pub fn sm_irq_get(base: usize, flag: u8) -> bool {
    // SAFETY: IRQ is readable; write-1-to-clear semantics.
    unsafe { read_volatile(reg(base, offset::IRQ)) & (1 << flag) != 0 }
}

/// Clear state machine IRQ flag `flag`.
#[inline]
pub fn sm_irq_clear(base: usize, flag: u8) {
    // SAFETY: Writing a 1 bit clears exactly that flag.
    unsafe {
        write_volatile(reg(base, offset::IRQ), 1 << flag);
    }
}
