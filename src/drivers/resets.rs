//! RP2350 subsystem reset controller.
//!
//! Every peripheral comes out of power-on held in reset. Drivers call
//! [`bring_up`] for their block before touching any register.

use core::ptr::{read_volatile, write_volatile};

/// RESETS base address (RP2350 datasheet, Section 7).
const RESETS_BASE: usize = 0x4002_0000;

/// Register offsets from RESETS_BASE.
mod offset {
    pub const RESET: usize = 0x0; // 1 = peripheral held in reset
    pub const RESET_DONE: usize = 0x8; // 1 = reset released and settled
}

/// Reset-bit positions for the blocks this firmware uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Block {
    IoBank0 = 6,
    PadsBank0 = 9,
    Pio0 = 11,
    Pio1 = 12,
    PllSys = 14,
    Timer0 = 23,
    Uart0 = 26,
    Uart1 = 27,
}

/// Release a peripheral block from reset and wait until it reports done.
pub fn bring_up(block: Block) {
    let mask = 1u32 << (block as u32);

    // SAFETY: RESETS_BASE is the documented controller address; the
    // read-modify-write only clears this block's bit.
    unsafe {
        let reset = (RESETS_BASE + offset::RESET) as *mut u32;
        let done = (RESETS_BASE + offset::RESET_DONE) as *const u32;

        write_volatile(reset, read_volatile(reset) & !mask);
        while read_volatile(done) & mask == 0 {}
    }
}
