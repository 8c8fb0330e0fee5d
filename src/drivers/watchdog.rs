//! RP2350 watchdog.
//!
//! Two uses in this firmware: the host can command a reboot
//! (`PICO_RESET`), and the panic handler pulls the same lever so a fatal
//! condition always ends in a clean restart instead of a wedged board.

use core::ptr::{read_volatile, write_volatile};

/// WATCHDOG base address (RP2350 datasheet, Section 12.9).
const WATCHDOG_BASE: usize = 0x400d_8000;

/// Register offsets from WATCHDOG_BASE.
#[allow(dead_code)]
mod offset {
    pub const CTRL: usize = 0x00;
    pub const LOAD: usize = 0x04;
    pub const REASON: usize = 0x08;
}

mod ctrl_bits {
    pub const TRIGGER: u32 = 1 << 31;
    pub const ENABLE: u32 = 1 << 30;
}

/// Arm the watchdog with a timeout in microseconds (1 µs tick, 24-bit).
///
/// Once armed it must be fed with [`feed`] before the timeout elapses or
/// the chip resets.
pub fn arm(timeout_us: u32) {
    // SAFETY: Documented register addresses; LOAD takes effect on the
    // next enable or feed.
    unsafe {
        write_volatile((WATCHDOG_BASE + offset::LOAD) as *mut u32, timeout_us & 0xff_ffff);
        let ctrl = (WATCHDOG_BASE + offset::CTRL) as *mut u32;
        write_volatile(ctrl, read_volatile(ctrl) | ctrl_bits::ENABLE);
    }
}

/// Reload the watchdog counter.
#[allow(dead_code)]
pub fn feed() {
    // SAFETY: Writing LOAD while enabled restarts the countdown.
    unsafe {
        write_volatile((WATCHDOG_BASE + offset::LOAD) as *mut u32, 0xff_ffff);
    }
}

/// Force an immediate chip reset and never return.
pub fn force_reboot() -> ! {
    // SAFETY: TRIGGER resets the chip; the spin only covers the few
    // cycles before the reset takes hold.
    unsafe {
        let ctrl = (WATCHDOG_BASE + offset::CTRL) as *mut u32;
        write_volatile(ctrl, read_volatile(ctrl) | ctrl_bits::TRIGGER);
    }
    loop {
        core::hint::spin_loop();
    }
}

/// Arm with the minimum practical interval and spin until it fires.
///
/// This is the `PICO_RESET` path: the reply frame has already been cut
/// off by the host, so there is nothing left to do but wait for the
/// counter.
pub fn reboot_shortly() -> ! {
    arm(50);
    loop {
        core::hint::spin_loop();
    }
}
