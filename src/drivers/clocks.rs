//! RP2350 clock tree bring-up.
//!
//! The firmware runs the whole chip from two generators:
//!
//! - `clk_ref` = XOSC (12 MHz), feeding the tick generators for the
//!   system timer and the watchdog (1 µs ticks).
//! - `clk_sys` = PLL_SYS at 150 MHz, with `clk_peri` glitchlessly
//!   following `clk_sys` for the UARTs and PIO blocks.
//!
//! Reference: RP2350 datasheet, Section 8 (Clocks) and Section 8.6 (Ticks).

use core::ptr::{read_volatile, write_volatile};

/// Crystal frequency on the Pico 2 board.
pub const XOSC_HZ: u32 = 12_000_000;

/// System / peripheral clock after PLL bring-up.
pub const CLK_SYS_HZ: u32 = 150_000_000;

/// Peripheral clock feeding UART and PIO clock dividers.
pub const CLK_PERI_HZ: u32 = CLK_SYS_HZ;

const XOSC_BASE: usize = 0x4004_8000;
const CLOCKS_BASE: usize = 0x4001_0000;
const PLL_SYS_BASE: usize = 0x4005_0000;
const TICKS_BASE: usize = 0x4010_8000;

mod xosc {
    pub const CTRL: usize = 0x00;
    pub const STATUS: usize = 0x04;
    pub const STARTUP: usize = 0x0c;

    pub const CTRL_FREQ_RANGE_1_15MHZ: u32 = 0xaa0;
    pub const CTRL_ENABLE: u32 = 0xfab << 12;
    pub const STATUS_STABLE: u32 = 1 << 31;
}

mod pll {
    pub const CS: usize = 0x00;
    pub const PWR: usize = 0x04;
    pub const FBDIV_INT: usize = 0x08;
    pub const PRIM: usize = 0x0c;

    pub const CS_LOCK: u32 = 1 << 31;
    pub const PWR_PD: u32 = 1 << 0;
    pub const PWR_POSTDIVPD: u32 = 1 << 3;
    pub const PWR_VCOPD: u32 = 1 << 5;

    // 12 MHz / 1 * 125 = 1500 MHz VCO, / 5 / 2 = 150 MHz
    pub const REFDIV: u32 = 1;
    pub const FBDIV: u32 = 125;
    pub const POSTDIV1: u32 = 5;
    pub const POSTDIV2: u32 = 2;
}

mod clk {
    pub const REF_CTRL: usize = 0x30;
    pub const REF_SELECTED: usize = 0x38;
    pub const SYS_CTRL: usize = 0x3c;
    pub const SYS_SELECTED: usize = 0x44;
    pub const PERI_CTRL: usize = 0x48;

    pub const REF_SRC_XOSC: u32 = 0x2;
    pub const SYS_SRC_AUX: u32 = 0x1;
    pub const SYS_AUXSRC_PLL_SYS: u32 = 0 << 5;
    pub const PERI_ENABLE: u32 = 1 << 11;
    pub const PERI_AUXSRC_CLK_SYS: u32 = 0 << 5;
}

/// Tick generator offsets inside the TICKS block: {CTRL, CYCLES} pairs.
mod ticks {
    pub const TIMER0_CTRL: usize = 0x18;
    pub const TIMER0_CYCLES: usize = 0x1c;
    pub const WATCHDOG_CTRL: usize = 0x30;
    pub const WATCHDOG_CYCLES: usize = 0x34;

    pub const CTRL_ENABLE: u32 = 1 << 0;
}

#[inline]
unsafe fn reg_write(base: usize, offset: usize, value: u32) {
    unsafe { write_volatile((base + offset) as *mut u32, value) }
}

#[inline]
unsafe fn reg_read(base: usize, offset: usize) -> u32 {
    unsafe { read_volatile((base + offset) as *const u32) }
}

/// Bring the clock tree to its run configuration.
///
/// Must be called once, before any baudrate or timer math elsewhere in
/// the crate, since those derive from [`CLK_PERI_HZ`].
pub fn init() {
    // SAFETY: All addresses are documented RP2350 register locations and
    // this runs once, single-core, with interrupts still disabled.
    unsafe {
        // Crystal oscillator: range, ~1 ms startup delay, enable, wait stable.
        reg_write(XOSC_BASE, xosc::CTRL, xosc::CTRL_FREQ_RANGE_1_15MHZ);
        reg_write(XOSC_BASE, xosc::STARTUP, (XOSC_HZ / 1000) / 256);
        reg_write(
            XOSC_BASE,
            xosc::CTRL,
            xosc::CTRL_FREQ_RANGE_1_15MHZ | xosc::CTRL_ENABLE,
        );
        while reg_read(XOSC_BASE, xosc::STATUS) & xosc::STATUS_STABLE == 0 {}

        // clk_ref from the crystal; the glitchless mux reports one-hot.
        reg_write(CLOCKS_BASE, clk::REF_CTRL, clk::REF_SRC_XOSC);
        while reg_read(CLOCKS_BASE, clk::REF_SELECTED) != 1 << clk::REF_SRC_XOSC {}

        // PLL_SYS: power down, program dividers, power up VCO, wait for
        // lock, then enable the post dividers.
        reg_write(
            PLL_SYS_BASE,
            pll::PWR,
            pll::PWR_PD | pll::PWR_POSTDIVPD | pll::PWR_VCOPD,
        );
        reg_write(PLL_SYS_BASE, pll::CS, pll::REFDIV);
        reg_write(PLL_SYS_BASE, pll::FBDIV_INT, pll::FBDIV);
        reg_write(PLL_SYS_BASE, pll::PWR, pll::PWR_POSTDIVPD);
        while reg_read(PLL_SYS_BASE, pll::CS) & pll::CS_LOCK == 0 {}
        reg_write(
            PLL_SYS_BASE,
            pll::PRIM,
            (pll::POSTDIV1 << 16) | (pll::POSTDIV2 << 12),
        );
        reg_write(PLL_SYS_BASE, pll::PWR, 0);

        // clk_sys from the PLL via the aux mux.
        reg_write(
            CLOCKS_BASE,
            clk::SYS_CTRL,
            clk::SYS_AUXSRC_PLL_SYS | clk::SYS_SRC_AUX,
        );
        while reg_read(CLOCKS_BASE, clk::SYS_SELECTED) != 1 << clk::SYS_SRC_AUX {}

        // clk_peri follows clk_sys.
        reg_write(
            CLOCKS_BASE,
            clk::PERI_CTRL,
            clk::PERI_ENABLE | clk::PERI_AUXSRC_CLK_SYS,
        );

        // 1 µs ticks for the system timer and the watchdog counter.
        let cycles_per_us = XOSC_HZ / 1_000_000;
        reg_write(TICKS_BASE, ticks::TIMER0_CYCLES, cycles_per_us);
        reg_write(TICKS_BASE, ticks::TIMER0_CTRL, ticks::CTRL_ENABLE);
        reg_write(TICKS_BASE, ticks::WATCHDOG_CYCLES, cycles_per_us);
        reg_write(TICKS_BASE, ticks::WATCHDOG_CTRL, ticks::CTRL_ENABLE);
    }
}
