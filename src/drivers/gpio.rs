//! RP2350 GPIO driver for general-purpose digital I/O.
//!
//! Pin muxing goes through IO_BANK0 (one CTRL register per pin), electrical
//! behavior through PADS_BANK0, and fast digital I/O through the SIO
//! single-cycle port shared by both cores.
//!
//! **IMPORTANT**: RP2350 pads power up isolated (ISO latch set). Selecting
//! a function here always clears the isolation, otherwise the pin stays
//! disconnected no matter what the mux says.

use volatile::Volatile;

/// IO_BANK0 base address (RP2350 datasheet, Section 9.11).
const IO_BANK0_BASE: usize = 0x4002_8000;

/// PADS_BANK0 base address (RP2350 datasheet, Section 9.11.3).
const PADS_BANK0_BASE: usize = 0x4003_8000;

/// SIO base address (RP2350 datasheet, Section 3.1).
const SIO_BASE: usize = 0xd000_0000;

/// Number of bank 0 GPIO pins on the QFN-60 package.
const NUM_GPIOS: u32 = 48;

/// SIO register offsets for GPIO access.
#[allow(dead_code)]
mod sio_offsets {
    pub const GPIO_IN: usize = 0x004;
    pub const GPIO_OUT: usize = 0x010;
    pub const GPIO_OUT_SET: usize = 0x018;
    pub const GPIO_OUT_CLR: usize = 0x020;
    pub const GPIO_OUT_XOR: usize = 0x028;
    pub const GPIO_OE: usize = 0x030;
    pub const GPIO_OE_SET: usize = 0x038;
    pub const GPIO_OE_CLR: usize = 0x040;
}

/// PADS_BANK0 per-pin control bits.
mod pad_bits {
    pub const SLEWFAST: u32 = 1 << 0;
    pub const SCHMITT: u32 = 1 << 1;
    pub const PDE: u32 = 1 << 2;
    pub const PUE: u32 = 1 << 3;
    pub const IE: u32 = 1 << 6;
    pub const OD: u32 = 1 << 7;
    pub const ISO: u32 = 1 << 8;
}

/// GPIO pin function select values (IO_BANK0 CTRL.FUNCSEL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Function {
    Spi = 1,
    Uart = 2,
    I2c = 3,
    Pwm = 4,
    Sio = 5,
    Pio0 = 6,
    Pio1 = 7,
    Pio2 = 8,
    Null = 0x1f,
}

/// Internal pull resistor modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Pull {
    None,
    Up,
    Down,
}

/// GPIO controller.
///
/// Stateless view over the three register banks; all methods take `&self`
/// because the SIO set/clear/xor registers are atomic by construction.
pub struct Gpio;

impl Gpio {
    pub const fn new() -> Self {
        Gpio
    }

    /// Route a pin to a peripheral function and un-isolate its pad.
    ///
    /// # Panics
    ///
    /// Panics if pin >= 48.
    pub fn set_function(&self, pin: u32, function: Function) {
        assert!(pin < NUM_GPIOS, "GPIO pin {} out of range (0-47)", pin);

        let ctrl_addr = IO_BANK0_BASE + (pin as usize) * 8 + 4;
        let pad_addr = PADS_BANK0_BASE + 4 + (pin as usize) * 4;

        // SAFETY: Both addresses are within the documented IO/PADS banks
        // for a validated pin index; volatile accesses only.
        unsafe {
            let pad = pad_addr as *mut Volatile<u32>;
            // Input enable + schmitt on, output driver enabled, isolation off.
            let mut value = (*pad).read();
            value |= pad_bits::IE | pad_bits::SCHMITT;
            value &= !(pad_bits::OD | pad_bits::ISO);
            (*pad).write(value);

            let ctrl = ctrl_addr as *mut Volatile<u32>;
            (*ctrl).write(function as u32);
        }
    }

    /// Configure the internal pull resistor of a pin.
    ///
    /// # Panics
    ///
    /// Panics if pin >= 48.
    pub fn set_pull(&self, pin: u32, pull: Pull) {
        assert!(pin < NUM_GPIOS, "GPIO pin {} out of range (0-47)", pin);

        let pad_addr = PADS_BANK0_BASE + 4 + (pin as usize) * 4;

        // SAFETY: Address is within PADS_BANK0 for a validated pin index.
        unsafe {
            let pad = pad_addr as *mut Volatile<u32>;
            let mut value = (*pad).read() & !(pad_bits::PUE | pad_bits::PDE);
            match pull {
                Pull::None => {}
                Pull::Up => value |= pad_bits::PUE,
                Pull::Down => value |= pad_bits::PDE,
            }
            (*pad).write(value);
        }
    }

    /// Make a pin a SIO-driven output.
    pub fn set_output(&self, pin: u32) {
        self.set_function(pin, Function::Sio);
        // SAFETY: GPIO_OE_SET performs an atomic bit-set; validated pin.
        unsafe {
            let reg = (SIO_BASE + sio_offsets::GPIO_OE_SET) as *mut Volatile<u32>;
            (*reg).write(1 << pin);
        }
    }

    /// Drive an output pin high.
    pub fn set(&self, pin: u32) {
        assert!(pin < NUM_GPIOS, "GPIO pin {} out of range (0-47)", pin);

        // SAFETY: GPIO_OUT_SET is write-only and atomic; validated pin.
        unsafe {
            let reg = (SIO_BASE + sio_offsets::GPIO_OUT_SET) as *mut Volatile<u32>;
            (*reg).write(1 << pin);
        }
    }

    /// Drive an output pin low.
    pub fn clear(&self, pin: u32) {
        assert!(pin < NUM_GPIOS, "GPIO pin {} out of range (0-47)", pin);

        // SAFETY: GPIO_OUT_CLR is write-only and atomic; validated pin.
        unsafe {
            let reg = (SIO_BASE + sio_offsets::GPIO_OUT_CLR) as *mut Volatile<u32>;
            (*reg).write(1 << pin);
        }
    }

    /// Flip an output pin.
    ///
    /// Uses the SIO XOR alias so the flip is atomic with respect to the
    /// other core and to interrupt handlers.
    pub fn toggle(&self, pin: u32) {
        assert!(pin < NUM_GPIOS, "GPIO pin {} out of range (0-47)", pin);

        // SAFETY: GPIO_OUT_XOR is write-only and atomic; validated pin.
        unsafe {
            let reg = (SIO_BASE + sio_offsets::GPIO_OUT_XOR) as *mut Volatile<u32>;
            (*reg).write(1 << pin);
        }
    }

    /// Read the current level of a pin.
    pub fn read(&self, pin: u32) -> bool {
        assert!(pin < NUM_GPIOS, "GPIO pin {} out of range (0-47)", pin);

        // SAFETY: GPIO_IN is read-only; validated pin.
        unsafe {
            let reg = (SIO_BASE + sio_offsets::GPIO_IN) as *mut Volatile<u32>;
            ((*reg).read() & (1 << pin)) != 0
        }
    }

    /// Write a boolean value to an output pin.
    pub fn write(&self, pin: u32, value: bool) {
        if value {
            self.set(pin);
        } else {
            self.clear(pin);
        }
    }
}

impl Default for Gpio {
    fn default() -> Self {
        Self::new()
    }
}
