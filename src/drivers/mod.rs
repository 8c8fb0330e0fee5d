//! Device drivers subsystem
//!
//! Organized by device class:
//! - `clocks`: XOSC, PLL and tick generator bring-up
//! - `gpio`: pin muxing, pads and SIO digital I/O
//! - `mailbox`: inter-core FIFO and core 1 launch
//! - `pio`: programmable I/O blocks backing the soft UARTs and DMX
//! - `resets`: peripheral reset release
//! - `timer`: 1 MHz monotonic system timer
//! - `uart`: PL011 hardware UARTs and the console writer
//! - `watchdog`: reboot paths

pub mod clocks;
pub mod gpio;
pub mod mailbox;
pub mod pio;
pub mod resets;
pub mod timer;
pub mod uart;
pub mod watchdog;
