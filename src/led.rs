//! Status LED tasks.
//!
//! Two indicators: the activity LED flickers when any UART moved bytes
//! since the last blink frame, and the on-board LED blinks steadily as a
//! liveness signal.

use crate::config;
use crate::drivers::gpio::Gpio;
use crate::serial::UART_ACTIVITY;
use core::sync::atomic::Ordering;

/// Serial-activity indicator.
pub struct ActivityLedTask {
    gpio: Gpio,
    next_run: u64,
    lit: bool,
}

impl ActivityLedTask {
    pub const fn new() -> Self {
        ActivityLedTask {
            gpio: Gpio::new(),
            next_run: 0,
            lit: false,
        }
    }

    pub fn init(&self) {
        self.gpio.set_output(config::LED_PIN_ACT);
    }

    pub fn poll(&mut self, now_ms: u64) {
        if now_ms < self.next_run {
            return;
        }

        if self.lit {
            // Second half of a blink frame.
            self.gpio.clear(config::LED_PIN_ACT);
            self.lit = false;
            self.next_run = now_ms + config::LED_ACT_DELAY / 2;
        } else if UART_ACTIVITY.swap(false, Ordering::Relaxed) {
            self.gpio.set(config::LED_PIN_ACT);
            self.lit = true;
            self.next_run = now_ms + config::LED_ACT_DELAY / 2;
        } else {
            self.next_run = now_ms + config::LED_ACT_DELAY;
        }
    }
}

impl Default for ActivityLedTask {
    fn default() -> Self {
        Self::new()
    }
}

/// Liveness indicator on the on-board LED.
pub struct LivenessLedTask {
    gpio: Gpio,
    next_run: u64,
}

impl LivenessLedTask {
    pub const fn new() -> Self {
        LivenessLedTask {
            gpio: Gpio::new(),
            next_run: 0,
        }
    }

    pub fn init(&self) {
        self.gpio.set_output(config::LED_PIN_BUILTIN);
    }

    pub fn poll(&mut self, now_ms: u64) {
        if now_ms < self.next_run {
            return;
        }
        self.gpio.toggle(config::LED_PIN_BUILTIN);
        self.next_run = now_ms + config::LED_BUILTIN_DELAY / 2;
    }
}

impl Default for LivenessLedTask {
    fn default() -> Self {
        Self::new()
    }
}
