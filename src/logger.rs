//! `log` facade sink writing to the console UART.
//!
//! Records carry a millisecond timestamp and the module path, so bus
//! timeouts and overruns can be correlated on the bench without a
//! debugger attached.

use crate::drivers::timer::SystemTimer;
use log::{LevelFilter, Metadata, Record};

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Install the logger. Called once during startup, before any task runs.
pub fn init() {
    log::set_logger(&LOGGER).expect("logger already installed");

    #[cfg(debug_assertions)]
    log::set_max_level(LevelFilter::Debug);
    #[cfg(not(debug_assertions))]
    log::set_max_level(LevelFilter::Info);
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // The console WRITER mutex serializes whole lines across cores.
        crate::println!(
            "{:>8} | {:<5} | {}: {}",
            SystemTimer::now_ms(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}
