//! Periodic resource usage report.
//!
//! Logs heap consumption and uptime every few seconds. The heap only
//! grows at configuration time, so a creeping `used` figure between
//! CONFIG_BUS messages would point at an allocation leaking into the
//! steady state.

use crate::config;
use log::info;

pub struct StatsTask {
    next_run: u64,
}

impl StatsTask {
    pub const fn new() -> Self {
        StatsTask { next_run: 0 }
    }

    pub fn poll(&mut self, now_ms: u64) {
        if now_ms < self.next_run {
            return;
        }
        self.next_run = now_ms + config::RES_USAGE_STATS_DELAY;

        info!(
            "up {}s, heap {}/{} bytes used",
            now_ms / 1000,
            crate::ALLOCATOR.used(),
            crate::ALLOCATOR.heap_size(),
        );
    }
}

impl Default for StatsTask {
    fn default() -> Self {
        Self::new()
    }
}
