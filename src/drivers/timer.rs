//! RP2350 system timer (TIMER0).
//!
//! A 64-bit free-running counter incrementing at 1 MHz from the tick
//! generator, read through the non-latching RAW registers. This is the
//! single monotonic time source for scheduling, pacing delays and
//! timeouts across the firmware.

use core::ptr;

/// TIMER0 base address (RP2350 datasheet, Section 12.8).
const TIMER_BASE: usize = 0x400b_0000;

/// Register offsets from TIMER_BASE.
#[allow(dead_code)]
mod offset {
    pub const TIMEHW: usize = 0x00; // Latched write, high word
    pub const TIMELW: usize = 0x04; // Latched write, low word
    pub const TIMEHR: usize = 0x08; // Latched read, high word
    pub const TIMELR: usize = 0x0c; // Latched read, low word
    pub const TIMERAWH: usize = 0x24; // Raw read, high word
    pub const TIMERAWL: usize = 0x28; // Raw read, low word
}

/// System timer interface.
///
/// The RAW registers are used instead of the latched pair because both
/// cores read the timer concurrently and the latch is per-timer, not
/// per-core.
pub struct SystemTimer;

impl SystemTimer {
    #[inline]
    fn read_rawl() -> u32 {
        // SAFETY: TIMERAWL is a read-only counter register at a documented
        // address; reading has no side effects.
        unsafe { ptr::read_volatile((TIMER_BASE + offset::TIMERAWL) as *const u32) }
    }

    #[inline]
    fn read_rawh() -> u32 {
        // SAFETY: As above for TIMERAWH.
        unsafe { ptr::read_volatile((TIMER_BASE + offset::TIMERAWH) as *const u32) }
    }

    /// Read the full 64-bit counter value in microseconds since boot.
    ///
    /// The counter is split across two 32-bit registers, so the low word
    /// can roll over between the two reads. Read high, low, high again
    /// and retry if the high word moved.
    pub fn read_counter() -> u64 {
        loop {
            let hi1 = Self::read_rawh();
            let lo = Self::read_rawl();
            let hi2 = Self::read_rawh();

            if hi1 == hi2 {
                return ((hi1 as u64) << 32) | (lo as u64);
            }
            // Low word rolled over between reads - try again
        }
    }

    /// Current timestamp in microseconds.
    #[inline]
    pub fn timestamp_us() -> u64 {
        Self::read_counter()
    }

    /// Current timestamp in milliseconds. This is the tick unit used by
    /// every deadline in the firmware.
    #[inline]
    pub fn now_ms() -> u64 {
        Self::read_counter() / 1000
    }

    /// Busy-wait for the given number of microseconds.
    pub fn delay_us(microseconds: u64) {
        let start = Self::read_counter();
        let target = start.wrapping_add(microseconds);

        // 64 bits at 1 MHz do not wrap in the lifetime of the device, but
        // keep the comparison well-defined anyway.
        if target < start {
            while Self::read_counter() >= start {}
        }

        while Self::read_counter() < target {}
    }

    /// Busy-wait for the given number of milliseconds.
    #[inline]
    pub fn delay_ms(milliseconds: u64) {
        Self::delay_us(milliseconds.saturating_mul(1000));
    }

    /// Uptime in whole seconds.
    pub fn uptime_seconds() -> u64 {
        Self::read_counter() / 1_000_000
    }
}

/// Absolute deadline helper: `now + timeout_ms`, in milliseconds.
#[inline]
pub fn next_timeout(timeout_ms: u64) -> u64 {
    SystemTimer::now_ms() + timeout_ms
}

/// True once the given millisecond deadline has passed.
#[inline]
pub fn is_expired(deadline_ms: u64) -> bool {
    SystemTimer::now_ms() >= deadline_ms
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_timer_counter_increments() {
        let t1 = SystemTimer::read_counter();
        let t2 = SystemTimer::read_counter();

        assert!(t2 >= t1, "Timer counter went backwards: {} -> {}", t1, t2);
    }

    #[test_case]
    fn test_delay_us_actually_delays() {
        let start = SystemTimer::read_counter();
        SystemTimer::delay_us(100);
        let end = SystemTimer::read_counter();

        let elapsed = end - start;
        assert!(elapsed >= 100, "delay_us(100) only delayed {} us", elapsed);
    }

    #[test_case]
    fn test_now_ms_tracks_counter() {
        let us = SystemTimer::timestamp_us();
        let ms = SystemTimer::now_ms();

        // now_ms is derived from the same counter; allow 2 ms of skew
        // between the two reads.
        assert!(ms >= us / 1000 && ms <= us / 1000 + 2);
    }

    #[test_case]
    fn test_deadline_helpers() {
        let deadline = next_timeout(5);
        assert!(!is_expired(deadline));
        SystemTimer::delay_ms(6);
        assert!(is_expired(deadline));
    }

    #[test_case]
    fn test_counter_is_monotonic() {
        let mut last = SystemTimer::read_counter();

        for _ in 0..10 {
            let current = SystemTimer::read_counter();
            assert!(
                current >= last,
                "Timer is not monotonic: {} -> {}",
                last,
                current
            );
            last = current;
        }
    }
}
