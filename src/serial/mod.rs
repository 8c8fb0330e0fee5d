//! Serial subsystem: byte-stream endpoints over the hardware and PIO
//! UARTs, the active-channel tables the interrupt handlers fan out over,
//! and the maintenance task that reports overruns and folds per-UART
//! activity into the global activity bit.

pub mod hw;
pub mod pio;
pub mod stream;

use crate::config;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use log::warn;

pub use hw::{HOST_UART, HwUart};
pub use pio::{PIO_UARTS, PioUart, get_pio_uart};

/// Set whenever any UART moved bytes; consumed by the activity LED.
/// Plain write-wins flag - a missed blink frame is acceptable.
pub static UART_ACTIVITY: AtomicBool = AtomicBool::new(false);

// Active endpoint tables. Written once when an endpoint initializes
// (Release), read by ISRs and the maintenance pass (Acquire); no other
// synchronization is needed because entries never change afterwards.
static ACTIVE_HW_UARTS: [AtomicPtr<HwUart>; config::COUNT_HW_UARTS] =
    [const { AtomicPtr::new(ptr::null_mut()) }; config::COUNT_HW_UARTS];

static ACTIVE_PIO_UARTS: [AtomicPtr<PioUart>; config::COUNT_PIO_UARTS] =
    [const { AtomicPtr::new(ptr::null_mut()) }; config::COUNT_PIO_UARTS];

pub(crate) fn register_hw_uart(uart: &'static HwUart) {
    for slot in &ACTIVE_HW_UARTS {
        if slot
            .compare_exchange(
                ptr::null_mut(),
                uart as *const HwUart as *mut HwUart,
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            return;
        }
    }
}

pub(crate) fn register_pio_uart(uart: &'static PioUart) {
    ACTIVE_PIO_UARTS[uart.id as usize].store(
        uart as *const PioUart as *mut PioUart,
        Ordering::Release,
    );
}

/// Iterate the active hardware endpoints.
pub fn active_hw_uarts() -> impl Iterator<Item = &'static HwUart> {
    ACTIVE_HW_UARTS.iter().filter_map(|slot| {
        let ptr = slot.load(Ordering::Acquire);
        // SAFETY: Non-null entries point at 'static endpoints and are
        // never unregistered.
        unsafe { ptr.cast_const().as_ref() }
    })
}

/// Iterate the active PIO endpoints. Called from ISR context.
pub fn active_pio_uarts() -> impl Iterator<Item = &'static PioUart> {
    ACTIVE_PIO_UARTS.iter().filter_map(|slot| {
        let ptr = slot.load(Ordering::Acquire);
        // SAFETY: As above.
        unsafe { ptr.cast_const().as_ref() }
    })
}

// ============================================================================
// Maintenance task
// ============================================================================

/// Periodic pass over every active UART: log sticky overruns, fold
/// activity into [`UART_ACTIVITY`], clear the per-UART flags.
pub struct MaintenanceTask {
    next_run: u64,
}

impl MaintenanceTask {
    pub const fn new() -> Self {
        MaintenanceTask { next_run: 0 }
    }

    pub fn poll(&mut self, now_ms: u64) {
        if now_ms < self.next_run {
            return;
        }
        self.next_run = now_ms + config::SERIAL_MAINTENANCE_INTERVAL;

        for uart in active_hw_uarts() {
            if uart.rx_stream.take_overrun() {
                warn!("Hardware UART RX overrun");
            }
            if uart.tx_stream.take_overrun() {
                warn!("Hardware UART TX overrun");
            }
            if uart.activity.swap(false, Ordering::Relaxed) {
                UART_ACTIVITY.store(true, Ordering::Relaxed);
            }
        }

        for uart in active_pio_uarts() {
            if uart.rx_stream.take_overrun() {
                warn!("PIO UART {} RX overrun", uart.id);
            }
            if uart.tx_stream.take_overrun() {
                warn!("PIO UART {} TX overrun", uart.id);
            }
            if uart.activity.swap(false, Ordering::Relaxed) {
                UART_ACTIVITY.store(true, Ordering::Relaxed);
            }
        }
    }
}

impl Default for MaintenanceTask {
    fn default() -> Self {
        Self::new()
    }
}
