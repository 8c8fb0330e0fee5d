//! Interrupt-safe mutex.
//!
//! This module provides `Mutex`, a spinlock that disables interrupts while
//! the lock is held. Regular spinlocks deadlock if an interrupt handler
//! tries to acquire a lock the interrupted code already holds:
//!
//! ```text
//! 1. Task acquires spinlock
//! 2. Interrupt fires (e.g., RX byte arrives)
//! 3. Interrupt handler tries to acquire same spinlock
//! 4. DEADLOCK: Handler spins forever, task never resumes
//! ```
//!
//! Masking IRQs on the local core closes that window, and the atomic flag
//! covers the other core (this is the `spin_lock_irqsave()` pattern).

use core::arch::asm;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Mutex that disables interrupts while locked.
///
/// # Example
/// ```ignore
/// static CHANGES: Mutex<MessageQueue<Command, 200>> = Mutex::new(MessageQueue::new());
///
/// let mut queue = CHANGES.lock();
/// queue.push(command);
/// // Interrupts re-enabled when guard is dropped
/// ```
pub struct Mutex<T> {
    inner: UnsafeCell<T>,
    locked: AtomicBool,
}

// SAFETY: Access to the inner data is serialized by the atomic `locked`
// flag; IRQs are masked on the holding core, so neither a local interrupt
// handler nor the other core can observe the data mid-update.
unsafe impl<T: Send> Sync for Mutex<T> {}
unsafe impl<T: Send> Send for Mutex<T> {}

impl<T> Mutex<T> {
    /// Create a new mutex.
    pub const fn new(value: T) -> Self {
        Self {
            inner: UnsafeCell::new(value),
            locked: AtomicBool::new(false),
        }
    }

    /// Acquire the lock (disables interrupts on this core).
    ///
    /// Returns a guard that restores the interrupt state when dropped.
    /// Critical sections in this crate are a handful of loads and stores,
    /// so contention is spin-waited.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let irq_state = IrqState::disable();

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Held by the other core; short wait.
            core::hint::spin_loop();
        }

        MutexGuard {
            mutex: self,
            irq_state,
        }
    }
}

/// Guard returned by `Mutex::lock()`.
///
/// Restores interrupt state when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    irq_state: IrqState,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: Lock is held, so we have exclusive access
        unsafe { &*self.mutex.inner.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: Lock is held, so we have exclusive access
        unsafe { &mut *self.mutex.inner.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
        self.irq_state.restore();
    }
}

/// Run `f` with IRQs masked on the calling core.
///
/// For short sections that pair task-side state with an interrupt
/// handler on the same core but have no data worth a full mutex.
pub fn with_irqs_masked<R>(f: impl FnOnce() -> R) -> R {
    let irq_state = IrqState::disable();
    let result = f();
    irq_state.restore();
    result
}

/// Saved interrupt mask state (PRIMASK register).
struct IrqState {
    primask: u32,
}

impl IrqState {
    /// Mask IRQs on this core and return the previous state.
    fn disable() -> Self {
        let primask: u32;

        // SAFETY: Reading PRIMASK and executing cpsid are always valid in
        // privileged thread or handler mode; the old value is kept so
        // nested locks restore correctly.
        unsafe {
            asm!("mrs {}, primask", out(reg) primask, options(nomem, nostack));
            asm!("cpsid i", options(nomem, nostack));
        }

        Self { primask }
    }

    /// Restore the saved interrupt mask.
    fn restore(&self) {
        // Only re-enable if IRQs were enabled when we locked; this keeps
        // nested critical sections correct.
        if self.primask & 1 == 0 {
            // SAFETY: cpsie only unmasks interrupts, matching the state
            // saved at lock time.
            unsafe {
                asm!("cpsie i", options(nomem, nostack));
            }
        }
    }
}
