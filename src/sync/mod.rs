//! Synchronization primitives.
//!
//! Interrupt-safe and cross-core-safe building blocks: the IRQ-masking
//! mutex and the bounded drop-on-full message queue built on it.

pub mod mutex;
pub mod queue;

pub use mutex::Mutex;
pub use queue::MessageQueue;
