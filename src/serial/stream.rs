//! Lock-free byte stream between interrupt handlers and tasks.
//!
//! Every UART owns two of these: the RX ISR produces into one while a
//! task consumes, and a task produces into the other while the TX ISR
//! consumes. Single producer, single consumer, so atomic head/tail
//! indices with Acquire/Release ordering are all the synchronization
//! needed - handlers never lock.
//!
//! ## Memory Ordering
//!
//! Producer:
//! 1. Write byte(s) at head
//! 2. Store head with Release (bytes visible before the index moves)
//!
//! Consumer:
//! 1. Load head with Acquire (see the producer's bytes)
//! 2. Read byte(s) at tail
//! 3. Store tail with Release

use crate::config::SERIAL_STREAM_SIZE;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// SPSC byte ring with a sticky overrun flag.
///
/// Capacity is [`SERIAL_STREAM_SIZE`] (power of two, so wrapping is a
/// mask); one slot stays empty to distinguish full from empty.
pub struct ByteStream {
    buffer: UnsafeCell<[u8; SERIAL_STREAM_SIZE]>,

    /// Write index (producer only).
    head: AtomicUsize,

    /// Read index (consumer only).
    tail: AtomicUsize,

    /// Set when a write found no room; cleared by the maintenance pass.
    overrun: AtomicBool,
}

// SAFETY: head is only stored by the producer, tail only by the consumer,
// and each side reads the other's index with Acquire before touching the
// buffer region the index guards. Indices stay in bounds via masking.
unsafe impl Sync for ByteStream {}

const MASK: usize = SERIAL_STREAM_SIZE - 1;

// Capacity must be a power of two for the masking above.
const _: () = assert!(SERIAL_STREAM_SIZE.is_power_of_two());

impl ByteStream {
    pub const fn new() -> Self {
        ByteStream {
            buffer: UnsafeCell::new([0; SERIAL_STREAM_SIZE]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            overrun: AtomicBool::new(false),
        }
    }

    /// Bytes currently buffered. Exact from either endpoint's own side,
    /// a safe snapshot from anywhere else.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) & MASK
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed) == self.tail.load(Ordering::Relaxed)
    }

    /// Free capacity from the producer's point of view.
    pub fn free_space(&self) -> usize {
        SERIAL_STREAM_SIZE - 1 - self.len()
    }

    /// Append one byte (producer side).
    ///
    /// Returns `false` and sets the overrun flag if the ring is full; the
    /// byte is dropped. RTU resynchronizes at the next frame boundary, so
    /// dropping beats blocking an ISR.
    pub fn push(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let next_head = (head + 1) & MASK;
        if next_head == tail {
            self.overrun.store(true, Ordering::Relaxed);
            return false;
        }

        // SAFETY: head is in bounds (masked) and this slot is owned by
        // the single producer until head is published below; the raw
        // write never forms a reference overlapping the consumer's.
        unsafe {
            (self.buffer.get() as *mut u8).add(head).write(byte);
        }

        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Append as much of `src` as fits (producer side). Sets the overrun
    /// flag if anything was dropped. Returns the number accepted.
    pub fn push_slice(&self, src: &[u8]) -> usize {
        let mut written = 0;
        for &byte in src {
            if !self.push(byte) {
                break;
            }
            written += 1;
        }
        if written != src.len() {
            self.overrun.store(true, Ordering::Relaxed);
        }
        written
    }

    /// Remove one byte (consumer side).
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        // SAFETY: tail is in bounds (masked) and the slot was published
        // by the producer's Release store; raw read, no reference formed.
        let byte = unsafe { (self.buffer.get() as *const u8).add(tail).read() };

        self.tail.store((tail + 1) & MASK, Ordering::Release);
        Some(byte)
    }

    /// Remove up to `dst.len()` bytes (consumer side). Returns the count.
    pub fn pop_slice(&self, dst: &mut [u8]) -> usize {
        let mut read = 0;
        while read < dst.len() {
            match self.pop() {
                Some(byte) => {
                    dst[read] = byte;
                    read += 1;
                }
                None => break,
            }
        }
        read
    }

    /// Discard everything buffered (consumer side only).
    pub fn drain(&self) {
        while self.pop().is_some() {}
    }

    /// Read and clear the sticky overrun flag.
    pub fn take_overrun(&self) -> bool {
        self.overrun.swap(false, Ordering::Relaxed)
    }
}

impl Default for ByteStream {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_stream_new_empty() {
        let stream = ByteStream::new();
        assert!(stream.is_empty());
        assert_eq!(stream.len(), 0);
        assert_eq!(stream.free_space(), SERIAL_STREAM_SIZE - 1);
    }

    #[test_case]
    fn test_stream_push_pop() {
        let stream = ByteStream::new();

        assert!(stream.push(0x41));
        assert!(stream.push(0x42));
        assert_eq!(stream.len(), 2);

        assert_eq!(stream.pop(), Some(0x41));
        assert_eq!(stream.pop(), Some(0x42));
        assert_eq!(stream.pop(), None);
    }

    #[test_case]
    fn test_stream_fifo_order_bulk() {
        let stream = ByteStream::new();
        let data: [u8; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];

        assert_eq!(stream.push_slice(&data), 10);

        let mut out = [0u8; 10];
        assert_eq!(stream.pop_slice(&mut out), 10);
        assert_eq!(out, data);
    }

    #[test_case]
    fn test_stream_overrun_sticky() {
        let stream = ByteStream::new();

        // Fill to capacity (one slot stays empty)
        for i in 0..(SERIAL_STREAM_SIZE - 1) {
            assert!(stream.push(i as u8));
        }
        assert!(!stream.push(0xFF), "push into full stream must fail");

        assert!(stream.take_overrun());
        // Cleared after being taken
        assert!(!stream.take_overrun());

        // The dropped byte is really gone
        assert_eq!(stream.len(), SERIAL_STREAM_SIZE - 1);
    }

    #[test_case]
    fn test_stream_wraparound() {
        let stream = ByteStream::new();

        for round in 0..3 {
            for i in 0..(SERIAL_STREAM_SIZE - 1) {
                assert!(stream.push((round + i) as u8));
            }
            for i in 0..(SERIAL_STREAM_SIZE - 1) {
                assert_eq!(stream.pop(), Some((round + i) as u8));
            }
            assert!(stream.is_empty());
        }
    }

    #[test_case]
    fn test_stream_drain() {
        let stream = ByteStream::new();
        stream.push_slice(b"stale response bytes");
        stream.drain();
        assert!(stream.is_empty());
        assert_eq!(stream.pop(), None);
    }

    #[test_case]
    fn test_partial_bulk_pop() {
        let stream = ByteStream::new();
        stream.push_slice(&[1, 2, 3]);

        let mut out = [0u8; 8];
        assert_eq!(stream.pop_slice(&mut out), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
    }
}
