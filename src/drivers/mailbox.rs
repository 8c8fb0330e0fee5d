//! SIO inter-core mailbox FIFO and core 1 launch.
//!
//! Each core owns a 8-deep outgoing FIFO towards the other. After reset,
//! core 1 sits in the bootrom waiting for the launch handshake on its
//! FIFO: `[0, 0, 1, vector_table, stack_pointer, entry_point]`, each word
//! echoed back before the next is sent.
//!
//! Reference: RP2350 datasheet, Section 5.3 (processor cold boot).

use core::arch::asm;
use core::ptr::{read_volatile, write_volatile};

const SIO_BASE: usize = 0xd000_0000;

mod offset {
    pub const FIFO_ST: usize = 0x050;
    pub const FIFO_WR: usize = 0x054;
    pub const FIFO_RD: usize = 0x058;
}

mod fifo_st {
    pub const VLD: u32 = 1 << 0; // incoming FIFO holds data
    pub const RDY: u32 = 1 << 1; // outgoing FIFO has room
}

#[inline]
fn status() -> u32 {
    // SAFETY: FIFO_ST is a read-only status register.
    unsafe { read_volatile((SIO_BASE + offset::FIFO_ST) as *const u32) }
}

/// Pop one word from the incoming FIFO, if any.
pub fn read() -> Option<u32> {
    if status() & fifo_st::VLD == 0 {
        return None;
    }
    // SAFETY: VLD guarantees the read returns real data.
    Some(unsafe { read_volatile((SIO_BASE + offset::FIFO_RD) as *const u32) })
}

/// Push one word to the other core, spinning while the FIFO is full, and
/// wake it with SEV.
pub fn write_blocking(value: u32) {
    while status() & fifo_st::RDY == 0 {
        core::hint::spin_loop();
    }
    // SAFETY: RDY guarantees FIFO room; SEV is always safe.
    unsafe {
        write_volatile((SIO_BASE + offset::FIFO_WR) as *mut u32, value);
        asm!("sev", options(nomem, nostack));
    }
}

/// Block until the other core sends a word.
pub fn read_blocking() -> u32 {
    loop {
        if let Some(value) = read() {
            return value;
        }
        // SAFETY: WFE only waits; the sender's SEV wakes us.
        unsafe { asm!("wfe", options(nomem, nostack)) };
    }
}

/// Empty the incoming FIFO.
pub fn drain() {
    while read().is_some() {}
}

/// Release core 1 from the bootrom and run `entry` on it.
///
/// `stack_top` must point one-past-the-end of a region reserved for
/// core 1; the launch handshake hands it over together with our vector
/// table so both cores share one interrupt surface.
pub fn launch_core1(entry: extern "C" fn() -> !, stack_top: *mut u32) {
    unsafe extern "C" {
        static __vector_table: u32;
    }

    // SAFETY: Taking the address of the linker-provided vector table.
    let vector_table = unsafe { &__vector_table as *const u32 as u32 };

    let sequence = [
        0,
        0,
        1,
        vector_table,
        stack_top as u32,
        entry as *const () as u32,
    ];

    let mut i = 0;
    while i < sequence.len() {
        let word = sequence[i];
        // A zero word doubles as "drain first": the bootrom expects its
        // FIFO empty at the start of the handshake.
        if word == 0 {
            drain();
            // SAFETY: SEV nudges core 1 out of its WFE.
            unsafe { asm!("sev", options(nomem, nostack)) };
        }

        write_blocking(word);
        let response = read_blocking();

        // Any mismatch restarts the whole handshake.
        i = if response == word { i + 1 } else { 0 };
    }
}
