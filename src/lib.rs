#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

pub mod allocator;
pub mod bus;
pub mod config;
pub mod dmx;
pub mod drivers;
pub mod host;
pub mod interrupts;
pub mod led;
pub mod logger;
pub mod modbus;
pub mod qemu;
pub mod serial;
pub mod stats;
pub mod sync;

use core::fmt::{self, Write};

#[cfg(test)]
use core::panic::PanicInfo;

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    println!("[failed]\n");
    println!("Error: {}\n", info);
    qemu::exit(qemu::ExitCode::Failed);
}

/// Configuration-lifetime heap (bus contexts and periodic read lists).
#[global_allocator]
pub static ALLOCATOR: allocator::BumpAllocator = allocator::BumpAllocator::new();

/// Bring up the platform baseline: clocks, console, heap, logger.
///
/// Everything else (host link, buses, tasks) is started by the
/// orchestrator in `main.rs`; tests run on top of this baseline alone.
pub fn init() {
    use drivers::resets::{Block, bring_up};

    bring_up(Block::IoBank0);
    bring_up(Block::PadsBank0);
    bring_up(Block::PllSys);
    drivers::clocks::init();
    bring_up(Block::Timer0);
    bring_up(Block::Uart0);

    drivers::uart::WRITER.lock().init();

    unsafe extern "C" {
        static __heap_start: u8;
        static __heap_end: u8;
    }
    // SAFETY: The linker script reserves [__heap_start, __heap_end) for
    // the allocator; init runs once before any allocation.
    unsafe {
        ALLOCATOR.init(
            &raw const __heap_start as usize,
            &raw const __heap_end as usize,
        );
    }

    logger::init();
}

/// Print implementation that acquires the console writer lock
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    drivers::uart::WRITER
        .lock()
        .write_fmt(args)
        .expect("Printing to UART failed");
}

/// Print macro for console output
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::_print(format_args!($($arg)*)));
}

/// Println macro for console output
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

// Test infrastructure
pub trait Testable {
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        print!("{}...\t", core::any::type_name::<T>());
        self();
        println!("[ok]");
    }
}

pub fn test_runner(tests: &[&dyn Testable]) {
    println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    qemu::exit(qemu::ExitCode::Success);
}

#[cfg(test)]
#[unsafe(no_mangle)]
pub extern "C" fn _start_rust() -> ! {
    init();
    test_main();
    loop {}
}
