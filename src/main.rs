#![no_std]
#![no_main]

//! Firmware entry point and orchestrator.
//!
//! Startup brings up the platform baseline, announces itself, then
//! splits the workload across the two cores: core 0 runs the host
//! endpoint, DMX output and the LEDs; core 1 runs the bus engines, the
//! serial maintenance pass and the resource monitor. This keeps host
//! link jitter independent of however busy the RS-485 side gets. Each
//! core drives its tasks cooperatively in a loop with a 1 ms sleep slot.

use core::panic::PanicInfo;
use hexbus::drivers::timer::SystemTimer;
use hexbus::drivers::{mailbox, watchdog};
use hexbus::host::HostEndpoint;
use hexbus::{bus, dmx, led, serial, stats};
use log::{error, info};

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // A panic is a fatal resource condition (no state machine left, heap
    // exhausted). Arm the watchdog before logging - if the console lock
    // is wedged, the reboot still happens and the host resyncs on the
    // fresh PICO_READY.
    watchdog::arm(50_000);
    error!("panic: {}", info);
    watchdog::force_reboot();
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core 1 stack, handed to the launch handshake.
#[repr(align(8))]
struct Core1Stack([u8; 8192]);

static mut CORE1_STACK: Core1Stack = Core1Stack([0; 8192]);

/// Rust entry point called from boot.s on core 0.
#[unsafe(no_mangle)]
pub extern "C" fn _start_rust() -> ! {
    hexbus::init();

    info!("HEXBUS six-channel RS-485 gateway v{}", VERSION);
    info!("Initializing peripherals...");

    serial::pio::init_pio_blocks();

    info!("Creating tasks...");

    let mut host = HostEndpoint::new();
    let mut dmx_task = dmx::DmxTask::new();
    let mut activity_led = led::ActivityLedTask::new();
    let mut liveness_led = led::LivenessLedTask::new();
    activity_led.init();
    liveness_led.init();

    // Bus engines, maintenance and the resource monitor live on core 1.
    let stack_top = {
        // SAFETY: Core 1 is still parked in the bootrom; this is the only
        // reference ever taken to its stack.
        let stack = &raw mut CORE1_STACK;
        unsafe { (*stack).0.as_mut_ptr().add((*stack).0.len()) as *mut u32 }
    };
    mailbox::launch_core1(core1_main, stack_top);

    // Host endpoint last: once PICO_READY is out, CONFIG_BUS can arrive.
    host.init(SystemTimer::now_ms());

    info!("Running");

    loop {
        let now = SystemTimer::now_ms();

        host.poll(now);
        dmx_task.poll(now);
        activity_led.poll(now);
        liveness_led.poll(now);

        SystemTimer::delay_ms(1);
    }
}

/// Core 1 entry: the RS-485 side of the house.
extern "C" fn core1_main() -> ! {
    let mut maintenance = serial::MaintenanceTask::new();
    let mut monitor = stats::StatsTask::new();

    loop {
        let now = SystemTimer::now_ms();

        bus::poll_engines(now);
        maintenance.poll(now);
        monitor.poll(now);

        SystemTimer::delay_ms(1);
    }
}
