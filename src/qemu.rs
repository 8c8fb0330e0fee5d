//! Semihosting exit for automated test runs.
//!
//! Only meaningful under an emulator/debugger with semihosting enabled;
//! on bare hardware the breakpoint escalates to a fault and the watchdog
//! path takes over.

use core::arch::asm;

/// Exit codes reported to the test harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExitCode {
    /// Test or program succeeded.
    Success = 0,
    /// Test or program failed.
    Failed = 1,
}

/// Exit via ARM semihosting SYS_EXIT_EXTENDED.
///
/// Cortex-M semihosting traps on `bkpt 0xab` with the operation number in
/// r0 and a parameter block pointer in r1:
/// - param\[0\] = 0x20026 (ADP_Stopped_ApplicationExit)
/// - param\[1\] = exit status code
pub fn exit(exit_code: ExitCode) -> ! {
    #[repr(C)]
    struct ExitBlock {
        reason: u32, // 0x20026 = ADP_Stopped_ApplicationExit
        status: u32, // Exit status code
    }

    let block = ExitBlock {
        reason: 0x20026,
        status: exit_code as u32,
    };

    // SAFETY: bkpt 0xab is the architected M-profile semihosting trap
    // (ARM semihosting spec, section 2.1.1); r1 points at a live
    // parameter block with the required layout. The call does not return
    // under semihosting, and loops otherwise.
    unsafe {
        asm!(
            "mov r0, #0x20",        // SYS_EXIT_EXTENDED
            "mov r1, {0}",          // r1 = address of parameter block
            "bkpt #0xab",           // Semihosting trap
            in(reg) &block,
            options(nostack)
        );
    }

    loop {
        core::hint::spin_loop();
    }
}
