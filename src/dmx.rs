//! DMX-512 universe output.
//!
//! One PIO state machine turns a bus 6 transceiver into a DMX driver:
//! the program generates the break and mark-after-break, then streams
//! 8N2 slots from the FIFO. The task refreshes the universe at ~12 Hz,
//! restarting the program for every frame so each refresh begins with a
//! proper break. Universe updates arrive through a queue; the latest one
//! wins.
//!
//! The state machine is claimed lazily on the first refresh, so a
//! gateway that never uses DMX keeps all four PIO0 slots for RS-485 RX.

use crate::config;
use crate::drivers::clocks;
use crate::drivers::gpio::Gpio;
use crate::drivers::pio::{self, SmConfig, clkdiv_for_rate, execctrl, pinctrl, shiftctrl};
use crate::sync::MessageQueue;
use log::debug;

/// One universe worth of channel data.
pub type Universe = [u8; config::DMX_MAX_CHANNELS];

/// Pending universe updates.
pub static DMX_WRITE_QUEUE: MessageQueue<Universe, { config::DMX_WRITE_QUEUE_LENGTH }> =
    MessageQueue::new();

/// DMX TX program, 8 cycles per bit at 250 kbaud, side-set on the TX pin.
///
/// ```text
/// .program dmx_tx
/// .side_set 1 opt
///         set x, 31       side 0 [7]  ; break, 264 cycles low (132 us)
/// brk:    jmp x-- brk            [7]
///         set x, 3        side 1 [7]  ; mark-after-break (20 us)
/// mab:    jmp x-- mab            [7]
/// slot:   pull block      side 1      ; idle high between slots
///         set x, 7        side 0 [7]  ; start bit
/// bits:   out pins, 1
///         jmp x-- bits           [6]
///         nop             side 1 [7]  ; two stop bits
///         jmp slot        side 1 [7]
/// ```
const DMX_TX_PROGRAM: [u16; 10] = [
    0xf73f, // set x, 31            side 0 [7]
    0x0741, // jmp x-- 1                   [7]
    0xff23, // set x, 3             side 1 [7]
    0x0743, // jmp x-- 3                   [7]
    0x98a0, // pull block           side 1
    0xf727, // set x, 7             side 0 [7]
    0x6001, // out pins, 1
    0x0646, // jmp x-- 6                   [6]
    0xbf42, // nop (mov y, y)       side 1 [7]
    0x1f04, // jmp 4                side 1 [7]
];
const DMX_CYCLES_PER_BIT: u32 = 8;

/// Claimed PIO resources, populated on first use.
struct DmxChannel {
    sm: u8,
    offset: u32,
}

/// The DMX refresh task.
pub struct DmxTask {
    universe: Universe,
    next_write: u64,
    channel: Option<DmxChannel>,
}

impl DmxTask {
    pub const fn new() -> Self {
        DmxTask {
            universe: [0; config::DMX_MAX_CHANNELS],
            next_write: 0,
            channel: None,
        }
    }

    /// Claim a PIO0 state machine and load the program.
    ///
    /// # Panics
    ///
    /// Panics if PIO0 has no free state machine - the host configured
    /// more RS-485 channels than the hardware leaves room for.
    fn ensure_channel(&mut self) -> &DmxChannel {
        if self.channel.is_none() {
            let mut block = pio::PIO0.lock();

            let offset = block
                .add_program(&DMX_TX_PROGRAM)
                .expect("No PIO0 instruction space for DMX program!");
            let sm = match block.claim_sm() {
                Some(sm) => sm,
                None => panic!("No DMX State Machine available!"),
            };

            let gpio = Gpio::new();
            gpio.set_function(config::DMX_TX_PIN, crate::drivers::gpio::Function::Pio0);
            // RS-485 driver stays enabled; DMX is transmit-only.
            gpio.set_output(config::DMX_EN_PIN);
            gpio.set(config::DMX_EN_PIN);

            let sm_config = SmConfig {
                clkdiv: clkdiv_for_rate(
                    clocks::CLK_SYS_HZ,
                    DMX_CYCLES_PER_BIT,
                    config::DMX_BAUDRATE,
                ),
                execctrl: execctrl::wrap(offset, offset + (DMX_TX_PROGRAM.len() as u32 - 1))
                    | execctrl::SIDE_EN,
                shiftctrl: shiftctrl::OUT_SHIFTDIR_RIGHT,
                pinctrl: pinctrl::out_pins(config::DMX_TX_PIN, 1)
                    | pinctrl::sideset_pins(config::DMX_TX_PIN, 2),
            };
            block.sm_init(sm, &sm_config);

            // Line to mark and pin to output before the program runs.
            block.sm_exec(sm, 0xf801); // set pins, 1    side 1
            block.sm_exec(sm, 0xf881); // set pindirs, 1 side 1

            self.channel = Some(DmxChannel { sm, offset });
            debug!("DMX on PIO0 sm {}", sm);
        }

        self.channel.as_ref().unwrap()
    }

    /// Send one frame: restart at the break, then feed start code and
    /// channel slots through the FIFO.
    fn refresh(&mut self) {
        let (sm, offset) = {
            let channel = self.ensure_channel();
            (channel.sm, channel.offset)
        };
        let universe = self.universe;

        {
            let mut block = pio::PIO0.lock();
            block.sm_set_enabled(sm, false);
            block.sm_exec(sm, 0xf801); // line to mark while restarting
            block.sm_exec(sm, offset as u16); // jmp to the break
            block.sm_set_enabled(sm, true);
        }

        // Start code plus channels. The FIFO is only four deep, but at
        // 250 kbaud a slot drains in 44 us, so this wait is short.
        let base = pio::PIO0_BASE;
        let mut push = |byte: u8| {
            while pio::tx_full(base, sm) {
                core::hint::spin_loop();
            }
            pio::tx_push(base, sm, byte);
        };

        push(0); // DMX start code
        for &slot in universe.iter() {
            push(slot);
        }
    }

    /// One loop slot: adopt the newest queued universe, refresh on
    /// schedule.
    pub fn poll(&mut self, now_ms: u64) {
        while let Some(universe) = DMX_WRITE_QUEUE.receive() {
            self.universe = universe;
            debug!("DMX universe updated");
        }

        if now_ms >= self.next_write {
            self.refresh();
            self.next_write = now_ms + config::DMX_DELAY_BETWEEN_WRITES;
        }
    }
}

impl Default for DmxTask {
    fn default() -> Self {
        Self::new()
    }
}
