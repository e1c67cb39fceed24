//! Status LED blink-sequence engine.
//!
//! A sequence is a list of durations in microseconds; the LED starts off
//! and toggles each time the current duration has elapsed.  Two layers:
//!
//! 1. **Burst** — played once, overrides the blink layer while it runs
//!    (boot success / settings error indication).
//! 2. **Blink** — repeats forever; one per session state.
//!
//! The main loop calls `tick()` each iteration and drives the pin with the
//! returned level.

/// Idle: long off, short flash.
pub const IDLE: &[u32] = &[1_000_000, 100_000];
/// Staging: long off, two short flashes.
pub const STAGING: &[u32] = &[500_000, 100_000, 100_000, 100_000];
/// Armed: three short flashes.
pub const ARMED: &[u32] = &[500_000, 100_000, 100_000, 100_000, 100_000, 100_000];
/// Recording: fast even blink.
pub const RECORDING: &[u32] = &[100_000, 100_000];
/// Saving: three slow flashes.
pub const SAVING: &[u32] = &[1_000_000, 250_000, 250_000, 250_000, 250_000, 250_000];
/// Error: four short flashes.
pub const ERROR: &[u32] = &[
    500_000, 100_000, 100_000, 100_000, 100_000, 100_000, 100_000, 100_000,
];

/// Boot burst: settings loaded.
pub const SUCCESS_BURST: &[u32] = &[1_000_000, 100_000, 100_000, 100_000];
/// Boot burst: settings missing or unreadable, defaults in use.
pub const ERROR_BURST: &[u32] = &[
    1_000_000, 100_000, 100_000, 100_000, 100_000, 100_000, 100_000, 100_000,
];

/// One sequence layer.
#[derive(Debug, Clone, Copy)]
struct Layer {
    sequence: &'static [u32],
    index: usize,
    last_toggle_us: u32,
    on: bool,
}

impl Layer {
    const fn empty() -> Self {
        Self {
            sequence: &[],
            index: 0,
            last_toggle_us: 0,
            on: false,
        }
    }

    fn restart(&mut self, sequence: &'static [u32], now_us: u32) {
        self.sequence = sequence;
        self.index = 0;
        self.last_toggle_us = now_us;
        self.on = false;
    }

    fn is_running(&self) -> bool {
        self.index < self.sequence.len()
    }

    /// Toggle when the current step has elapsed.  Returns `true` if it did.
    fn step(&mut self, now_us: u32) -> bool {
        let Some(&duration) = self.sequence.get(self.index) else {
            return false;
        };
        if now_us.wrapping_sub(self.last_toggle_us) > duration {
            self.on = !self.on;
            self.last_toggle_us = now_us;
            self.index += 1;
            return true;
        }
        false
    }
}

/// Two-layer blink engine.  Stack-allocated, no heap.
pub struct BlinkEngine {
    blink: Layer,
    burst: Layer,
}

impl Default for BlinkEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BlinkEngine {
    pub const fn new() -> Self {
        Self {
            blink: Layer::empty(),
            burst: Layer::empty(),
        }
    }

    /// Replace the repeating sequence, restarting it from the off state.
    pub fn set_sequence(&mut self, sequence: &'static [u32], now_us: u32) {
        self.blink.restart(sequence, now_us);
    }

    /// Play `sequence` once on top of the repeating one.
    pub fn set_burst(&mut self, sequence: &'static [u32], now_us: u32) {
        self.burst.restart(sequence, now_us);
    }

    pub fn burst_active(&self) -> bool {
        self.burst.is_running()
    }

    /// Advance both layers and return the LED level.
    pub fn tick(&mut self, now_us: u32) -> bool {
        if self.blink.step(now_us) && !self.blink.is_running() {
            self.blink.index = 0;
        }
        self.burst.step(now_us);

        if self.burst.is_running() {
            self.burst.on
        } else {
            self.blink.on
        }
    }
}
