//! Session context threaded through every state handler.
//!
//! Owns everything a recording session touches: configuration, the sensor
//! table, the storage and interrupt adapters, the stream logger and
//! exporter, plus per-state bookkeeping.  The capture ring itself is
//! shared with interrupt context and therefore only borrowed; the sensor
//! bank is shared with the transfer task.

use log::warn;

use crate::app::events::SessionEvent;
use crate::app::ports::{InterruptPort, StoragePort};
use crate::capture::naming::FileName;
use crate::capture::{CaptureRing, Exporter, StreamLogger, TriggerConfig};
use crate::config::SessionConfig;
use crate::drivers::led_patterns::BlinkEngine;
use crate::error::Error;
use crate::sensors::{SensorBank, SharedBank};

/// Events queued by handlers and drained by the service after each poll.
pub const OUTBOX_DEPTH: usize = 8;

pub struct SessionContext<'r, S: StoragePort, I: InterruptPort> {
    pub config: SessionConfig,
    pub trigger: TriggerConfig,

    pub ring: &'r CaptureRing<'r>,
    pub sensors: SharedBank,
    pub storage: S,
    pub interrupts: I,

    pub logger: StreamLogger<S::Writer>,
    pub exporter: Option<Exporter<S>>,

    // --- Recording bookkeeping ---
    /// Trial number of the current (or last) recording.
    pub trial: u32,
    pub raw_file: FileName,
    /// `completed_total` of the last sample the trigger looked at.
    pub trigger_seen: u32,

    // --- Inputs for this poll ---
    /// Uptime as sampled by the caller; wraps every ~71 min.
    now_us: u32,
    /// `now_us` extended to 64 bits across wraps.
    clock_us: u64,
    pub button_pressed: bool,

    /// `clock_us` when the current state was entered.
    state_entered_us: u64,

    pub led: BlinkEngine,
    /// Fault raised by an entry action, handled by the following poll.
    pub fault: Option<Error>,

    outbox: heapless::Deque<SessionEvent, OUTBOX_DEPTH>,
}

impl<'r, S: StoragePort, I: InterruptPort> SessionContext<'r, S, I> {
    pub fn new(ring: &'r CaptureRing<'r>, sensors: SensorBank, storage: S, interrupts: I) -> Self {
        let config = SessionConfig::default();
        Self {
            trigger: TriggerConfig::from_config(&config.trigger),
            config,
            ring,
            sensors: SharedBank::new(sensors),
            storage,
            interrupts,
            logger: StreamLogger::new(),
            exporter: None,
            trial: 0,
            raw_file: FileName::new(),
            trigger_seen: 0,
            now_us: 0,
            clock_us: 0,
            button_pressed: false,
            state_entered_us: 0,
            led: BlinkEngine::new(),
            fault: None,
            outbox: heapless::Deque::new(),
        }
    }

    /// Install a loaded configuration and derive the trigger from it.
    pub fn apply_config(&mut self, config: SessionConfig) {
        self.trigger = TriggerConfig::from_config(&config.trigger);
        self.config = config;
    }

    /// Record the caller's uptime sample.  Consecutive samples must be
    /// less than one `u32` wrap apart.
    pub fn set_now(&mut self, now_us: u32) {
        self.clock_us += u64::from(now_us.wrapping_sub(self.now_us));
        self.now_us = now_us;
    }

    pub fn now_us(&self) -> u32 {
        self.now_us
    }

    /// Microseconds spent in the current state.
    pub fn elapsed_us(&self) -> u64 {
        self.clock_us - self.state_entered_us
    }

    /// `true` once at least `ms` milliseconds have passed in this state.
    pub fn elapsed_at_least_ms(&self, ms: u32) -> bool {
        self.elapsed_us() >= u64::from(ms) * 1000
    }

    /// Mark the current time as the state's entry time.
    pub fn mark_state_entry(&mut self) {
        self.state_entered_us = self.clock_us;
    }

    /// Queue an event for the service to publish.
    pub fn emit(&mut self, event: SessionEvent) {
        if let Err(dropped) = self.outbox.push_back(event) {
            warn!("event outbox full, dropping {dropped:?}");
        }
    }

    pub fn take_event(&mut self) -> Option<SessionEvent> {
        self.outbox.pop_front()
    }

    /// Rebase the ring on the current time and empty it.  Runs under the
    /// bank lock so the transfer task is never mid-drain.
    pub fn restart_ring(&self) {
        let _bank = self.sensors.lock();
        self.ring.set_epoch(self.now_us);
        self.ring.reset();
    }

    /// Stop capture: interrupts first, then finish any edges still waiting
    /// for a payload, then power the sensors down.
    pub fn stop_capture(&mut self) {
        self.interrupts.disable_capture();
        self.sensors.transfer(self.ring);
        self.sensors.lock().disable_all();
    }
}
