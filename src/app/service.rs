//! Application service — the hexagonal core.
//!
//! [`RecorderService`] owns the session state machine and its context.
//! It exposes a clean, hardware-agnostic API; storage and the interrupt
//! gate are injected at construction, events leave through an
//! [`EventSink`] passed at call sites, so the whole recorder runs against
//! mock adapters on the host.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                 │     RecorderService       │
//! StoragePort ◀──▶│  FSM · CaptureRing · CSV  │◀── button / clock
//!                 └──────────────────────────┘
//!                          ▲
//!                 InterruptPort (data-ready gate)
//! ```
//!
//! The capture ring is shared with interrupt context and therefore only
//! borrowed; phase 1 may be fed from an ISR directly or through
//! [`RecorderService::data_ready`].  Phase 2 normally runs in the transfer
//! task (see [`super::transfer`]) over [`RecorderService::sensors`], so SPI
//! bursts keep up while the main loop is blocked in a storage write;
//! [`RecorderService::service_transfers`] runs it inline.

use log::{error, info, warn};

use crate::adapters::settings::SettingsFile;
use crate::capture::{CaptureRing, SourceId};
use crate::config::{SessionConfig, SettingsOutcome};
use crate::drivers::led_patterns;
use crate::error::{Error, Result, StorageError};
use crate::fsm::context::SessionContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::sensors::{SensorBank, SharedBank};

use super::events::SessionEvent;
use super::ports::{ConfigError, ConfigPort, EventSink, InterruptPort, StoragePort};

// ───────────────────────────────────────────────────────────────
// RecorderService
// ───────────────────────────────────────────────────────────────

pub struct RecorderService<'r, S: StoragePort, I: InterruptPort> {
    fsm: Fsm<SessionContext<'r, S, I>>,
    ctx: SessionContext<'r, S, I>,
    /// Overrun counters already reported, to log only new ones.
    reported_drops: u32,
    reported_flush_overruns: u32,
}

impl<'r, S: StoragePort, I: InterruptPort> RecorderService<'r, S, I> {
    /// Construct the service.  Does **not** touch the hardware; call
    /// [`setup`](Self::setup) and then [`start`](Self::start).
    pub fn new(ring: &'r CaptureRing<'r>, sensors: SensorBank, storage: S, interrupts: I) -> Self {
        let mut ctx = SessionContext::new(ring, sensors, storage, interrupts);
        ctx.interrupts.disable_capture();
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx,
            reported_drops: 0,
            reported_flush_overruns: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Boot sequence: identify the sensors, load (or recreate) the
    /// settings file, configure every channel.
    ///
    /// Any failure is setup-fatal: the fault is emitted and the machine
    /// will start in the Error state.
    pub fn setup(&mut self, now_us: u32, sink: &mut impl EventSink) -> Result<SettingsOutcome> {
        self.ctx.set_now(now_us);

        match self.run_setup() {
            Ok(outcome) => {
                let burst = match outcome {
                    SettingsOutcome::Loaded => led_patterns::SUCCESS_BURST,
                    SettingsOutcome::Defaulted => led_patterns::ERROR_BURST,
                };
                self.ctx.led.set_burst(burst, now_us);
                info!("setup complete, settings {:?}", outcome);
                Ok(outcome)
            }
            Err(e) => {
                error!("setup failed: {e}");
                self.ctx.fault = Some(e);
                self.fsm = Fsm::new(build_state_table(), StateId::Error);
                sink.emit(&SessionEvent::Fault(e));
                Err(e)
            }
        }
    }

    fn run_setup(&mut self) -> Result<SettingsOutcome> {
        self.ctx.sensors.lock().identify()?;

        self.ctx.storage.mount()?;
        let settings = load_or_recreate(&mut self.ctx.storage);
        self.ctx.storage.unmount();
        let (config, outcome) = settings?;

        self.ctx.sensors.lock().configure(&config)?;
        self.ctx.apply_config(config);
        Ok(outcome)
    }

    /// Run the initial state's entry action.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.fsm.start(&mut self.ctx);
        sink.emit(&SessionEvent::Started(self.fsm.current_state()));
        self.flush_events(sink);
        info!("RecorderService started in {:?}", self.fsm.current_state());
    }

    // ── Per-iteration orchestration ───────────────────────────

    /// One state-machine poll.  `button_pressed` is the debounced press
    /// edge for this iteration.
    pub fn poll(&mut self, now_us: u32, button_pressed: bool, sink: &mut impl EventSink) {
        let prev = self.fsm.current_state();

        self.ctx.set_now(now_us);
        self.ctx.button_pressed = button_pressed;
        self.fsm.poll(&mut self.ctx);
        self.ctx.button_pressed = false;

        let next = self.fsm.current_state();
        if next != prev {
            sink.emit(&SessionEvent::StateChanged {
                from: prev,
                to: next,
            });
        }
        self.flush_events(sink);
    }

    /// Phase 1 entry point: a data-ready edge from `source_id`.
    pub fn data_ready(&self, now_us: u32, source_id: SourceId) -> bool {
        self.ctx.ring.capture_edge(now_us, source_id)
    }

    /// Phase 2 inline: perform the SPI bursts for every captured edge.
    /// Returns the number of samples completed.
    pub fn service_transfers(&mut self) -> usize {
        let drained = self.ctx.sensors.transfer(self.ctx.ring);
        self.report_overruns();
        drained
    }

    /// Log ring drops and late flushes not reported yet.
    pub fn report_overruns(&mut self) {
        let drops = self.ctx.ring.overruns();
        if drops < self.reported_drops {
            self.reported_drops = 0;
        }
        if drops > self.reported_drops {
            warn!("capture ring full: {} edge(s) dropped", drops - self.reported_drops);
            self.reported_drops = drops;
        }

        let flush = self.ctx.ring.cursor().flush_overruns();
        if flush < self.reported_flush_overruns {
            self.reported_flush_overruns = 0;
        }
        if flush > self.reported_flush_overruns {
            warn!(
                "stream logger behind: {} half(s) overwritten before flush",
                flush - self.reported_flush_overruns
            );
            self.reported_flush_overruns = flush;
        }
    }

    fn flush_events(&mut self, sink: &mut impl EventSink) {
        while let Some(event) = self.ctx.take_event() {
            sink.emit(&event);
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn state_name(&self) -> &'static str {
        self.fsm.state_name()
    }

    /// Status LED level at `now_us`.
    pub fn led_level(&mut self, now_us: u32) -> bool {
        self.ctx.led.tick(now_us)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.ctx.config
    }

    /// Trial number of the current or most recent recording.
    pub fn trial(&self) -> u32 {
        self.ctx.trial
    }

    /// The fault that stopped setup, if any.
    pub fn fault(&self) -> Option<Error> {
        self.ctx.fault
    }

    /// Handle on the sensor bank for the transfer task.
    pub fn sensors(&self) -> SharedBank {
        self.ctx.sensors.clone()
    }

    pub fn storage(&self) -> &S {
        &self.ctx.storage
    }

    pub fn interrupts(&self) -> &I {
        &self.ctx.interrupts
    }
}

/// Load the settings file, falling back to defaults, and write the result
/// back so the file is complete and valid on the next boot.
fn load_or_recreate<S: StoragePort>(storage: &mut S) -> Result<(SessionConfig, SettingsOutcome)> {
    let mut file = SettingsFile::new(storage);
    let (config, outcome) = match file.load() {
        Ok(config) => (config, SettingsOutcome::Loaded),
        Err(e) => {
            warn!("settings unusable ({e}), using defaults");
            (SessionConfig::default(), SettingsOutcome::Defaulted)
        }
    };
    file.save(&config).map_err(config_to_error)?;
    Ok((config, outcome))
}

fn config_to_error(e: ConfigError) -> Error {
    match e {
        ConfigError::StorageFull => Error::Storage(StorageError::Full),
        ConfigError::IoError | ConfigError::NotFound => Error::Storage(StorageError::Io),
        ConfigError::ValidationFailed(msg) => Error::Config(msg),
        ConfigError::Corrupted => Error::Config("settings could not be serialised"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::settings::SETTINGS_FILE;
    use crate::adapters::storage::MemStorage;
    use crate::capture::SlotArray;

    #[derive(Default)]
    struct Gate(bool);

    impl InterruptPort for Gate {
        fn enable_capture(&mut self) {
            self.0 = true;
        }
        fn disable_capture(&mut self) {
            self.0 = false;
        }
    }

    #[derive(Default)]
    struct Events(Vec<SessionEvent>);

    impl EventSink for Events {
        fn emit(&mut self, event: &SessionEvent) {
            self.0.push(event.clone());
        }
    }

    #[test]
    fn setup_without_settings_file_defaults_and_rewrites_it() {
        let slots = SlotArray::<8>::new();
        let ring = CaptureRing::new(&slots);
        let storage = MemStorage::new();
        let mut svc = RecorderService::new(&ring, SensorBank::new(), storage.clone(), Gate::default());
        let mut sink = Events::default();

        assert_eq!(svc.setup(0, &mut sink), Ok(SettingsOutcome::Defaulted));
        assert!(storage.text(SETTINGS_FILE).is_some());
        assert!(!storage.is_mounted());

        svc.start(&mut sink);
        assert_eq!(svc.state(), StateId::Idle);
        assert_eq!(sink.0, [SessionEvent::Started(StateId::Idle)]);
    }

    #[test]
    fn setup_with_valid_file_loads_it() {
        let slots = SlotArray::<8>::new();
        let ring = CaptureRing::new(&slots);
        let storage = MemStorage::new();
        storage.put(SETTINGS_FILE, br#"{ "recording_length_ms": 250 }"#.to_vec());
        let mut svc = RecorderService::new(&ring, SensorBank::new(), storage, Gate::default());

        assert_eq!(svc.setup(0, &mut Events::default()), Ok(SettingsOutcome::Loaded));
        assert_eq!(svc.config().recording_length_ms, 250);
    }

    #[test]
    fn mount_failure_is_setup_fatal() {
        let slots = SlotArray::<8>::new();
        let ring = CaptureRing::new(&slots);
        let storage = MemStorage::new();
        storage.fail_mount(true);
        let mut svc = RecorderService::new(&ring, SensorBank::new(), storage, Gate::default());
        let mut sink = Events::default();

        let err = svc.setup(0, &mut sink).unwrap_err();
        assert_eq!(err, Error::Storage(StorageError::MountFailed));
        svc.start(&mut sink);
        assert_eq!(svc.state(), StateId::Error);

        // Terminal: the button does nothing.
        svc.poll(1_000, true, &mut sink);
        assert_eq!(svc.state(), StateId::Error);
        assert_eq!(sink.0[0], SessionEvent::Fault(err));
    }

    #[test]
    fn service_transfers_counts_completed_samples() {
        let slots = SlotArray::<8>::new();
        let ring = CaptureRing::new(&slots);
        let mut svc = RecorderService::new(&ring, SensorBank::new(), MemStorage::new(), Gate::default());

        assert!(svc.data_ready(1, 0x1000));
        assert!(svc.data_ready(2, 0x0010));
        assert_eq!(svc.service_transfers(), 2);
        assert_eq!(svc.service_transfers(), 0);
        assert_eq!(ring.completed_total(), 2);
    }
}
