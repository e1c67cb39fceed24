//! Session state handlers and table builder.
//!
//! ```text
//!  IDLE ──[button, delay > 0]──▶ STAGING ──[delay elapsed]──┐
//!   │  ▲                           │                        │
//!   │  └──────────[button]─────────┘                        ▼
//!   └─────────[button, delay = 0]─────────────────────────▶ ARMED
//!                                                            │
//!                                 [trigger fired / disabled] │
//!                                                            ▼
//!  IDLE ◀──[export done]── SAVING ◀──[button / max length]── RECORDING
//!
//!  setup fault ──▶ ERROR (terminal)
//! ```

use log::{error, info, warn};

use super::context::SessionContext;
use super::{StateDescriptor, StateId};
use crate::app::events::SessionEvent;
use crate::app::ports::{InterruptPort, StoragePort};
use crate::capture::naming::{next_trial_number, raw_file_name};
use crate::capture::{ExportStep, Exporter, RECORD_SIZE, TriggerEvaluator};
use crate::drivers::led_patterns;
use crate::error::Result;

type Ctx<'r, S, I> = SessionContext<'r, S, I>;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table<'r, S, I>() -> [StateDescriptor<Ctx<'r, S, I>>; StateId::COUNT]
where
    S: StoragePort,
    I: InterruptPort,
{
    [
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_poll: idle_poll,
        },
        StateDescriptor {
            id: StateId::Staging,
            name: "Staging",
            on_enter: Some(staging_enter),
            on_exit: None,
            on_poll: staging_poll,
        },
        StateDescriptor {
            id: StateId::Armed,
            name: "Armed",
            on_enter: Some(armed_enter),
            on_exit: None,
            on_poll: armed_poll,
        },
        StateDescriptor {
            id: StateId::Recording,
            name: "Recording",
            on_enter: Some(recording_enter),
            on_exit: None,
            on_poll: recording_poll,
        },
        StateDescriptor {
            id: StateId::Saving,
            name: "Saving",
            on_enter: Some(saving_enter),
            on_exit: None,
            on_poll: saving_poll,
        },
        StateDescriptor {
            id: StateId::Error,
            name: "Error",
            on_enter: Some(error_enter),
            on_exit: None,
            on_poll: error_poll,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) {
    ctx.mark_state_entry();
    ctx.led.set_sequence(led_patterns::IDLE, ctx.now_us());
}

fn idle_poll<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) -> Option<StateId> {
    if !ctx.button_pressed {
        return None;
    }
    if ctx.config.delay_before_armed_ms > 0 {
        Some(StateId::Staging)
    } else {
        Some(StateId::Armed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STAGING — waiting out the pre-arm delay
// ═══════════════════════════════════════════════════════════════════════════

fn staging_enter<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) {
    ctx.mark_state_entry();
    ctx.led.set_sequence(led_patterns::STAGING, ctx.now_us());
    info!("arming in {} ms", ctx.config.delay_before_armed_ms);
}

fn staging_poll<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) -> Option<StateId> {
    if ctx.button_pressed {
        return Some(StateId::Idle);
    }
    ctx.elapsed_at_least_ms(ctx.config.delay_before_armed_ms)
        .then_some(StateId::Armed)
}

// ═══════════════════════════════════════════════════════════════════════════
//  ARMED — file open, sensors running, waiting for the trigger
// ═══════════════════════════════════════════════════════════════════════════

fn armed_enter<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) {
    ctx.mark_state_entry();
    ctx.led.set_sequence(led_patterns::ARMED, ctx.now_us());
    ctx.trigger_seen = 0;

    match open_recording(ctx) {
        Ok(channels) => ctx.emit(SessionEvent::RecordingOpened {
            trial: ctx.trial,
            channels,
        }),
        Err(e) => {
            error!("cannot arm: {e}");
            ctx.fault = Some(e);
        }
    }
}

/// Create the next trial's raw file and start capture.  Returns the
/// enabled-channel mask.
fn open_recording<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) -> Result<u8> {
    ctx.storage.mount()?;
    let names = ctx.storage.list()?;

    let base = &ctx.config.data_file_base;
    let ext = &ctx.config.data_file_ext;
    ctx.trial = next_trial_number(names.iter().map(String::as_str), base, ext);
    ctx.raw_file = raw_file_name(base, ext, ctx.trial)?;

    let file = ctx.storage.create(&ctx.raw_file)?;
    ctx.logger.start(file);
    info!("trial {}: recording to {}", ctx.trial, ctx.raw_file);

    let (running, mask) = {
        let mut bank = ctx.sensors.lock();
        (bank.enable_all(), bank.enabled_mask())
    };
    info!("{running} channel(s) enabled");

    ctx.restart_ring();
    ctx.interrupts.enable_capture();

    Ok(mask)
}

fn armed_poll<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) -> Option<StateId> {
    if let Some(e) = ctx.fault.take() {
        ctx.emit(SessionEvent::Fault(e));
        ctx.stop_capture();
        ctx.logger.abandon();
        ctx.storage.unmount();
        return Some(StateId::Idle);
    }

    if !ctx.trigger.enabled {
        return Some(StateId::Recording);
    }

    // Only the newest completed sample, and only once per sample.
    let total = ctx.ring.completed_total();
    if total == ctx.trigger_seen {
        return None;
    }
    ctx.trigger_seen = total;

    let sample = ctx.ring.latest_completed()?;
    let accel_g = ctx.sensors.lock().decode(sample.source_id, &sample.payload)?;
    if TriggerEvaluator::evaluate(&sample, accel_g, &ctx.trigger) {
        info!(
            "trigger fired: source 0x{:04X} at [{:.3}, {:.3}, {:.3}] g",
            sample.source_id, accel_g[0], accel_g[1], accel_g[2]
        );
        return Some(StateId::Recording);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  RECORDING — streaming the ring to the raw file
// ═══════════════════════════════════════════════════════════════════════════

fn recording_enter<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) {
    ctx.mark_state_entry();
    ctx.led.set_sequence(led_patterns::RECORDING, ctx.now_us());

    // Restart the ring at the recording epoch with capture paused so no
    // edge lands between the reset and the cursor arming.
    ctx.interrupts.disable_capture();
    ctx.restart_ring();
    ctx.ring.cursor().arm();
    ctx.interrupts.enable_capture();
}

fn recording_poll<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) -> Option<StateId> {
    if let Err(e) = ctx.logger.update(ctx.ring) {
        warn!("recording write failed: {e}");
    }

    if ctx.button_pressed || ctx.elapsed_at_least_ms(ctx.config.recording_length_ms) {
        info!(
            "recording stopped after {} ms{}",
            ctx.elapsed_us() / 1000,
            if ctx.button_pressed { " (button)" } else { "" }
        );
        ctx.stop_capture();
        return Some(StateId::Saving);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAVING — closing the raw file, optional CSV export
// ═══════════════════════════════════════════════════════════════════════════

fn saving_enter<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) {
    ctx.mark_state_entry();
    ctx.led.set_sequence(led_patterns::SAVING, ctx.now_us());

    let dropped = ctx.ring.overruns();
    let unflushed = ctx.ring.cursor().flush_overruns();
    if dropped > 0 || unflushed > 0 {
        warn!("trial {}: {dropped} edge(s) dropped, {unflushed} half(s) overwritten", ctx.trial);
    }

    match ctx.logger.stop(ctx.ring) {
        Ok(bytes) => ctx.emit(SessionEvent::RecordingSaved {
            trial: ctx.trial,
            records: (bytes / RECORD_SIZE) as u32,
            overruns: dropped.saturating_add(unflushed),
        }),
        Err(e) => {
            warn!("closing {} failed: {e}", ctx.raw_file);
            ctx.emit(SessionEvent::Fault(e.into()));
        }
    }

    if ctx.config.data_formatting_enabled {
        match ctx.storage.open(&ctx.raw_file) {
            Ok(reader) => ctx.exporter = Some(Exporter::open(reader, ctx.trial)),
            Err(e) => {
                warn!("cannot reopen {} for export: {e}", ctx.raw_file);
                ctx.emit(SessionEvent::Fault(e.into()));
            }
        }
    }
}

fn saving_poll<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) -> Option<StateId> {
    if let Some(exporter) = ctx.exporter.as_mut() {
        match exporter.step(&mut ctx.storage, &ctx.sensors) {
            Ok(ExportStep::Finished) => {
                if let Some(exporter) = ctx.exporter.take() {
                    match exporter.finish() {
                        Ok(records) => ctx.emit(SessionEvent::ExportFinished {
                            trial: ctx.trial,
                            records,
                        }),
                        Err(e) => ctx.emit(SessionEvent::Fault(e)),
                    }
                }
            }
            Ok(_) => return None,
            Err(e) => {
                warn!("export of trial {} aborted: {e}", ctx.trial);
                ctx.exporter = None;
                ctx.emit(SessionEvent::Fault(e));
            }
        }
    }

    ctx.storage.unmount();
    Some(StateId::Idle)
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR — terminal until reset
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter<S: StoragePort, I: InterruptPort>(ctx: &mut Ctx<'_, S, I>) {
    ctx.mark_state_entry();
    ctx.led.set_sequence(led_patterns::ERROR, ctx.now_us());
    ctx.interrupts.disable_capture();
    if let Some(e) = ctx.fault {
        error!("halted: {e}");
    }
}

fn error_poll<S: StoragePort, I: InterruptPort>(_ctx: &mut Ctx<'_, S, I>) -> Option<StateId> {
    None
}
