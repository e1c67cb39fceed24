//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured session events to the
//! `log` facade (UART / USB-CDC on the device via `esp_idf_logger`).

use log::{info, warn};

use crate::app::events::SessionEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`SessionEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            SessionEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            SessionEvent::RecordingOpened { trial, channels } => {
                info!("OPEN  | trial={} channels=0b{:04b}", trial, channels);
            }
            SessionEvent::RecordingSaved {
                trial,
                records,
                overruns,
            } => {
                if *overruns > 0 {
                    warn!(
                        "SAVE  | trial={} records={} overruns={}",
                        trial, records, overruns
                    );
                } else {
                    info!("SAVE  | trial={} records={}", trial, records);
                }
            }
            SessionEvent::ExportFinished { trial, records } => {
                info!("CSV   | trial={} rows={}", trial, records);
            }
            SessionEvent::Fault(e) => {
                warn!("FAULT | {}", e);
            }
        }
    }
}
