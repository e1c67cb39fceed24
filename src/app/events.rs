//! Outbound session events.
//!
//! The [`RecorderService`](super::service::RecorderService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.

use crate::error::Error;
use crate::fsm::StateId;

/// Structured events emitted by the recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The service has started (carries the initial state).
    Started(StateId),

    /// The session state machine changed state.
    StateChanged { from: StateId, to: StateId },

    /// A recording file was opened and capture enabled.
    RecordingOpened { trial: u32, channels: u8 },

    /// Capture stopped and the recording file was closed.
    RecordingSaved {
        trial: u32,
        /// Records written to the raw file.
        records: u32,
        /// Edges dropped by a full ring plus halves overwritten before
        /// they were flushed.
        overruns: u32,
    },

    /// The CSV export of a recording completed.
    ExportFinished { trial: u32, records: u32 },

    /// A fault was raised (setup-fatal faults end in the Error state).
    Fault(Error),
}
