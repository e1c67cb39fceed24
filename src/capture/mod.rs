//! Real-time acquisition pipeline: the two-phase capture ring, the
//! double-buffered recording stream, the trigger and the post-recording
//! CSV export.

pub mod export;
pub mod naming;
pub mod record;
pub mod ring;
pub mod stream;
pub mod trigger;

pub use export::{ExportStep, Exporter, SampleDecoder};
pub use record::{PAYLOAD_LEN, RECORD_SIZE, RawSample, SourceId};
pub use ring::{CaptureRing, SlotArray};
pub use stream::{Half, StreamCursor, StreamLogger};
pub use trigger::{TriggerConfig, TriggerEvaluator};
