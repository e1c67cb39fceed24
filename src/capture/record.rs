//! The fixed-size sample record shared by the capture ring, the recording
//! file and the CSV exporter.
//!
//! Wire layout (12 bytes, little-endian):
//!
//! ```text
//! ┌────────────────────┬──────────────────────┬──────────────┐
//! │ capture_timestamp  │ payload (raw burst)  │ source_id    │
//! │ u32 LE, µs         │ 6 bytes              │ u16 LE       │
//! └────────────────────┴──────────────────────┴──────────────┘
//! ```

/// Identity of the data-ready line a sample was captured from.
pub type SourceId = u16;

/// Bytes clocked out of a sensor per sample (three 16-bit axes).
pub const PAYLOAD_LEN: usize = 6;
/// Size of one record in the ring and in the recording file.
pub const RECORD_SIZE: usize = 12;

pub(crate) const TIMESTAMP_OFFSET: usize = 0;
pub(crate) const PAYLOAD_OFFSET: usize = 4;
pub(crate) const SOURCE_OFFSET: usize = PAYLOAD_OFFSET + PAYLOAD_LEN;

/// One captured sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    /// Microseconds since the capture epoch (recording start).
    pub capture_timestamp: u32,
    /// Raw register burst, still in the sensor's own encoding.
    pub payload: [u8; PAYLOAD_LEN],
    pub source_id: SourceId,
}

impl RawSample {
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[TIMESTAMP_OFFSET..PAYLOAD_OFFSET].copy_from_slice(&self.capture_timestamp.to_le_bytes());
        out[PAYLOAD_OFFSET..SOURCE_OFFSET].copy_from_slice(&self.payload);
        out[SOURCE_OFFSET..].copy_from_slice(&self.source_id.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let [t0, t1, t2, t3, p0, p1, p2, p3, p4, p5, s0, s1] = *bytes;
        Self {
            capture_timestamp: u32::from_le_bytes([t0, t1, t2, t3]),
            payload: [p0, p1, p2, p3, p4, p5],
            source_id: u16::from_le_bytes([s0, s1]),
        }
    }
}
