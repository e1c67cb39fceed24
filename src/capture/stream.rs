//! Double-buffered streaming of the capture ring to the recording file.
//!
//! The ring's byte buffer is split into two halves.  While recording, every
//! completed slot advances a write cursor; when the cursor fills a half,
//! that half is marked ready and the main loop writes it out while phase 2
//! keeps filling the other one.
//!
//! ```text
//!          half A                    half B
//!  ┌───────────────────────┬───────────────────────┐
//!  │ ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓ │ ▓▓▓▓▓▓▓▓▓░░░░░░░░░░░░ │
//!  └───────────────────────┴────────▲──────────────┘
//!   ready → StreamLogger::update     cursor (phase 2)
//! ```

use core::ops::Range;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};
use std::io::Write;

use log::warn;

use super::record::RECORD_SIZE;
use super::ring::CaptureRing;
use crate::error::StorageError;

const READY_NONE: u8 = 0;
const READY_A: u8 = 1;
const READY_B: u8 = 2;

/// One half of the ring's byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    A,
    B,
}

impl Half {
    /// Byte range of this half in a buffer of `total` bytes.
    pub fn range(self, total: usize) -> Range<usize> {
        let mid = total / 2;
        match self {
            Self::A => 0..mid,
            Self::B => mid..total,
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::A => READY_A,
            Self::B => READY_B,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            READY_A => Some(Self::A),
            READY_B => Some(Self::B),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamCursor
// ---------------------------------------------------------------------------

/// Write cursor over the ring's byte buffer.  Advanced from phase 2, read
/// and cleared from the main loop.
pub struct StreamCursor {
    offset: AtomicUsize,
    ready: AtomicU8,
    armed: AtomicBool,
    /// A half became ready before the previous one was written out.
    flush_overruns: AtomicU32,
    total_bytes: usize,
}

impl StreamCursor {
    pub const fn new(total_bytes: usize) -> Self {
        Self {
            offset: AtomicUsize::new(0),
            ready: AtomicU8::new(READY_NONE),
            armed: AtomicBool::new(false),
            flush_overruns: AtomicU32::new(0),
            total_bytes,
        }
    }

    /// Rewind to the start of half A and begin tracking completions.
    pub fn arm(&self) {
        self.offset.store(0, Ordering::Relaxed);
        self.ready.store(READY_NONE, Ordering::Relaxed);
        self.flush_overruns.store(0, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Account for one more completed record.
    pub fn advance(&self) {
        let mid = self.total_bytes / 2;
        let mut next = self.offset.load(Ordering::Relaxed) + RECORD_SIZE;

        if next == mid {
            self.mark_ready(Half::A);
        } else if next >= self.total_bytes {
            self.mark_ready(Half::B);
            next = 0;
        }
        self.offset.store(next, Ordering::Release);
    }

    fn mark_ready(&self, half: Half) {
        if self.ready.swap(half.tag(), Ordering::AcqRel) != READY_NONE {
            self.flush_overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Byte offset of the next record to be completed.
    pub fn offset(&self) -> usize {
        self.offset.load(Ordering::Acquire)
    }

    /// The half waiting to be written out, if any.
    pub fn ready_half(&self) -> Option<Half> {
        Half::from_tag(self.ready.load(Ordering::Acquire))
    }

    /// Clear `half`'s ready flag unless phase 2 has replaced it meanwhile.
    fn clear_ready(&self, half: Half) {
        let _ = self.ready.compare_exchange(
            half.tag(),
            READY_NONE,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }

    pub fn flush_overruns(&self) -> u32 {
        self.flush_overruns.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

// ---------------------------------------------------------------------------
// StreamLogger
// ---------------------------------------------------------------------------

/// Writes completed halves of the ring to an open recording file.
pub struct StreamLogger<W> {
    file: Option<W>,
    bytes_written: usize,
}

impl<W: Write> Default for StreamLogger<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StreamLogger<W> {
    pub const fn new() -> Self {
        Self {
            file: None,
            bytes_written: 0,
        }
    }

    /// Take ownership of a freshly created recording file.
    pub fn start(&mut self, file: W) {
        self.file = Some(file);
        self.bytes_written = 0;
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Write out the ready half, if any.  Returns the bytes written.
    ///
    /// The ready flag is cleared even when the write fails, so a storage
    /// fault costs one half rather than stalling the stream.
    pub fn update(&mut self, ring: &CaptureRing<'_>) -> Result<usize, StorageError> {
        let cursor = ring.cursor();
        let Some(half) = cursor.ready_half() else {
            return Ok(0);
        };
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };

        let result = write_range(file, ring, half.range(cursor.total_bytes()));
        cursor.clear_ready(half);

        let n = result?;
        self.bytes_written += n;
        Ok(n)
    }

    /// Stop streaming: write any ready half, then the partially filled
    /// active half, flush and close the file.  Returns the total bytes
    /// written over the whole recording.
    ///
    /// Capture interrupts must already be disabled.
    pub fn stop(&mut self, ring: &CaptureRing<'_>) -> Result<usize, StorageError> {
        let cursor = ring.cursor();
        cursor.disarm();

        let Some(mut file) = self.file.take() else {
            return Ok(self.bytes_written);
        };

        let total = cursor.total_bytes();
        if let Some(half) = cursor.ready_half() {
            let result = write_range(&mut file, ring, half.range(total));
            cursor.clear_ready(half);
            self.bytes_written += result?;
        }

        let offset = cursor.offset();
        let mid = total / 2;
        let tail = if offset < mid { 0..offset } else { mid..offset };
        self.bytes_written += write_range(&mut file, ring, tail)?;

        file.flush()?;
        Ok(self.bytes_written)
    }

    /// Drop the file without writing anything further.
    pub fn abandon(&mut self) {
        if self.file.take().is_some() {
            warn!("recording file abandoned after {} bytes", self.bytes_written);
        }
    }
}

fn write_range<W: Write>(
    file: &mut W,
    ring: &CaptureRing<'_>,
    range: Range<usize>,
) -> Result<usize, StorageError> {
    // SAFETY: the cursor only hands out halves phase 2 has finished with,
    // and the partial tail is only written once capture has stopped.
    let bytes = unsafe { ring.bytes(range) };
    file.write_all(bytes)?;
    Ok(bytes.len())
}
