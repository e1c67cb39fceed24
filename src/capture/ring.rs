//! Two-phase interrupt capture ring.
//!
//! ```text
//!  data-ready edge ──▶ capture_edge()      phase 1: timestamp + source into slot `pending`
//!                                           (no I/O, bounded time)
//!  transfer task ────▶ drain(transfer)     phase 2: SPI burst into slot `completed`,
//!                                           loops until caught up with `pending`
//!  main loop ────────▶ latest_completed()  trigger check on the newest sample
//!                      StreamLogger        flushes completed halves to storage
//! ```
//!
//! The slot array is an arena indexed by two monotonically advancing
//! counters.  The index stores are the only synchronisation: each handler
//! finishes its slot access first and publishes the new index last, with
//! `Release`, and every reader loads the opposing index with `Acquire`.
//!
//! Phase-1 handlers must not preempt each other (they share one priority
//! level), and `drain` must only ever run from a single context.

use core::cell::UnsafeCell;
use core::ops::Range;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use super::record::{
    PAYLOAD_LEN, PAYLOAD_OFFSET, RECORD_SIZE, RawSample, SOURCE_OFFSET, SourceId, TIMESTAMP_OFFSET,
};
use super::stream::StreamCursor;

// ---------------------------------------------------------------------------
// Slot storage
// ---------------------------------------------------------------------------

/// One record's worth of bytes, written from interrupt context.
#[repr(transparent)]
pub struct Slot(UnsafeCell<[u8; RECORD_SIZE]>);

// SAFETY: byte access is partitioned by the ring indices.  Phase 1 only
// writes the header of slot `pending`, phase 2 only writes the payload of
// slot `completed`, and readers only touch slots behind `completed`.
unsafe impl Sync for Slot {}

impl Slot {
    pub const fn empty() -> Self {
        Self(UnsafeCell::new([0; RECORD_SIZE]))
    }

    /// # Safety
    /// No other context may access this slot concurrently.
    unsafe fn write_header(&self, timestamp: u32, source_id: SourceId) {
        let bytes = unsafe { &mut *self.0.get() };
        bytes[TIMESTAMP_OFFSET..PAYLOAD_OFFSET].copy_from_slice(&timestamp.to_le_bytes());
        bytes[SOURCE_OFFSET..].copy_from_slice(&source_id.to_le_bytes());
    }

    /// # Safety
    /// No other context may access this slot concurrently.
    unsafe fn write_payload(&self, payload: &[u8; PAYLOAD_LEN]) {
        let bytes = unsafe { &mut *self.0.get() };
        bytes[PAYLOAD_OFFSET..SOURCE_OFFSET].copy_from_slice(payload);
    }

    /// # Safety
    /// No other context may write this slot concurrently.
    unsafe fn read(&self) -> RawSample {
        RawSample::from_bytes(unsafe { &*self.0.get() })
    }
}

/// Statically allocatable backing array for a [`CaptureRing`].
///
/// `N` must be even (the stream logger splits it into two halves) and at
/// least 2; both are checked at compile time.
pub struct SlotArray<const N: usize>([Slot; N]);

impl<const N: usize> SlotArray<N> {
    const VALID: () = assert!(N >= 2 && N % 2 == 0, "ring capacity must be even and >= 2");

    pub const fn new() -> Self {
        let () = Self::VALID;
        Self([const { Slot::empty() }; N])
    }
}

impl<const N: usize> Default for SlotArray<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// CaptureRing
// ---------------------------------------------------------------------------

pub struct CaptureRing<'a> {
    slots: &'a [Slot],
    /// Next slot phase 1 will fill.
    pending: AtomicUsize,
    /// Next slot phase 2 will fill.
    completed: AtomicUsize,
    /// Samples completed since the last reset (saturating at `u32::MAX`).
    completed_total: AtomicU32,
    /// Timestamp base subtracted from every capture.
    epoch_us: AtomicU32,
    /// Edges dropped because the ring was full.
    overruns: AtomicU32,
    cursor: StreamCursor,
}

impl<'a> CaptureRing<'a> {
    pub const fn new<const N: usize>(slots: &'a SlotArray<N>) -> Self {
        Self {
            slots: &slots.0,
            pending: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            completed_total: AtomicU32::new(0),
            epoch_us: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            cursor: StreamCursor::new(N * RECORD_SIZE),
        }
    }

    // ── Phase 1 ───────────────────────────────────────────────

    /// Record a data-ready edge.  Interrupt-safe, no I/O.
    ///
    /// When the ring is full the newest edge is dropped and counted;
    /// undrained samples are never overwritten.  Returns `false` on drop.
    pub fn capture_edge(&self, now_us: u32, source_id: SourceId) -> bool {
        let cap = self.slots.len();
        let pending = self.pending.load(Ordering::Relaxed);
        let next = (pending + 1) % cap;

        if next == self.completed.load(Ordering::Acquire) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let timestamp = now_us.wrapping_sub(self.epoch_us.load(Ordering::Relaxed));
        // SAFETY: slot `pending` lies outside [completed, pending), so phase 2
        // and the readers leave it alone until the store below publishes it.
        unsafe { self.slots[pending].write_header(timestamp, source_id) };

        self.pending.store(next, Ordering::Release);
        true
    }

    // ── Phase 2 ───────────────────────────────────────────────

    /// Fill every captured-but-untransferred slot, oldest first.
    ///
    /// `transfer` performs the sensor burst for a source.  A `None` leaves
    /// the slot's previous payload in place; the slot is still completed.
    /// Loops until caught up with `pending`, including edges that arrive
    /// while draining.  Returns the number of slots completed.
    pub fn drain<F>(&self, mut transfer: F) -> usize
    where
        F: FnMut(SourceId) -> Option<[u8; PAYLOAD_LEN]>,
    {
        let cap = self.slots.len();
        let mut drained = 0;

        loop {
            let completed = self.completed.load(Ordering::Relaxed);
            if completed == self.pending.load(Ordering::Acquire) {
                break;
            }

            let slot = &self.slots[completed];
            // SAFETY: phase 1 published this slot and will not revisit it
            // until `completed` moves past it.
            let source_id = unsafe { slot.read() }.source_id;
            if let Some(payload) = transfer(source_id) {
                // SAFETY: as above; this context is the slot's only writer.
                unsafe { slot.write_payload(&payload) };
            }

            let total = self.completed_total.load(Ordering::Relaxed);
            self.completed_total.store(total.saturating_add(1), Ordering::Relaxed);
            self.completed.store((completed + 1) % cap, Ordering::Release);

            if self.cursor.is_armed() {
                self.cursor.advance();
            }
            drained += 1;
        }

        drained
    }

    // ── Control (main loop, capture interrupts disabled) ─────

    /// Rewind both indices and clear the counters.
    pub fn reset(&self) {
        self.pending.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.completed_total.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Release);
    }

    /// Make subsequent capture timestamps relative to `now_us`.
    pub fn set_epoch(&self, now_us: u32) {
        self.epoch_us.store(now_us, Ordering::Release);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Captured samples still waiting for their transfer.
    pub fn backlog(&self) -> usize {
        let cap = self.slots.len();
        (self.pending() + cap - self.completed()) % cap
    }

    pub fn completed_total(&self) -> u32 {
        self.completed_total.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// The most recently completed sample, if any since the last reset.
    pub fn latest_completed(&self) -> Option<RawSample> {
        let cap = self.slots.len();
        let completed = self.completed.load(Ordering::Acquire);
        if self.completed_total.load(Ordering::Relaxed) == 0 {
            return None;
        }
        // SAFETY: the slot behind `completed` is finished; phase 1 cannot
        // reach it because a full ring drops new edges.
        Some(unsafe { self.slots[(completed + cap - 1) % cap].read() })
    }

    pub fn cursor(&self) -> &StreamCursor {
        &self.cursor
    }

    /// Raw bytes of the backing array, clamped to its length.
    ///
    /// # Safety
    /// No capture context may write inside `range` while the returned
    /// slice is alive.
    pub(crate) unsafe fn bytes(&self, range: Range<usize>) -> &[u8] {
        let total = self.slots.len() * RECORD_SIZE;
        let start = range.start.min(total);
        let end = range.end.clamp(start, total);
        // SAFETY: `Slot` is a transparent `UnsafeCell<[u8; RECORD_SIZE]>`,
        // which has the layout of its contents, so the slots form one
        // contiguous byte buffer of `total` bytes.
        unsafe {
            let base = self.slots.as_ptr().cast::<u8>();
            core::slice::from_raw_parts(base.add(start), end - start)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_for(n: u8) -> [u8; PAYLOAD_LEN] {
        [n, n.wrapping_add(1), n.wrapping_add(2), 0xA0, 0xB0, 0xC0]
    }

    #[test]
    fn five_captures_then_five_drains() {
        let slots = SlotArray::<8>::new();
        let ring = CaptureRing::new(&slots);

        for i in 0..5u32 {
            assert!(ring.capture_edge(100 + i, 0x1000));
        }
        assert_eq!(ring.pending(), 5);
        assert_eq!(ring.completed(), 0);
        assert_eq!(ring.backlog(), 5);

        let mut next = 0u8;
        let drained = ring.drain(|_| {
            next += 1;
            Some(payload_for(next))
        });
        assert_eq!(drained, 5);
        assert_eq!(ring.completed(), 5);
        assert_eq!(ring.pending(), 5);

        let bytes = unsafe { ring.bytes(0..5 * RECORD_SIZE) };
        for (i, chunk) in bytes.chunks_exact(RECORD_SIZE).enumerate() {
            let sample = RawSample::from_bytes(chunk.try_into().unwrap());
            assert_eq!(sample.capture_timestamp, 100 + i as u32);
            assert_eq!(sample.payload, payload_for(i as u8 + 1));
            assert_eq!(sample.source_id, 0x1000);
        }
    }

    #[test]
    fn full_ring_drops_newest_edge() {
        let slots = SlotArray::<4>::new();
        let ring = CaptureRing::new(&slots);

        assert!(ring.capture_edge(1, 1));
        assert!(ring.capture_edge(2, 1));
        assert!(ring.capture_edge(3, 1));
        assert!(!ring.capture_edge(4, 1));
        assert_eq!(ring.overruns(), 1);
        assert_eq!(ring.backlog(), 3);

        ring.drain(|_| Some([0; PAYLOAD_LEN]));
        assert_eq!(ring.latest_completed().map(|s| s.capture_timestamp), Some(3));
    }

    #[test]
    fn timestamps_are_relative_to_epoch() {
        let slots = SlotArray::<4>::new();
        let ring = CaptureRing::new(&slots);
        ring.set_epoch(1_000);
        ring.capture_edge(1_250, 0x0010);
        ring.drain(|_| Some([0; PAYLOAD_LEN]));
        assert_eq!(ring.latest_completed().unwrap().capture_timestamp, 250);
    }

    #[test]
    fn failed_transfer_keeps_stale_payload_and_advances() {
        let slots = SlotArray::<4>::new();
        let ring = CaptureRing::new(&slots);

        ring.capture_edge(0, 7);
        ring.drain(|_| Some([9; PAYLOAD_LEN]));

        // Wrap back around to slot 0 and fail its transfer.
        for t in 1..4 {
            ring.capture_edge(t, 7);
        }
        ring.drain(|_| Some([1; PAYLOAD_LEN]));
        ring.capture_edge(4, 7);
        assert_eq!(ring.drain(|_| None), 1);

        let sample = ring.latest_completed().unwrap();
        assert_eq!(sample.capture_timestamp, 4);
        assert_eq!(sample.payload, [9; PAYLOAD_LEN]);
        assert_eq!(ring.backlog(), 0);
    }

    #[test]
    fn latest_completed_is_none_after_reset() {
        let slots = SlotArray::<4>::new();
        let ring = CaptureRing::new(&slots);
        ring.capture_edge(5, 1);
        ring.drain(|_| Some([0; PAYLOAD_LEN]));
        assert!(ring.latest_completed().is_some());

        ring.reset();
        assert_eq!(ring.latest_completed(), None);
        assert_eq!(ring.pending(), 0);
        assert_eq!(ring.completed(), 0);
        assert_eq!(ring.overruns(), 0);
    }

    #[test]
    fn transfer_sees_source_of_each_slot() {
        let slots = SlotArray::<8>::new();
        let ring = CaptureRing::new(&slots);
        ring.capture_edge(0, 0x1000);
        ring.capture_edge(1, 0x0020);
        ring.capture_edge(2, 0x8000);

        let mut seen = Vec::new();
        ring.drain(|src| {
            seen.push(src);
            Some([0; PAYLOAD_LEN])
        });
        assert_eq!(seen, vec![0x1000, 0x0020, 0x8000]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Edges(u8),
        Drain,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![(1u8..12).prop_map(Op::Edges), Just(Op::Drain)]
    }

    proptest! {
        #[test]
        fn completed_never_passes_pending(ops in proptest::collection::vec(arb_op(), 1..200)) {
            let slots = SlotArray::<8>::new();
            let ring = CaptureRing::new(&slots);

            let mut clock = 0u32;
            let mut accepted = 0u32;
            let mut attempted = 0u32;
            let mut expected = std::collections::VecDeque::new();
            let mut drained = Vec::new();

            for op in ops {
                match op {
                    Op::Edges(n) => {
                        for _ in 0..n {
                            clock += 1;
                            attempted += 1;
                            if ring.capture_edge(clock, 1) {
                                accepted += 1;
                                expected.push_back(clock);
                            }
                        }
                    }
                    Op::Drain => {
                        ring.drain(|_| Some([0; PAYLOAD_LEN]));
                        let sample = ring.latest_completed();
                        while let Some(ts) = expected.pop_front() {
                            drained.push(ts);
                        }
                        if let Some(s) = sample {
                            prop_assert_eq!(Some(&s.capture_timestamp), drained.last());
                        }
                    }
                }

                prop_assert!(ring.backlog() < ring.capacity());
                prop_assert_eq!(ring.backlog(), expected.len());
                prop_assert_eq!(accepted + ring.overruns(), attempted);
                prop_assert_eq!(ring.completed_total() as usize, drained.len());
            }

            // Drained timestamps come out in capture order.
            prop_assert!(drained.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
