//! ISR-timestamped push-button with main-loop debounce.
//!
//! ## Hardware
//!
//! Active-high momentary switch with external pull-down.  The GPIO fires
//! on the rising edge; the ISR only records the edge time into a
//! [`ButtonLatch`], and [`ButtonDriver::tick`] (called once per main-loop
//! iteration) turns new edges into single presses, ignoring anything that
//! arrives within the lockout window of the last accepted press.

use core::sync::atomic::{AtomicU32, Ordering};

/// Minimum spacing between accepted presses.
pub const DEBOUNCE_US: u32 = 500_000;

/// Edge latch shared between the button ISR and the main loop.
pub struct ButtonLatch {
    /// Time of the most recent edge (µs since boot).
    stamp_us: AtomicU32,
    /// Number of edges seen; lets the main loop spot new ones even when
    /// the timestamp wraps or repeats.
    edges: AtomicU32,
}

impl Default for ButtonLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonLatch {
    pub const fn new() -> Self {
        Self {
            stamp_us: AtomicU32::new(0),
            edges: AtomicU32::new(0),
        }
    }

    /// ISR handler body.  Lock-free.
    pub fn record_edge(&self, now_us: u32) {
        self.stamp_us.store(now_us, Ordering::Relaxed);
        self.edges.fetch_add(1, Ordering::Release);
    }

    fn snapshot(&self) -> (u32, u32) {
        let edges = self.edges.load(Ordering::Acquire);
        (edges, self.stamp_us.load(Ordering::Relaxed))
    }
}

pub struct ButtonDriver<'a> {
    latch: &'a ButtonLatch,
    seen_edges: u32,
    last_press_us: Option<u32>,
}

impl<'a> ButtonDriver<'a> {
    pub fn new(latch: &'a ButtonLatch) -> Self {
        Self {
            latch,
            seen_edges: latch.snapshot().0,
            last_press_us: None,
        }
    }

    /// Returns `true` once per accepted press.
    pub fn tick(&mut self) -> bool {
        let (edges, stamp_us) = self.latch.snapshot();
        if edges == self.seen_edges {
            return false;
        }
        self.seen_edges = edges;

        let locked_out = self
            .last_press_us
            .is_some_and(|last| stamp_us.wrapping_sub(last) <= DEBOUNCE_US);
        if locked_out {
            return false;
        }

        self.last_press_us = Some(stamp_us);
        true
    }
}
