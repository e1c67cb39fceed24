//! Phase-2 transfer task.
//!
//! Data-ready ISRs only timestamp edges into the [`CaptureRing`].  The SPI
//! bursts that fill those slots run in a dedicated task, woken after every
//! edge and scheduled above the main loop, so a slow card write inside
//! `StreamLogger::update` never delays a transfer: each edge is read while
//! the chip still holds the sample that raised it.
//!
//! ```text
//!  data-ready ISR ──capture_edge──▶ CaptureRing ◀──drain── transfer task
//!        │                                                     ▲
//!        └──────────────────────── wake ───────────────────────┘
//! ```
//!
//! On ESP-IDF the wake-up is a FreeRTOS task notification (see
//! `drivers::hw_init::spawn_transfer_task`); [`Doorbell`] is the same
//! signal for host threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use log::info;

use crate::capture::CaptureRing;
use crate::sensors::SharedBank;

/// Transfer-task body: wait for a wake-up, then burst-read every captured
/// edge.  Returns the number of samples transferred once `running` clears.
///
/// `wait` should return after a wake-up or a short timeout, so a missed
/// wake-up only delays a transfer.
pub fn run_transfers(
    ring: &CaptureRing<'_>,
    sensors: &SharedBank,
    running: &AtomicBool,
    mut wait: impl FnMut(),
) -> u64 {
    info!("transfer task running");
    let mut total = 0u64;
    while running.load(Ordering::Acquire) {
        wait();
        total += sensors.transfer(ring) as u64;
    }
    info!("transfer task stopped after {total} sample(s)");
    total
}

/// Wake-up flag for the transfer task between host threads.
#[derive(Debug, Default)]
pub struct Doorbell {
    rung: Mutex<bool>,
    bell: Condvar,
}

impl Doorbell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ring(&self) {
        *self.rung.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.bell.notify_one();
    }

    /// Block until rung or until `timeout` passes.  Consumes the ring;
    /// returns whether there was one.
    pub fn wait(&self, timeout: Duration) -> bool {
        let rung = self.rung.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut rung, _) = self
            .bell
            .wait_timeout_while(rung, timeout, |rung| !*rung)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *rung, false)
    }
}
