//! Monotonic microsecond clock.
//!
//! - **`target_os = "espidf"`** — `esp_timer_get_time()` (64-bit µs since
//!   boot), truncated to the 32-bit timestamps the capture ring records.
//! - **host** — `std::time::Instant` relative to the first call.
//!
//! The 32-bit value wraps after ~71 minutes; every consumer compares
//! times with `wrapping_sub`.

/// Microseconds since boot, wrapping at `u32::MAX`.
#[cfg(target_os = "espidf")]
pub fn uptime_us() -> u32 {
    // SAFETY: esp_timer_get_time is a lock-free read of the system timer
    // and is callable from any context, including ISRs.
    (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u32
}

/// Microseconds since the first call, wrapping at `u32::MAX`.
#[cfg(not(target_os = "espidf"))]
pub fn uptime_us() -> u32 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_micros() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_monotonic_over_short_spans() {
        let a = uptime_us();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = uptime_us();
        assert!(b.wrapping_sub(a) >= 2_000);
    }
}
