//! Core-pinned task spawning for the ESP32-S3.
//!
//! ESP-IDF implements `std::thread` over pthreads, which are FreeRTOS
//! tasks underneath.  `esp_pthread_set_cfg()` sets thread-local
//! configuration for the *next* `pthread_create()` from the calling
//! thread, so the config and spawn must not be interleaved with other
//! thread creation on the same thread.
//!
//! The recorder uses this for the phase-2 transfer task, which needs a
//! priority above the main loop so card writes cannot hold up SPI bursts.

use std::io;
use std::thread::JoinHandle;

use log::info;

/// CPU core of the ESP32-S3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// PRO_CPU: the main loop and the IDF system tasks.
    Pro = 0,
    /// APP_CPU: the transfer task.
    App = 1,
}

/// Spawn a thread pinned to `core` with explicit priority and stack.
/// `name` must be NUL-terminated (e.g. `"transfer\0"`).
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    use esp_idf_svc::sys::{ESP_OK, esp_create_default_pthread_config, esp_pthread_set_cfg};

    // SAFETY: the config is copied by esp_pthread_set_cfg; `name` is a
    // 'static NUL-terminated string.
    let ret = unsafe {
        let mut cfg = esp_create_default_pthread_config();
        cfg.pin_to_core = core as _;
        cfg.prio = priority as _;
        cfg.stack_size = (stack_kb * 1024) as _;
        cfg.thread_name = name.as_ptr().cast();
        esp_pthread_set_cfg(&cfg)
    };
    if ret != ESP_OK as i32 {
        return Err(io::Error::other(format!("esp_pthread_set_cfg failed (rc={ret})")));
    }

    let display_name = name.trim_end_matches('\0');
    info!("spawning '{display_name}' on {core:?} (pri={priority}, stack={stack_kb}KB)");

    std::thread::Builder::new().name(display_name.into()).spawn(f)
}

/// Host fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    _core: Core,
    _priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    let display_name = name.trim_end_matches('\0');
    info!("spawning '{display_name}' (sim, no core pinning, stack={stack_kb}KB)");

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
}
