//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements   | Connects to                    |
//! |------------|--------------|--------------------------------|
//! | `storage`  | StoragePort  | SD card FAT volume / memory    |
//! | `settings` | ConfigPort   | `settings.json` on the volume  |
//! | `log_sink` | EventSink    | Serial log output              |
//! | `time`     | —            | ESP32 system timer             |
//!
//! The interrupt gate lives with the GPIO bring-up in
//! [`drivers::hw_init`](crate::drivers::hw_init).

pub mod log_sink;
pub mod settings;
pub mod storage;
pub mod time;
