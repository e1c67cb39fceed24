//! Port traits — the hexagonal boundary between the recorder and the board.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ RecorderService (domain)
//! ```
//!
//! Driven adapters (storage, interrupt gate, settings file, event sinks)
//! implement these traits.  The [`RecorderService`](super::service::RecorderService)
//! consumes them via generics, so the session logic runs unchanged against
//! the SD card on the device and against in-memory doubles on the host.
//! Sensors have their own port, [`SensorPort`](crate::sensors::SensorPort).

use std::io::{Read, Write};

use crate::config::SessionConfig;
use crate::error::StorageError;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ removable volume)
// ───────────────────────────────────────────────────────────────

/// Flat-directory file storage on a mountable volume.
///
/// Every operation other than `mount` fails with
/// [`StorageError::NotMounted`] while the volume is unmounted.
pub trait StoragePort {
    type Writer: Write;
    type Reader: Read;

    fn mount(&mut self) -> Result<(), StorageError>;

    /// Unmount.  Open handles must already have been dropped.
    fn unmount(&mut self);

    fn is_mounted(&self) -> bool;

    /// Names of the files in the volume root.
    fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Create (or truncate) a file for writing.
    fn create(&mut self, name: &str) -> Result<Self::Writer, StorageError>;

    /// Open an existing file for reading.
    fn open(&mut self, name: &str) -> Result<Self::Reader, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Interrupt port (driven adapter: domain → GPIO interrupt controller)
// ───────────────────────────────────────────────────────────────

/// Gate for the data-ready edge interrupts feeding the capture ring.
pub trait InterruptPort {
    fn enable_capture(&mut self);
    fn disable_capture(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`SessionEvent`](super::events::SessionEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::SessionEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ settings file)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the session configuration.
///
/// Implementations MUST validate before returning or persisting a
/// configuration; out-of-range values are rejected with
/// [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    fn load(&mut self) -> Result<SessionConfig, ConfigError>;

    fn save(&mut self, config: &SessionConfig) -> Result<(), ConfigError>;
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No settings file on the volume.
    NotFound,
    /// The settings file did not parse.
    Corrupted,
    /// A field failed range validation.
    ValidationFailed(&'static str),
    /// The volume is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            StorageError::Full => Self::StorageFull,
            _ => Self::IoError,
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "settings not found"),
            Self::Corrupted => write!(f, "settings corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
