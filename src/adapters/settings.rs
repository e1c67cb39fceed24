//! Settings-file adapter.
//!
//! Implements [`ConfigPort`] over a JSON document in the storage root.
//! The volume must already be mounted; the adapter only borrows it for
//! the duration of a load or save.
//!
//! Fields missing from the file take their defaults (`#[serde(default)]`
//! on [`SessionConfig`]), so a file written by an older firmware still
//! loads.  A file that does not parse is reported as
//! [`ConfigError::Corrupted`] and left for the caller to overwrite.

use std::io::{Read, Write};

use log::{debug, info};

use crate::app::ports::{ConfigError, ConfigPort, StoragePort};
use crate::config::SessionConfig;
use crate::error::{Error, StorageError};

/// Name of the settings document in the volume root.
pub const SETTINGS_FILE: &str = "settings.json";

pub struct SettingsFile<'s, S: StoragePort> {
    storage: &'s mut S,
}

impl<'s, S: StoragePort> SettingsFile<'s, S> {
    pub fn new(storage: &'s mut S) -> Self {
        Self { storage }
    }
}

fn validate(config: &SessionConfig) -> Result<(), ConfigError> {
    config.validate().map_err(|e| match e {
        Error::Config(msg) => ConfigError::ValidationFailed(msg),
        _ => ConfigError::Corrupted,
    })
}

impl<S: StoragePort> ConfigPort for SettingsFile<'_, S> {
    fn load(&mut self) -> Result<SessionConfig, ConfigError> {
        let mut reader = self.storage.open(SETTINGS_FILE)?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| ConfigError::from(StorageError::from(e)))?;

        let config: SessionConfig = serde_json::from_slice(&bytes).map_err(|e| {
            debug!("{SETTINGS_FILE}: {e}");
            ConfigError::Corrupted
        })?;
        validate(&config)?;

        info!("{SETTINGS_FILE}: loaded ({} bytes)", bytes.len());
        Ok(config)
    }

    fn save(&mut self, config: &SessionConfig) -> Result<(), ConfigError> {
        validate(config)?;
        let bytes = serde_json::to_vec_pretty(config).map_err(|_| ConfigError::Corrupted)?;

        let mut writer = self.storage.create(SETTINGS_FILE)?;
        writer
            .write_all(&bytes)
            .and_then(|()| writer.flush())
            .map_err(|e| ConfigError::from(StorageError::from(e)))?;

        info!("{SETTINGS_FILE}: saved");
        Ok(())
    }
}
