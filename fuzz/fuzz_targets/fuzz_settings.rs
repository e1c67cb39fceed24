//! Fuzz target: settings file loading
//!
//! Any byte sequence on the card must load as a valid configuration or
//! fail with a typed error, and whatever loads must save back cleanly.
//!
//! cargo fuzz run fuzz_settings

#![no_main]

use impack::adapters::settings::{SETTINGS_FILE, SettingsFile};
use impack::adapters::storage::MemStorage;
use impack::app::ports::{ConfigPort, StoragePort};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut storage = MemStorage::new();
    if storage.mount().is_err() {
        return;
    }
    storage.put(SETTINGS_FILE, data.to_vec());

    let Ok(config) = SettingsFile::new(&mut storage).load() else {
        return;
    };
    assert!(config.validate().is_ok());

    SettingsFile::new(&mut storage).save(&config).expect("valid config must save");
    assert_eq!(SettingsFile::new(&mut storage).load().ok(), Some(config));
});
