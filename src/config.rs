//! Session configuration parameters
//!
//! Everything the user can tune through the settings file on the card:
//! per-channel sensor settings, arming and recording timing, the
//! acceleration trigger, and the recording file naming.  Defaults match the
//! factory settings file, so a missing or unreadable file still yields a
//! usable logger.

use serde::{Deserialize, Serialize};

use crate::capture::record::SourceId;
use crate::error::Error;
use crate::pins;

/// Maximum length of the recording base name (e.g. `"DATA"`).
pub const FILE_BASE_MAX: usize = 16;
/// Maximum length of the recording extension (e.g. `".DAT"`).
pub const FILE_EXT_MAX: usize = 8;

// ---------------------------------------------------------------------------
// Channel identity
// ---------------------------------------------------------------------------

/// One data stream on the board.  The LSM6DSx contributes two channels
/// (accelerometer and gyroscope) sharing a chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelId {
    LsmAccel = 0,
    LsmGyro = 1,
    IisAccel = 2,
    AdxlAccel = 3,
}

impl ChannelId {
    pub const COUNT: usize = 4;
    pub const ALL: [Self; Self::COUNT] = [
        Self::LsmAccel,
        Self::LsmGyro,
        Self::IisAccel,
        Self::AdxlAccel,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Identity stamped into samples captured from this channel's data-ready line.
    pub const fn source_id(self) -> SourceId {
        match self {
            Self::LsmAccel => pins::SOURCE_LSM6DSX_ACCEL,
            Self::LsmGyro => pins::SOURCE_LSM6DSX_GYRO,
            Self::IisAccel => pins::SOURCE_IIS3DWB_ACCEL,
            Self::AdxlAccel => pins::SOURCE_ADXL37X_ACCEL,
        }
    }

    pub fn from_source_id(source_id: SourceId) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.source_id() == source_id)
    }

    /// Accelerometer-class channels take part in trigger evaluation.
    pub const fn is_accel(self) -> bool {
        !matches!(self, Self::LsmGyro)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::LsmAccel => "LSM6DSx accel",
            Self::LsmGyro => "LSM6DSx gyro",
            Self::IisAccel => "IIS3DWB accel",
            Self::AdxlAccel => "ADXL37x accel",
        }
    }

    /// Prefix of the per-channel CSV export file.
    pub const fn csv_prefix(self) -> &'static str {
        match self {
            Self::LsmAccel => "LSM_ac",
            Self::LsmGyro => "LSM_gy",
            Self::IisAccel => "IIS_ac",
            Self::AdxlAccel => "ADX_ac",
        }
    }

    pub const fn csv_header(self) -> &'static str {
        if self.is_accel() {
            "Time (us),Accel_x (g),Accel_y (g),Accel_z (g)"
        } else {
            "Time (us),Rate_x (dps),Rate_y (dps),Rate_z (dps)"
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Per-channel sensor settings.  The ODR / range / LPF values are the
/// user-facing numbers (Hz, g or dps, filter selection); each driver maps
/// them onto its own register encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub enabled: bool,
    /// Output data rate in Hz.
    pub odr_hz: u16,
    /// Full-scale range (g for accelerometers, dps for the gyroscope).
    pub range: u16,
    /// Low-pass filter selection.
    pub lpf: u16,
    /// User DC offsets in mg (accelerometers only).
    pub offset_mg: [i16; 3],
}

impl ChannelSettings {
    const fn new(odr_hz: u16, range: u16, lpf: u16) -> Self {
        Self {
            enabled: true,
            odr_hz,
            range,
            lpf,
            offset_mg: [0; 3],
        }
    }
}

/// Acceleration trigger settings as stored in the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSettings {
    pub enabled: bool,
    /// Check all three axes instead of `axis`.
    pub any_axis: bool,
    /// Axis index (0 = x, 1 = y, 2 = z) when `any_axis` is off.
    pub axis: u8,
    /// Threshold in mg.
    pub level_mg: u16,
    /// `true` fires above the threshold, `false` fires below it.
    pub rising_edge: bool,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            any_axis: false,
            axis: 2,
            level_mg: 500,
            rising_edge: false,
        }
    }
}

/// Outcome of loading the settings file at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOutcome {
    /// The file parsed and validated.
    Loaded,
    /// The file was missing or unusable; defaults are in effect.
    Defaulted,
}

/// Complete session configuration.
///
/// Fields missing from the settings file fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // --- Sensors ---
    pub lsm_accel: ChannelSettings,
    pub lsm_gyro: ChannelSettings,
    pub iis_accel: ChannelSettings,
    pub adxl_accel: ChannelSettings,

    // --- Timing ---
    /// Delay between the arming button press and the Armed state (ms).
    pub delay_before_armed_ms: u32,
    /// Maximum recording length (ms).
    pub recording_length_ms: u32,
    /// Convert the raw recording to per-channel CSV after saving.
    pub data_formatting_enabled: bool,

    // --- Trigger ---
    pub trigger: TriggerSettings,

    // --- Files ---
    pub data_file_base: heapless::String<FILE_BASE_MAX>,
    pub data_file_ext: heapless::String<FILE_EXT_MAX>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lsm_accel: ChannelSettings::new(6660, 32, 2),
            lsm_gyro: ChannelSettings::new(6660, 2000, 3),
            iis_accel: ChannelSettings::new(26667, 16, 4),
            adxl_accel: ChannelSettings::new(5120, 400, 2),

            delay_before_armed_ms: 0,
            recording_length_ms: 5000,
            data_formatting_enabled: true,

            trigger: TriggerSettings::default(),

            data_file_base: fixed("DATA"),
            data_file_ext: fixed(".DAT"),
        }
    }
}

impl SessionConfig {
    /// Settings for one channel.
    pub fn channel(&self, channel: ChannelId) -> &ChannelSettings {
        match channel {
            ChannelId::LsmAccel => &self.lsm_accel,
            ChannelId::LsmGyro => &self.lsm_gyro,
            ChannelId::IisAccel => &self.iis_accel,
            ChannelId::AdxlAccel => &self.adxl_accel,
        }
    }

    pub fn channel_mut(&mut self, channel: ChannelId) -> &mut ChannelSettings {
        match channel {
            ChannelId::LsmAccel => &mut self.lsm_accel,
            ChannelId::LsmGyro => &mut self.lsm_gyro,
            ChannelId::IisAccel => &mut self.iis_accel,
            ChannelId::AdxlAccel => &mut self.adxl_accel,
        }
    }

    /// Range-check the configuration before it is applied.
    pub fn validate(&self) -> Result<(), Error> {
        if self.trigger.axis > 2 {
            return Err(Error::Config("trigger axis must be 0, 1 or 2"));
        }
        if self.recording_length_ms == 0 {
            return Err(Error::Config("recording length must be non-zero"));
        }
        if self.data_file_base.is_empty() {
            return Err(Error::Config("data file base name is empty"));
        }
        if !self.data_file_ext.starts_with('.') {
            return Err(Error::Config("data file extension must start with '.'"));
        }
        Ok(())
    }
}

/// Build a fixed-capacity string from a literal that is known to fit.
fn fixed<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let c = SessionConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.data_file_base.as_str(), "DATA");
        assert_eq!(c.data_file_ext.as_str(), ".DAT");
        assert!(!c.trigger.enabled);
        assert!(c.data_formatting_enabled);
    }

    #[test]
    fn serde_roundtrip() {
        let c = SessionConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let c: SessionConfig =
            serde_json::from_str(r#"{"recording_length_ms": 1234}"#).unwrap();
        assert_eq!(c.recording_length_ms, 1234);
        assert_eq!(c.lsm_accel, SessionConfig::default().lsm_accel);
    }

    #[test]
    fn bad_axis_rejected() {
        let mut c = SessionConfig::default();
        c.trigger.axis = 3;
        assert_eq!(
            c.validate(),
            Err(Error::Config("trigger axis must be 0, 1 or 2"))
        );
    }

    #[test]
    fn zero_recording_length_rejected() {
        let mut c = SessionConfig::default();
        c.recording_length_ms = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn extension_needs_dot() {
        let mut c = SessionConfig::default();
        c.data_file_ext = fixed("DAT");
        assert!(c.validate().is_err());
    }

    #[test]
    fn source_ids_map_back_to_channels() {
        for ch in ChannelId::ALL {
            assert_eq!(ChannelId::from_source_id(ch.source_id()), Some(ch));
        }
        assert_eq!(ChannelId::from_source_id(0x0001), None);
    }

    #[test]
    fn only_gyro_is_not_accel() {
        let accel: Vec<_> = ChannelId::ALL.into_iter().filter(|c| c.is_accel()).collect();
        assert_eq!(
            accel,
            vec![ChannelId::LsmAccel, ChannelId::IisAccel, ChannelId::AdxlAccel]
        );
    }
}
