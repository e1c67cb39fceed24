//! Acceleration threshold trigger evaluated while Armed.

use crate::config::{ChannelId, TriggerSettings};

use super::record::RawSample;

/// Trigger parameters in physical units, derived from [`TriggerSettings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerConfig {
    pub enabled: bool,
    /// `true` fires when an axis magnitude exceeds the threshold, `false`
    /// when it falls below it.
    pub rising_edge: bool,
    /// Axes taken into account.
    pub axes: [bool; 3],
    pub threshold_g: f32,
}

impl TriggerConfig {
    pub fn from_config(settings: &TriggerSettings) -> Self {
        let axes = if settings.any_axis {
            [true; 3]
        } else {
            let mut axes = [false; 3];
            if let Some(a) = axes.get_mut(usize::from(settings.axis)) {
                *a = true;
            }
            axes
        };
        Self {
            enabled: settings.enabled,
            rising_edge: settings.rising_edge,
            axes,
            threshold_g: f32::from(settings.level_mg) * 0.001,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::from_config(&TriggerSettings::default())
    }
}

pub struct TriggerEvaluator;

impl TriggerEvaluator {
    /// Decide whether `sample`, already converted to g, fires the trigger.
    ///
    /// Only accelerometer-class sources can fire; the gyroscope and unknown
    /// sources never do.  Whether the trigger is enabled at all is the
    /// caller's concern.
    pub fn evaluate(sample: &RawSample, accel_g: [f32; 3], config: &TriggerConfig) -> bool {
        let is_accel = ChannelId::from_source_id(sample.source_id).is_some_and(ChannelId::is_accel);
        if !is_accel {
            return false;
        }

        accel_g
            .iter()
            .zip(config.axes)
            .filter(|&(_, selected)| selected)
            .any(|(&value, _)| {
                let magnitude = value.abs();
                if config.rising_edge {
                    magnitude > config.threshold_g
                } else {
                    magnitude < config.threshold_g
                }
            })
    }
}
