//! Runtime configuration for a sketch session.

use crate::error::SketchResult;
use crate::measure::MeasurementSettings;
use serde::{Deserialize, Serialize};

/// Snapping behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    pub enabled: bool,
    /// Maximum on-screen distance to a snap target.
    pub pixel_tolerance: f64,
    /// Quiet period before rebuilding interactions after visibility changes.
    pub rebuild_debounce_ms: u64,
    /// Maintain a snap indicator on pointer move.
    pub tracking: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pixel_tolerance: 10.0,
            rebuild_debounce_ms: 250,
            tracking: false,
        }
    }
}

/// Angle guide construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    /// Upper bound on segments scanned per hit feature.
    pub segment_cap: usize,
    /// Point-on-line tolerance in map units.
    pub on_line_epsilon: f64,
    /// Length of each guide line in map units.
    pub guide_length: f64,
    /// Pixel tolerance when hit-testing the anchor.
    pub hit_tolerance_px: f64,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            segment_cap: 500,
            on_line_epsilon: 0.001,
            guide_length: 100_000.0,
            hit_tolerance_px: 5.0,
        }
    }
}

/// Press-and-hold repeat timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeatConfig {
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 400,
            interval_ms: 80,
        }
    }
}

/// Top-level session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    pub snap: SnapConfig,
    pub guides: GuideConfig,
    pub measurement: MeasurementSettings,
    pub rotate_repeat: RepeatConfig,
    /// Click hit-test tolerance in pixels.
    pub hit_tolerance_px: f64,
}

impl SketchConfig {
    /// Serialize to JSON.
    pub fn to_json(&self) -> SketchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> SketchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            snap: SnapConfig::default(),
            guides: GuideConfig::default(),
            measurement: MeasurementSettings::default(),
            rotate_repeat: RepeatConfig::default(),
            hit_tolerance_px: DEFAULT_HIT_TOLERANCE_PX,
        }
    }
}

/// Default click hit-test tolerance.
pub const DEFAULT_HIT_TOLERANCE_PX: f64 = 5.0;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::LengthUnit;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SketchConfig::from_json(r#"{"snap":{"pixel_tolerance":4.0}}"#).unwrap();
        assert!((config.snap.pixel_tolerance - 4.0).abs() < f64::EPSILON);
        assert!(config.snap.enabled);
        assert_eq!(config.snap.rebuild_debounce_ms, 250);
        assert_eq!(config.guides.segment_cap, 500);
        assert!((config.hit_tolerance_px - DEFAULT_HIT_TOLERANCE_PX).abs() < f64::EPSILON);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = SketchConfig::default();
        config.measurement.length_unit = LengthUnit::Kilometers;
        let back = SketchConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_nested_partial_config_keeps_hit_tolerance() {
        #[derive(serde::Deserialize)]
        struct Outer {
            config: SketchConfig,
        }
        let outer: Outer = serde_json::from_str(r#"{"config":{"snap":{"pixel_tolerance":4.0}}}"#).unwrap();
        assert!((outer.config.hit_tolerance_px - DEFAULT_HIT_TOLERANCE_PX).abs() < f64::EPSILON);
        assert!((SketchConfig::default().hit_tolerance_px - DEFAULT_HIT_TOLERANCE_PX).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_json_errors() {
        assert!(SketchConfig::from_json("{not json").is_err());
    }
}
