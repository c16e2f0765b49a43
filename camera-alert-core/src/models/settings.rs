use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::analysis::SleepState;
use super::config::{AlertConfig, CaptureConfiguration, ContinuousConfig};
use super::device::{Facing, Resolution};

/// User settings document.
///
/// Persistence is handled by the embedding application; the core only
/// reads the camera fields as the initial capture configuration and the
/// alarm table as the alert configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub camera_id: Option<String>,
    pub facing_mode: Facing,
    pub resolution: Resolution,
    pub api_base_url: String,
    pub analysis_interval_ms: u64,
    pub alarm: AlarmSettings,
}

/// Alarm section of the settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSettings {
    pub enabled: bool,
    pub volume: f32,
    pub sounds: BTreeMap<SleepState, String>,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 0.8,
            sounds: AlertConfig::default_tracks(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            camera_id: None,
            facing_mode: Facing::Rear,
            resolution: Resolution::HD,
            api_base_url: "http://localhost:8000/api".to_string(),
            analysis_interval_ms: 1000,
            alarm: AlarmSettings::default(),
        }
    }
}

impl Settings {
    /// Initial capture configuration. A blank camera id means "no preference".
    pub fn capture_configuration(&self) -> CaptureConfiguration {
        CaptureConfiguration {
            device_id: self
                .camera_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            facing: self.facing_mode,
            resolution: self.resolution,
        }
    }

    /// Alert configuration with the user's sound table and volume.
    ///
    /// A disabled alarm maps every state to no track.
    pub fn alert_config(&self) -> AlertConfig {
        let tracks = if self.alarm.enabled {
            self.alarm.sounds.clone()
        } else {
            BTreeMap::new()
        };
        AlertConfig {
            tracks,
            target_volume: self.alarm.volume.clamp(0.0, 1.0),
            ..AlertConfig::default()
        }
    }

    pub fn continuous_config(&self) -> ContinuousConfig {
        ContinuousConfig {
            period: Duration::from_millis(self.analysis_interval_ms.max(1)),
            run_for: None,
        }
    }
}
