use std::collections::BTreeMap;
use std::time::Duration;

use super::analysis::SleepState;
use super::device::{Facing, Resolution};

/// What the caller wants from a capture session.
///
/// If `device_id` is set it takes precedence over `facing`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureConfiguration {
    pub device_id: Option<String>,
    pub facing: Facing,
    pub resolution: Resolution,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(format!("invalid resolution: {}", self.resolution));
        }
        if matches!(self.device_id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err("device id must not be blank".into());
        }
        Ok(())
    }
}

/// Tunables for stream acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Upper bound for one acquisition attempt (default: 5 s).
    pub acquisition_timeout: Duration,

    /// Frame rate asked for on the first attempt (default: 30).
    pub target_frame_rate: f32,

    /// Resolution used once the requested one has been given up (default: 640x480).
    pub fallback_resolution: Resolution,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            acquisition_timeout: Duration::from_secs(5),
            target_frame_rate: 30.0,
            fallback_resolution: Resolution::VGA,
        }
    }
}

/// Audio alert behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    /// Track to loop for each state. `Unknown` never plays.
    pub tracks: BTreeMap<SleepState, String>,

    /// Volume reached at the end of a fade-in (default: 0.8).
    pub target_volume: f32,

    /// Fade-in ramp length (default: 2 s).
    pub fade_in: Duration,

    /// Fade-out ramp length (default: 1 s).
    pub fade_out: Duration,

    /// Interval between volume steps (default: 50 ms).
    pub tick: Duration,

    /// Results below this confidence leave the alert untouched (default: 0.5).
    pub min_confidence: f32,

    /// Scale the target volume by result confidence, clamped to `[0.1, 1.0]`.
    pub scale_volume_by_confidence: bool,
}

impl AlertConfig {
    pub fn default_tracks() -> BTreeMap<SleepState, String> {
        BTreeMap::from([
            (
                SleepState::Sleeping,
                "sounds/sleeping/Moonlight-Bamboo-Forest.mp3".to_string(),
            ),
            (
                SleepState::Struggling,
                "sounds/struggling/Feline Symphony.mp3".to_string(),
            ),
            (
                SleepState::Awake,
                "sounds/awake/Silent Whisper of the Sakura.mp3".to_string(),
            ),
        ])
    }

    /// Track mapped to `state`, if any. `Unknown` and blank entries map to none.
    pub fn track_for(&self, state: SleepState) -> Option<&str> {
        if !state.is_known() {
            return None;
        }
        self.tracks
            .get(&state)
            .map(String::as_str)
            .filter(|uri| !uri.trim().is_empty())
    }

    /// Target volume for a result of the given confidence.
    pub fn volume_for(&self, confidence: f32) -> f32 {
        if self.scale_volume_by_confidence {
            (self.target_volume * confidence).clamp(0.1, 1.0)
        } else {
            self.target_volume.clamp(0.0, 1.0)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.target_volume) {
            return Err(format!("target volume out of range: {}", self.target_volume));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!("min confidence out of range: {}", self.min_confidence));
        }
        if self.tick.is_zero() {
            return Err("fade tick must be positive".into());
        }
        Ok(())
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            tracks: Self::default_tracks(),
            target_volume: 0.8,
            fade_in: Duration::from_secs(2),
            fade_out: Duration::from_secs(1),
            tick: Duration::from_millis(50),
            min_confidence: 0.5,
            scale_volume_by_confidence: false,
        }
    }
}

/// Fixed-interval capture + analyze loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousConfig {
    /// Tick period (default: 1000 ms).
    pub period: Duration,

    /// Stop by itself after this long (None = until stopped).
    pub run_for: Option<Duration>,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(1000),
            run_for: None,
        }
    }
}

impl ContinuousConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.period.is_zero() {
            return Err("continuous period must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_has_no_track() {
        let config = AlertConfig::default();
        assert!(config.track_for(SleepState::Unknown).is_none());
        assert!(config.track_for(SleepState::Sleeping).is_some());
    }

    #[test]
    fn blank_track_is_no_track() {
        let mut config = AlertConfig::default();
        config.tracks.insert(SleepState::Awake, "  ".into());
        assert!(config.track_for(SleepState::Awake).is_none());
    }

    #[test]
    fn confidence_scaling_is_clamped() {
        let mut config = AlertConfig {
            target_volume: 0.5,
            ..Default::default()
        };
        assert_eq!(config.volume_for(0.2), 0.5);

        config.scale_volume_by_confidence = true;
        assert_eq!(config.volume_for(0.1), 0.1);
        assert!((config.volume_for(0.8) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad_volume = AlertConfig {
            target_volume: 1.5,
            ..Default::default()
        };
        assert!(bad_volume.validate().is_err());

        let zero_tick = AlertConfig {
            tick: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero_tick.validate().is_err());

        let blank = CaptureConfiguration {
            device_id: Some(" ".into()),
            ..Default::default()
        };
        assert!(blank.validate().is_err());
    }
}
