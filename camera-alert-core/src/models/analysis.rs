use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete classification returned by the analysis service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum SleepState {
    #[default]
    Unknown,
    Sleeping,
    Struggling,
    Awake,
}

impl SleepState {
    pub const ALL: [SleepState; 4] = [
        SleepState::Unknown,
        SleepState::Sleeping,
        SleepState::Struggling,
        SleepState::Awake,
    ];

    /// Case-insensitive parse of a wire label; unrecognized labels are `Unknown`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "SLEEPING" => Self::Sleeping,
            "STRUGGLING" => Self::Struggling,
            "AWAKE" => Self::Awake,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Sleeping => "SLEEPING",
            Self::Struggling => "STRUGGLING",
            Self::Awake => "AWAKE",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for SleepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Oriented 3D bounding box for one detected object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box3D {
    /// `[x, y, z]`
    pub position: [f32; 3],
    /// `[width, height, depth]`
    pub dimensions: [f32; 3],
    /// `[roll, pitch, yaw]`
    pub rotation: [f32; 3],
    #[serde(default)]
    pub confidence: f32,
}

impl Box3D {
    /// Build from the flat `[x,y,z, w,h,d, roll,pitch,yaw, confidence?]` layout.
    pub fn from_flat(values: &[f32]) -> Option<Self> {
        if values.len() < 9 {
            return None;
        }
        Some(Self {
            position: [values[0], values[1], values[2]],
            dimensions: [values[3], values[4], values[5]],
            rotation: [values[6], values[7], values[8]],
            confidence: values.get(9).copied().unwrap_or(0.0).clamp(0.0, 1.0),
        })
    }
}

/// Immutable snapshot of one analysis round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub state: SleepState,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub objects: BTreeMap<String, Box3D>,
    /// Server-reported time when present, otherwise time of receipt.
    pub timestamp: DateTime<Utc>,
    /// Submission number from the issuing client; strictly increasing.
    pub sequence: u64,
}

impl AnalysisResult {
    /// Whether this result was submitted after `other`.
    pub fn is_newer_than(&self, other: &AnalysisResult) -> bool {
        self.sequence > other.sequence
    }
}
