use serde::{Deserialize, Serialize};

/// Which way a camera points, as far as it can be told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Facing {
    #[serde(rename = "user", alias = "front")]
    Front,
    #[serde(rename = "environment", alias = "rear", alias = "back")]
    Rear,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Facing {
    /// The facing-mode keyword used by capture platforms (`user` / `environment`).
    pub fn facing_mode(&self) -> Option<&'static str> {
        match self {
            Self::Front => Some("user"),
            Self::Rear => Some("environment"),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A video input reported by the platform, classified by facing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub id: String,
    pub display_name: String,
    pub facing: Facing,
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Conservative size every camera is expected to support.
    pub const VGA: Resolution = Resolution::new(640, 480);
    pub const HD: Resolution = Resolution::new(1280, 720);
    pub const FULL_HD: Resolution = Resolution::new(1920, 1080);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::HD
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What the hardware actually granted for a stream.
///
/// May differ from what was requested; requests are hints.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
    pub device_id: String,
}

impl StreamInfo {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}
