use super::device::StreamInfo;
use super::error::CaptureError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → acquiring → live
///            ↓
///          failed → acquiring (manual retry)
/// live/failed → idle (stop)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Acquiring,
    Live(StreamInfo),
    Failed(CaptureError),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    pub fn error(&self) -> Option<&CaptureError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn stream_info(&self) -> Option<&StreamInfo> {
        match self {
            Self::Live(info) => Some(info),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Live(_) => "live",
            Self::Failed(_) => "failed",
        }
    }
}

/// Alert engine phase.
///
/// ```text
/// idle → fading_in → holding → fading_out → idle
///            ↑__________________________|   (new state while fading out)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlertPhase {
    #[default]
    Idle,
    FadingIn,
    Holding,
    FadingOut,
}

impl AlertPhase {
    /// Whether a track is loaded and (potentially) audible.
    pub fn is_sounding(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FadingIn => "fading_in",
            Self::Holding => "holding",
            Self::FadingOut => "fading_out",
        }
    }
}
