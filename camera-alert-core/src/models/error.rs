use thiserror::Error;

/// Failures reported by a camera platform backend.
///
/// Named after the failure classes browsers and OS capture stacks report
/// (not-allowed, not-found, not-readable, over-constrained).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("access not allowed: {0}")]
    NotAllowed(String),

    #[error("no matching device: {0}")]
    NotFound(String),

    #[error("device not readable: {0}")]
    NotReadable(String),

    #[error("constraints cannot be satisfied: {0}")]
    Overconstrained(String),

    #[error("{0}")]
    Other(String),
}

/// Why a capture grant was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionDenial {
    #[error("camera access was denied or blocked")]
    Denied,

    #[error("no camera was found")]
    NoDevice,

    #[error("camera is busy or unreadable; close other applications using it")]
    DeviceBusy,

    #[error("camera access failed: {0}")]
    Unknown(String),
}

impl PermissionDenial {
    /// Whether asking again can change the outcome.
    pub fn retry_is_useful(&self) -> bool {
        !matches!(self, Self::NoDevice)
    }
}

impl From<&PlatformError> for PermissionDenial {
    fn from(err: &PlatformError) -> Self {
        match err {
            PlatformError::NotAllowed(_) => Self::Denied,
            PlatformError::NotFound(_) => Self::NoDevice,
            PlatformError::NotReadable(_) => Self::DeviceBusy,
            PlatformError::Overconstrained(msg) | PlatformError::Other(msg) => {
                Self::Unknown(msg.clone())
            }
        }
    }
}

/// Errors from device enumeration, stream acquisition and frame sampling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("device not found")]
    DeviceNotFound,

    #[error("device busy")]
    DeviceBusy,

    #[error("constraints unsatisfiable")]
    ConstraintsUnsatisfiable,

    #[error("device enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("stream has not delivered a frame yet")]
    NotReady,

    #[error("acquisition superseded by a later stop or start")]
    Superseded,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<PlatformError> for CaptureError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotAllowed(_) => Self::PermissionDenied,
            PlatformError::NotFound(_) => Self::DeviceNotFound,
            PlatformError::NotReadable(_) => Self::DeviceBusy,
            PlatformError::Overconstrained(_) => Self::ConstraintsUnsatisfiable,
            PlatformError::Other(msg) => Self::Unknown(msg),
        }
    }
}

impl From<PermissionDenial> for CaptureError {
    fn from(denial: PermissionDenial) -> Self {
        match denial {
            PermissionDenial::Denied => Self::PermissionDenied,
            PermissionDenial::NoDevice => Self::DeviceNotFound,
            PermissionDenial::DeviceBusy => Self::DeviceBusy,
            PermissionDenial::Unknown(msg) => Self::Unknown(msg),
        }
    }
}

/// Errors from submitting a frame to the analysis endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("an analysis request is already in flight")]
    Busy,

    #[error("frame encoding failed: {0}")]
    Encode(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors from the audio output used by the alert engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("failed to load track {uri}: {reason}")]
    LoadFailed { uri: String, reason: String },

    #[error("playback failed: {0}")]
    PlaybackFailed(String),

    #[error("audio output unavailable: {0}")]
    Unavailable(String),
}

/// Any failure surfaced by the monitor controller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("controller has been shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_errors_map_to_capture_taxonomy() {
        assert_eq!(
            CaptureError::from(PlatformError::NotAllowed("x".into())),
            CaptureError::PermissionDenied
        );
        assert_eq!(
            CaptureError::from(PlatformError::NotReadable("x".into())),
            CaptureError::DeviceBusy
        );
        assert_eq!(
            CaptureError::from(PlatformError::Overconstrained("x".into())),
            CaptureError::ConstraintsUnsatisfiable
        );
        assert_eq!(
            CaptureError::from(PlatformError::Other("boom".into())),
            CaptureError::Unknown("boom".into())
        );
    }

    #[test]
    fn denial_reasons_distinguish_retry() {
        let busy = PermissionDenial::from(&PlatformError::NotReadable("in use".into()));
        assert_eq!(busy, PermissionDenial::DeviceBusy);
        assert!(busy.retry_is_useful());

        let missing = PermissionDenial::from(&PlatformError::NotFound("none".into()));
        assert_eq!(missing, PermissionDenial::NoDevice);
        assert!(!missing.retry_is_useful());
    }
}
