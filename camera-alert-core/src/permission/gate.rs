use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::PermissionDenial;
use crate::traits::camera_platform::CameraPlatform;

#[derive(Debug, Default)]
struct GateState {
    granted: bool,
    reason: Option<PermissionDenial>,
}

/// Tracks whether the user has granted camera access.
///
/// A grant, once observed, is remembered until [`PermissionGate::reset`];
/// a denial can always be retried.
pub struct PermissionGate {
    platform: Arc<dyn CameraPlatform>,
    state: Mutex<GateState>,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn CameraPlatform>) -> Self {
        Self {
            platform,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Ask for access. Returns `true` once granted.
    ///
    /// The platform grant is acquired and released immediately; the caller
    /// opens the real stream separately.
    pub fn request_permission(&self) -> bool {
        if self.is_granted() {
            return true;
        }

        // no lock across the platform call, which may block on a prompt
        let outcome = self.platform.request_access();

        let mut state = self.state.lock();
        match outcome {
            Ok(()) => {
                log::info!("Camera access granted");
                state.granted = true;
                state.reason = None;
                true
            }
            Err(err) => {
                let denial = PermissionDenial::from(&err);
                log::warn!("Camera access refused: {err} ({denial})");
                state.granted = false;
                state.reason = Some(denial);
                false
            }
        }
    }

    pub fn is_granted(&self) -> bool {
        self.state.lock().granted
    }

    /// Why the last request failed, if it did.
    pub fn reason(&self) -> Option<PermissionDenial> {
        self.state.lock().reason.clone()
    }

    /// Whether a retry prompt makes sense for the current denial.
    pub fn retry_is_useful(&self) -> bool {
        self.state
            .lock()
            .reason
            .as_ref()
            .map_or(true, PermissionDenial::retry_is_useful)
    }

    /// Forget the previous outcome so the next request asks the platform again.
    pub fn reset(&self) {
        *self.state.lock() = GateState::default();
    }

    /// Record a denial observed outside `request_permission`, e.g. when the
    /// grant was revoked between the check and the stream request.
    pub fn note_denied(&self, denial: PermissionDenial) {
        let mut state = self.state.lock();
        state.granted = false;
        state.reason = Some(denial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error::PlatformError;
    use crate::testing::MockPlatform;
    use std::sync::atomic::Ordering;

    #[test]
    fn grant_is_remembered() {
        let platform = MockPlatform::new(&[("cam-0", "Webcam")]);
        let gate = PermissionGate::new(platform.clone());

        assert!(gate.request_permission());
        assert!(gate.request_permission());
        assert_eq!(platform.access_requests.load(Ordering::SeqCst), 1);
        assert!(gate.reason().is_none());
    }

    #[test]
    fn denial_is_classified_and_retryable() {
        let platform = MockPlatform::new(&[]);
        *platform.access.lock() = Err(PlatformError::NotAllowed("blocked".into()));
        let gate = PermissionGate::new(platform.clone());

        assert!(!gate.request_permission());
        assert_eq!(gate.reason(), Some(PermissionDenial::Denied));
        assert!(gate.retry_is_useful());

        *platform.access.lock() = Ok(());
        assert!(gate.request_permission());
        assert!(gate.reason().is_none());
        assert_eq!(platform.access_requests.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_device_is_not_worth_retrying() {
        let platform = MockPlatform::new(&[]);
        *platform.access.lock() = Err(PlatformError::NotFound("none".into()));
        let gate = PermissionGate::new(platform);

        assert!(!gate.request_permission());
        assert_eq!(gate.reason(), Some(PermissionDenial::NoDevice));
        assert!(!gate.retry_is_useful());
    }

    #[test]
    fn busy_device_maps_to_device_busy() {
        let platform = MockPlatform::new(&[]);
        *platform.access.lock() = Err(PlatformError::NotReadable("in use".into()));
        let gate = PermissionGate::new(platform);

        assert!(!gate.request_permission());
        assert_eq!(gate.reason(), Some(PermissionDenial::DeviceBusy));
    }

    #[test]
    fn reset_asks_again() {
        let platform = MockPlatform::new(&[]);
        let gate = PermissionGate::new(platform.clone());
        assert!(gate.request_permission());

        gate.reset();
        assert!(!gate.is_granted());
        assert!(gate.request_permission());
        assert_eq!(platform.access_requests.load(Ordering::SeqCst), 2);
    }
}
