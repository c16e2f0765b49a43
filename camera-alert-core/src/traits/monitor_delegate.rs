use crate::alert::AlertSnapshot;
use crate::models::analysis::AnalysisResult;
use crate::models::device::CaptureDevice;
use crate::models::error::MonitorError;
use crate::models::state::CaptureState;

/// Event delegate for monitor controller notifications.
///
/// Methods are called from whichever thread produced the event (caller,
/// hot-plug watcher, continuous-analysis worker or fade ticker).
/// Implementations should marshal to a UI thread if needed.
pub trait MonitorDelegate: Send + Sync {
    /// Called after the device list or selection changed.
    fn on_devices_changed(&self, devices: &[CaptureDevice], selected: Option<&str>);

    /// Called when the capture session state changes.
    fn on_capture_state_changed(&self, state: &CaptureState);

    /// Called when a new analysis result has been accepted.
    fn on_analysis_result(&self, result: &AnalysisResult);

    /// Called when the alert phase or active state changes.
    fn on_alert_changed(&self, alert: &AlertSnapshot);

    /// Called when an operation fails.
    fn on_error(&self, error: &MonitorError);
}
