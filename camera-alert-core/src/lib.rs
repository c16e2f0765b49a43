//! # camera-alert-core
//!
//! Platform-agnostic core of the camera sleep monitor.
//!
//! Picks a camera, keeps one live stream open with constraint fallback,
//! samples frames for a remote analysis service and fades looped alert
//! audio in and out according to the returned state. Platform backends
//! (V4L2 capture, rodio playback) implement the traits in [`traits`] and
//! plug into [`MonitorController`].
//!
//! ## Architecture
//!
//! ```text
//! camera-alert-core (this crate)
//! ├── traits/       ← CameraPlatform, AudioOutput, AnalysisTransport, MonitorDelegate
//! ├── models/       ← errors, states, configuration, settings, analysis results
//! ├── permission/   ← PermissionGate
//! ├── catalog/      ← DeviceCatalog, facing heuristics
//! ├── session/      ← CaptureSession (fallback ladder), MonitorController
//! ├── sampler/      ← FrameSampler, ImageBuffer (JPEG encoding)
//! ├── analysis/     ← AnalysisClient, HTTP transport, continuous mode
//! ├── alert/        ← AlertEngine, fades
//! └── visualizer/   ← overlay description
//! ```

pub mod alert;
pub mod analysis;
pub mod catalog;
pub mod models;
pub mod permission;
pub mod sampler;
pub mod session;
pub mod traits;
pub mod visualizer;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use alert::{AlertEngine, AlertSnapshot};
pub use analysis::{AnalysisClient, ContinuousAnalyzer, HttpTransport, HttpTransportConfig};
pub use catalog::{DeviceCatalog, DeviceRefresh, KeywordClassifier};
pub use models::analysis::{AnalysisResult, Box3D, SleepState};
pub use models::config::{AlertConfig, CaptureConfiguration, ContinuousConfig, SessionConfig};
pub use models::device::{CaptureDevice, Facing, Resolution, StreamInfo};
pub use models::error::{
    AnalysisError, AudioError, CaptureError, MonitorError, PermissionDenial, PlatformError,
};
pub use models::settings::{AlarmSettings, Settings};
pub use models::state::{AlertPhase, CaptureState};
pub use permission::PermissionGate;
pub use sampler::{FrameSampler, ImageBuffer};
pub use session::capture::CaptureSession;
pub use session::controller::{MonitorController, MonitorOptions, MonitorSnapshot};
pub use traits::analysis_transport::{AnalysisTransport, TransportResponse};
pub use traits::audio_output::AudioOutput;
pub use traits::camera_platform::{
    CameraPlatform, Constraint, DeviceChangeCallback, DeviceDescriptor, StreamConstraints,
    SubscriptionId, VideoFrame, VideoStream,
};
pub use traits::facing_classifier::FacingClassifier;
pub use traits::monitor_delegate::MonitorDelegate;
pub use visualizer::{build_overlay, Overlay, OverlayBox};
