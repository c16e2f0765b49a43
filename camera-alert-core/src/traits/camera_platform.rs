use std::sync::Arc;

use crate::models::device::{Facing, Resolution, StreamInfo};
use crate::models::error::PlatformError;

/// Invoked by the platform whenever the set of video inputs may have changed.
pub type DeviceChangeCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Handle returned by [`CameraPlatform::subscribe_device_changes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A video input as the platform reports it, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub label: String,
}

/// Strength of a stream constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint<T> {
    /// Fail the request if this cannot be honoured.
    Exact(T),
    /// Honour if possible, otherwise pick the closest match.
    Ideal(T),
}

impl<T> Constraint<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Exact(v) | Self::Ideal(v) => v,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

/// One stream request. `None` fields are unconstrained.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamConstraints {
    pub device_id: Option<Constraint<String>>,
    pub facing: Option<Constraint<Facing>>,
    /// Always a preference, never exact.
    pub resolution: Option<Resolution>,
    /// Always a preference, never exact.
    pub frame_rate: Option<f32>,
}

impl StreamConstraints {
    /// The most permissive request: any video input.
    pub fn any_video() -> Self {
        Self::default()
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }
}

/// A packed RGB8 frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major.
    pub rgb: Vec<u8>,
}

/// A live stream holding the capture hardware.
///
/// Implementations must release the hardware both on [`VideoStream::stop`]
/// and when dropped.
pub trait VideoStream: Send {
    /// Negotiated stream parameters.
    fn info(&self) -> StreamInfo;

    /// Whether at least one frame has been delivered.
    fn is_ready(&self) -> bool;

    /// Most recent frame, if any has arrived.
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Whether the stream still holds the hardware.
    fn is_live(&self) -> bool;

    /// Stop all underlying tracks. Idempotent.
    fn stop(&mut self);
}

/// Device, permission and stream primitives of a capture platform.
///
/// Implemented by:
/// - `V4lCameraPlatform` (Linux, `camera-alert-desktop` with the `v4l` feature)
/// - test doubles in this crate
pub trait CameraPlatform: Send + Sync {
    /// Acquire a minimal capture grant and release it again.
    fn request_access(&self) -> Result<(), PlatformError>;

    /// List video inputs in platform order.
    fn enumerate_video_inputs(&self) -> Result<Vec<DeviceDescriptor>, PlatformError>;

    /// Register for hot-plug notifications.
    fn subscribe_device_changes(
        &self,
        callback: DeviceChangeCallback,
    ) -> Result<SubscriptionId, PlatformError>;

    /// Remove a hot-plug registration. Unknown ids are ignored.
    fn unsubscribe_device_changes(&self, id: SubscriptionId);

    /// Open a stream matching `constraints`. May block until the hardware answers.
    fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn VideoStream>, PlatformError>;
}
