//! # camera-alert-desktop
//!
//! Desktop backends for camera-alert.
//!
//! Provides:
//! - `V4lCameraPlatform`: V4L2 capture with hot-plug polling (Linux, `v4l` feature)
//! - `RodioOutput`: looped alert playback on the default output device (`rodio` feature)
//! - `settings_store`: JSON settings file in the user config directory
//! - `LogDelegate`: controller events as JSON log lines
//! - `console`: line commands for the interactive binary
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use camera_alert_core::{HttpTransport, MonitorController, MonitorOptions};
//! use camera_alert_desktop::{settings_store, LogDelegate, RodioOutput, V4lCameraPlatform};
//!
//! let settings = settings_store::load_settings(&settings_store::default_settings_path())?;
//! let monitor = MonitorController::new(
//!     Arc::new(V4lCameraPlatform::new()),
//!     Arc::new(HttpTransport::from_settings(&settings)?),
//!     Box::new(RodioOutput::new(".")?),
//!     MonitorOptions::default(),
//! )?;
//! monitor.set_delegate(LogDelegate::new());
//! monitor.initialize(&settings)?;
//! ```

pub mod console;
pub mod frame_decode;
pub mod log_delegate;
pub mod settings_store;

#[cfg(all(target_os = "linux", feature = "v4l"))]
pub mod v4l_platform;

#[cfg(feature = "rodio")]
pub mod rodio_output;

pub use frame_decode::DecodeError;
pub use log_delegate::LogDelegate;
pub use settings_store::SettingsError;

#[cfg(all(target_os = "linux", feature = "v4l"))]
pub use v4l_platform::V4lCameraPlatform;

#[cfg(feature = "rodio")]
pub use rodio_output::RodioOutput;
