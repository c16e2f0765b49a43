pub mod analysis_transport;
pub mod audio_output;
pub mod camera_platform;
pub mod facing_classifier;
pub mod monitor_delegate;
