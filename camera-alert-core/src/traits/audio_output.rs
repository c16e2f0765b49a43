use crate::models::error::AudioError;

/// Exclusive audio channel driven by the alert engine.
///
/// `load` returns once the track is ready to play; tracks loop until
/// stopped.
pub trait AudioOutput: Send {
    /// Load `uri` for looped playback, replacing any current track.
    fn load(&mut self, uri: &str) -> Result<(), AudioError>;

    /// Start (or resume) playback of the loaded track.
    fn play(&mut self) -> Result<(), AudioError>;

    /// Set output volume in `[0, 1]`.
    fn set_volume(&mut self, volume: f32);

    /// Pause and rewind to the start of the track.
    fn stop(&mut self);

    /// Asynchronous playback error reported since the last poll, if any.
    fn poll_error(&mut self) -> Option<AudioError> {
        None
    }
}
