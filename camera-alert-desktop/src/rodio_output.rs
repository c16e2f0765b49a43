//! Looped alert playback through rodio.
//!
//! rodio's output stream is not `Send`, so a dedicated `audio-engine`
//! thread owns it and the sink; [`RodioOutput`] talks to it over a channel.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use camera_alert_core::{AudioError, AudioOutput};

type Reply = SyncSender<Result<(), AudioError>>;

enum AudioCommand {
    Load { path: PathBuf, uri: String, reply: Reply },
    Play(Reply),
    SetVolume(f32),
    Stop,
}

/// Resolve a track uri against the sounds directory. Absolute paths are
/// used as-is.
pub fn resolve_track(sounds_dir: &Path, uri: &str) -> PathBuf {
    let path = Path::new(uri);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        sounds_dir.join(path)
    }
}

/// [`AudioOutput`] backed by the default rodio output device.
pub struct RodioOutput {
    tx: Sender<AudioCommand>,
    pending_error: Arc<Mutex<Option<AudioError>>>,
    sounds_dir: PathBuf,
}

impl RodioOutput {
    /// Open the default output device. Track uris are resolved against
    /// `sounds_dir`.
    pub fn new(sounds_dir: impl Into<PathBuf>) -> Result<Self, AudioError> {
        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let (init_tx, init_rx) = mpsc::sync_channel(1);
        let pending_error = Arc::new(Mutex::new(None));
        let thread_errors = Arc::clone(&pending_error);

        thread::Builder::new()
            .name("audio-engine".to_string())
            .spawn(move || run_engine(rx, init_tx, thread_errors))
            .map_err(|e| AudioError::Unavailable(format!("failed to start audio thread: {e}")))?;

        init_rx
            .recv()
            .map_err(|_| AudioError::Unavailable("audio thread exited during startup".into()))??;

        Ok(Self {
            tx,
            pending_error,
            sounds_dir: sounds_dir.into(),
        })
    }

    fn request(&self, command: impl FnOnce(Reply) -> AudioCommand) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.tx
            .send(command(reply_tx))
            .map_err(|_| AudioError::Unavailable("audio thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::Unavailable("audio thread is gone".into()))?
    }
}

impl AudioOutput for RodioOutput {
    fn load(&mut self, uri: &str) -> Result<(), AudioError> {
        let path = resolve_track(&self.sounds_dir, uri);
        let uri = uri.to_string();
        self.request(|reply| AudioCommand::Load { path, uri, reply })
    }

    fn play(&mut self) -> Result<(), AudioError> {
        self.request(AudioCommand::Play)
    }

    fn set_volume(&mut self, volume: f32) {
        if self.tx.send(AudioCommand::SetVolume(volume)).is_err() {
            *self.pending_error.lock() =
                Some(AudioError::Unavailable("audio thread is gone".into()));
        }
    }

    fn stop(&mut self) {
        let _ = self.tx.send(AudioCommand::Stop);
    }

    fn poll_error(&mut self) -> Option<AudioError> {
        self.pending_error.lock().take()
    }
}

/// State owned by the audio thread.
struct Player {
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    track: Option<(PathBuf, String)>,
    volume: f32,
    playing: bool,
}

impl Player {
    fn open_sink(&self, path: &Path, uri: &str) -> Result<Sink, AudioError> {
        let load_failed = |reason: String| AudioError::LoadFailed {
            uri: uri.to_string(),
            reason,
        };
        let file = File::open(path).map_err(|e| load_failed(e.to_string()))?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| load_failed(e.to_string()))?;
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| AudioError::Unavailable(format!("failed to create audio sink: {e}")))?;
        sink.pause();
        sink.set_volume(self.volume);
        sink.append(source.repeat_infinite());
        Ok(sink)
    }

    fn load(&mut self, path: PathBuf, uri: String) -> Result<(), AudioError> {
        if let Some(old) = self.sink.take() {
            old.stop();
        }
        self.playing = false;
        self.track = None;
        let sink = self.open_sink(&path, &uri)?;
        log::info!("Loaded alert track {uri}");
        self.sink = Some(sink);
        self.track = Some((path, uri));
        Ok(())
    }

    fn play(&mut self) -> Result<(), AudioError> {
        if self.sink.is_none() {
            // Stopped tracks restart from the beginning.
            let (path, uri) = self
                .track
                .clone()
                .ok_or_else(|| AudioError::PlaybackFailed("no track loaded".into()))?;
            self.sink = Some(self.open_sink(&path, &uri)?);
        }
        if let Some(sink) = &self.sink {
            sink.play();
            self.playing = true;
        }
        Ok(())
    }

    /// Returns an error when a playing track ran dry, which only happens if
    /// decoding failed mid-stream.
    fn set_volume(&mut self, volume: f32) -> Option<AudioError> {
        self.volume = volume.clamp(0.0, 1.0);
        let sink = self.sink.as_ref()?;
        sink.set_volume(self.volume);
        if self.playing && sink.empty() {
            self.playing = false;
            let uri = self.track.as_ref().map(|(_, uri)| uri.as_str()).unwrap_or("");
            return Some(AudioError::PlaybackFailed(format!("track {uri} stopped unexpectedly")));
        }
        None
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.playing = false;
    }
}

fn run_engine(
    rx: Receiver<AudioCommand>,
    init: SyncSender<Result<(), AudioError>>,
    errors: Arc<Mutex<Option<AudioError>>>,
) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(opened) => opened,
        Err(e) => {
            let _ = init.send(Err(AudioError::Unavailable(format!(
                "failed to create audio output stream: {e}"
            ))));
            return;
        }
    };
    let _ = init.send(Ok(()));

    let mut player = Player {
        handle,
        sink: None,
        track: None,
        volume: 0.0,
        playing: false,
    };
    while let Ok(command) = rx.recv() {
        match command {
            AudioCommand::Load { path, uri, reply } => {
                let _ = reply.send(player.load(path, uri));
            }
            AudioCommand::Play(reply) => {
                let _ = reply.send(player.play());
            }
            AudioCommand::SetVolume(volume) => {
                if let Some(err) = player.set_volume(volume) {
                    log::warn!("{err}");
                    *errors.lock() = Some(err);
                }
            }
            AudioCommand::Stop => player.stop(),
        }
    }
    player.stop();
    log::debug!("Audio engine stopped");
}
