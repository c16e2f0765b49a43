//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::device::StreamInfo;
use crate::models::error::{AnalysisError, AudioError, PlatformError};
use crate::traits::analysis_transport::{AnalysisTransport, TransportResponse};
use crate::traits::audio_output::AudioOutput;
use crate::traits::camera_platform::{
    CameraPlatform, DeviceChangeCallback, DeviceDescriptor, StreamConstraints, SubscriptionId,
    VideoFrame, VideoStream,
};

/// Counts streams that currently hold the (fake) hardware.
#[derive(Default)]
pub struct LiveCounter {
    live: AtomicUsize,
    max_live: AtomicUsize,
}

impl LiveCounter {
    fn acquire(&self) {
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now, Ordering::SeqCst);
    }

    fn release(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

pub struct MockStream {
    info: StreamInfo,
    frame: Option<VideoFrame>,
    counter: Arc<LiveCounter>,
    live: bool,
}

impl MockStream {
    fn new(info: StreamInfo, frame: Option<VideoFrame>, counter: Arc<LiveCounter>) -> Self {
        counter.acquire();
        Self {
            info,
            frame,
            counter,
            live: true,
        }
    }
}

impl VideoStream for MockStream {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn is_ready(&self) -> bool {
        self.frame.is_some()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.frame.clone()
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.counter.release();
        }
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn solid_frame(width: u32, height: u32) -> VideoFrame {
    VideoFrame {
        width,
        height,
        rgb: vec![128; (width * height * 3) as usize],
    }
}

/// Scriptable camera platform.
pub struct MockPlatform {
    pub devices: Mutex<Result<Vec<DeviceDescriptor>, PlatformError>>,
    pub access: Mutex<Result<(), PlatformError>>,
    /// Errors returned by successive `open_stream` calls; succeeds once empty.
    pub open_failures: Mutex<VecDeque<PlatformError>>,
    pub open_delay: Mutex<Duration>,
    /// Delays for successive `open_stream` calls; `open_delay` once empty.
    pub open_delays: Mutex<VecDeque<Duration>>,
    /// Counts `open_stream` calls still running.
    pub opening: LiveCounter,
    /// Frame delivered by opened streams (`None` = never ready).
    pub frame: Mutex<Option<VideoFrame>>,
    pub granted: Mutex<StreamInfo>,
    pub open_requests: Mutex<Vec<StreamConstraints>>,
    pub access_requests: AtomicUsize,
    pub counter: Arc<LiveCounter>,
    subscribers: Mutex<HashMap<u64, DeviceChangeCallback>>,
    next_subscription: AtomicU64,
}

impl MockPlatform {
    pub fn new(labels: &[(&str, &str)]) -> Arc<Self> {
        let devices = labels
            .iter()
            .map(|(id, label)| DeviceDescriptor {
                id: id.to_string(),
                label: label.to_string(),
            })
            .collect();
        Arc::new(Self {
            devices: Mutex::new(Ok(devices)),
            access: Mutex::new(Ok(())),
            open_failures: Mutex::new(VecDeque::new()),
            open_delay: Mutex::new(Duration::ZERO),
            open_delays: Mutex::new(VecDeque::new()),
            opening: LiveCounter::default(),
            frame: Mutex::new(Some(solid_frame(64, 48))),
            granted: Mutex::new(StreamInfo {
                width: 64,
                height: 48,
                frame_rate: 30.0,
                device_id: "cam-0".into(),
            }),
            open_requests: Mutex::new(Vec::new()),
            access_requests: AtomicUsize::new(0),
            counter: Arc::new(LiveCounter::default()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        })
    }

    pub fn set_devices(&self, labels: &[(&str, &str)]) {
        *self.devices.lock() = Ok(labels
            .iter()
            .map(|(id, label)| DeviceDescriptor {
                id: id.to_string(),
                label: label.to_string(),
            })
            .collect());
    }

    pub fn fail_opens(&self, errors: impl IntoIterator<Item = PlatformError>) {
        self.open_failures.lock().extend(errors);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn open_count(&self) -> usize {
        self.open_requests.lock().len()
    }

    /// Simulate a hot-plug notification.
    pub fn fire_device_change(&self) {
        let callbacks: Vec<DeviceChangeCallback> =
            self.subscribers.lock().values().cloned().collect();
        for callback in callbacks {
            callback();
        }
    }
}

impl CameraPlatform for MockPlatform {
    fn request_access(&self) -> Result<(), PlatformError> {
        self.access_requests.fetch_add(1, Ordering::SeqCst);
        self.access.lock().clone()
    }

    fn enumerate_video_inputs(&self) -> Result<Vec<DeviceDescriptor>, PlatformError> {
        self.devices.lock().clone()
    }

    fn subscribe_device_changes(
        &self,
        callback: DeviceChangeCallback,
    ) -> Result<SubscriptionId, PlatformError> {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().insert(id, callback);
        Ok(SubscriptionId(id))
    }

    fn unsubscribe_device_changes(&self, id: SubscriptionId) {
        self.subscribers.lock().remove(&id.0);
    }

    fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn VideoStream>, PlatformError> {
        self.open_requests.lock().push(constraints.clone());
        self.opening.acquire();
        let delay = self
            .open_delays
            .lock()
            .pop_front()
            .unwrap_or_else(|| *self.open_delay.lock());
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let failure = self.open_failures.lock().pop_front();
        self.opening.release();
        if let Some(err) = failure {
            return Err(err);
        }
        let mut info = self.granted.lock().clone();
        if let Some(id) = constraints.device_id.as_ref() {
            info.device_id = id.value().clone();
        }
        Ok(Box::new(MockStream::new(
            info,
            self.frame.lock().clone(),
            Arc::clone(&self.counter),
        )))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    Load(String),
    Play,
    Volume(f32),
    Stop,
}

/// Audio output that records every call.
#[derive(Clone, Default)]
pub struct MockAudio {
    pub events: Arc<Mutex<Vec<AudioEvent>>>,
    pub fail_load: Arc<Mutex<bool>>,
    pub pending_error: Arc<Mutex<Option<AudioError>>>,
}

impl MockAudio {
    pub fn events(&self) -> Vec<AudioEvent> {
        self.events.lock().clone()
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AudioEvent::Volume(v) => Some(v),
                _ => None,
            })
            .collect()
    }
}

impl AudioOutput for MockAudio {
    fn load(&mut self, uri: &str) -> Result<(), AudioError> {
        self.events.lock().push(AudioEvent::Load(uri.to_string()));
        if *self.fail_load.lock() {
            return Err(AudioError::LoadFailed {
                uri: uri.to_string(),
                reason: "missing file".into(),
            });
        }
        Ok(())
    }

    fn play(&mut self) -> Result<(), AudioError> {
        self.events.lock().push(AudioEvent::Play);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.events.lock().push(AudioEvent::Volume(volume));
    }

    fn stop(&mut self) {
        self.events.lock().push(AudioEvent::Stop);
    }

    fn poll_error(&mut self) -> Option<AudioError> {
        self.pending_error.lock().take()
    }
}

/// Transport that replies with a fixed response, optionally waiting for a
/// release signal first.
pub struct MockTransport {
    response: Mutex<Result<TransportResponse, AnalysisError>>,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    pub submissions: AtomicUsize,
}

impl MockTransport {
    pub fn replying(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Ok(TransportResponse {
                status,
                body: body.to_string(),
            })),
            gate: Mutex::new(None),
            submissions: AtomicUsize::new(0),
        })
    }

    pub fn failing(err: AnalysisError) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Err(err)),
            gate: Mutex::new(None),
            submissions: AtomicUsize::new(0),
        })
    }

    /// Block the next submission until the returned sender fires.
    pub fn hold_next(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.gate.lock() = Some(rx);
        tx
    }
}

impl AnalysisTransport for MockTransport {
    fn submit(&self, _jpeg: Vec<u8>) -> Result<TransportResponse, AnalysisError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().take();
        if let Some(rx) = gate {
            let _ = rx.recv_timeout(Duration::from_secs(5));
        }
        self.response.lock().clone()
    }
}
