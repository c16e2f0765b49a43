//! Video4Linux2 camera platform.
//!
//! Devices are the `/dev/videoN` nodes that advertise video capture. Each
//! open stream owns one device handle on a dedicated `v4l-capture` thread
//! that decodes MJPG or YUYV buffers into the latest RGB frame. Hot-plug is
//! detected by polling the node list.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use camera_alert_core::{
    CameraPlatform, DeviceChangeCallback, DeviceDescriptor, FacingClassifier, KeywordClassifier,
    PlatformError, StreamConstraints, StreamInfo, SubscriptionId, VideoFrame, VideoStream,
};

use crate::frame_decode::{decode_frame, PixelFormat};

const DEV_DIR: &str = "/dev";
const BUFFER_COUNT: u32 = 4;
const MAX_READ_FAILURES: u32 = 10;
/// Longest wait for one buffer. Bounds how long `stop` blocks on a stalled
/// camera.
const READ_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const POLL_SLICE: Duration = Duration::from_millis(50);

const ENXIO: i32 = 6;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;

/// Map an ioctl/open failure to the platform error taxonomy.
fn map_io_error(err: &io::Error, path: &str) -> PlatformError {
    let detail = format!("{path}: {err}");
    match (err.kind(), err.raw_os_error()) {
        (io::ErrorKind::PermissionDenied, _) => PlatformError::NotAllowed(detail),
        (io::ErrorKind::NotFound, _) | (_, Some(ENODEV)) | (_, Some(ENXIO)) => {
            PlatformError::NotFound(detail)
        }
        (_, Some(EBUSY)) => PlatformError::NotReadable(detail),
        _ => PlatformError::Other(detail),
    }
}

/// `videoN` node index, if `name` is one.
fn video_index(name: &str) -> Option<u32> {
    name.strip_prefix("video")?.parse().ok()
}

/// `/dev/videoN` nodes ordered by index.
fn video_nodes(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut nodes: Vec<(u32, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let index = video_index(e.file_name().to_str()?)?;
            Some((index, e.path()))
        })
        .collect();
    nodes.sort_by_key(|(index, _)| *index);
    nodes.into_iter().map(|(_, path)| path).collect()
}

#[derive(Default)]
struct Watchers {
    callbacks: Mutex<HashMap<u64, DeviceChangeCallback>>,
    running: AtomicBool,
    /// Bumped for every watcher started; older watchers exit when they see it.
    epoch: AtomicU64,
    /// Watcher threads that have not exited yet.
    threads: AtomicUsize,
}

impl Watchers {
    fn is_current(&self, epoch: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn notify(&self) {
        let callbacks: Vec<DeviceChangeCallback> = self.callbacks.lock().values().cloned().collect();
        for callback in callbacks {
            callback();
        }
    }
}

/// Linux capture platform backed by V4L2.
pub struct V4lCameraPlatform {
    dev_dir: PathBuf,
    classifier: Arc<dyn FacingClassifier>,
    watchers: Arc<Watchers>,
    next_subscription: AtomicU64,
    poll_interval: Duration,
}

impl V4lCameraPlatform {
    pub fn new() -> Self {
        Self {
            dev_dir: PathBuf::from(DEV_DIR),
            classifier: Arc::new(KeywordClassifier),
            watchers: Arc::new(Watchers::default()),
            next_subscription: AtomicU64::new(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(POLL_SLICE);
        self
    }

    #[cfg(test)]
    fn with_dev_dir(mut self, dir: &str) -> Self {
        self.dev_dir = PathBuf::from(dir);
        self
    }

    /// Capture-capable devices. Nodes that cannot be opened are skipped;
    /// if every node was refused, the refusal is reported.
    fn capture_devices(&self) -> Result<Vec<DeviceDescriptor>, PlatformError> {
        let mut devices = Vec::new();
        let mut refused = None;
        for path in video_nodes(&self.dev_dir) {
            let id = path.to_string_lossy().to_string();
            let caps = match Device::with_path(&path).and_then(|dev| dev.query_caps()) {
                Ok(caps) => caps,
                Err(e) => {
                    log::debug!("Skipping {id}: {e}");
                    refused.get_or_insert_with(|| map_io_error(&e, &id));
                    continue;
                }
            };
            if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceDescriptor {
                id,
                label: caps.card,
            });
        }
        match refused {
            Some(err @ PlatformError::NotAllowed(_)) if devices.is_empty() => Err(err),
            _ => Ok(devices),
        }
    }

    fn resolve(&self, constraints: &StreamConstraints) -> Result<DeviceDescriptor, PlatformError> {
        let devices = self.capture_devices()?;
        if devices.is_empty() {
            return Err(PlatformError::NotFound("no video capture devices".into()));
        }

        if let Some(wanted) = &constraints.device_id {
            match devices.iter().find(|d| &d.id == wanted.value()) {
                Some(d) => return Ok(d.clone()),
                None if wanted.is_exact() => {
                    return Err(PlatformError::NotFound(format!(
                        "{} is not connected",
                        wanted.value()
                    )))
                }
                None => {}
            }
        }

        if let Some(wanted) = &constraints.facing {
            let facing = *wanted.value();
            match devices
                .iter()
                .find(|d| self.classifier.classify(&d.label) == facing)
            {
                Some(d) => return Ok(d.clone()),
                None if wanted.is_exact() => {
                    return Err(PlatformError::Overconstrained(format!(
                        "no camera facing {}",
                        facing.facing_mode().unwrap_or("unknown")
                    )))
                }
                None => {}
            }
        }

        Ok(devices[0].clone())
    }

    /// Start the polling thread unless one is running. Called with the
    /// callback table locked.
    fn start_watcher(&self) -> Result<(), PlatformError> {
        if self.watchers.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // a watcher told to stop but still sleeping retires on this bump
        let epoch = self.watchers.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let watchers = Arc::clone(&self.watchers);
        let dev_dir = self.dev_dir.clone();
        let interval = self.poll_interval;
        self.watchers.threads.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("v4l-hotplug".to_string())
            .spawn(move || {
                let mut known = video_nodes(&dev_dir);
                'watch: while watchers.is_current(epoch) {
                    let mut waited = Duration::ZERO;
                    while waited < interval {
                        thread::sleep(POLL_SLICE);
                        waited += POLL_SLICE;
                        if !watchers.is_current(epoch) {
                            break 'watch;
                        }
                    }
                    let current = video_nodes(&dev_dir);
                    if current != known {
                        log::info!("Video nodes changed: {} -> {}", known.len(), current.len());
                        known = current;
                        watchers.notify();
                    }
                }
                watchers.threads.fetch_sub(1, Ordering::SeqCst);
                log::debug!("Hot-plug watcher {epoch} stopped");
            });
        if let Err(e) = spawned {
            self.watchers.threads.fetch_sub(1, Ordering::SeqCst);
            self.watchers.running.store(false, Ordering::SeqCst);
            return Err(PlatformError::Other(format!(
                "failed to start hot-plug watcher: {e}"
            )));
        }
        Ok(())
    }
}

impl Default for V4lCameraPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for V4lCameraPlatform {
    fn drop(&mut self) {
        self.watchers.running.store(false, Ordering::SeqCst);
    }
}

impl CameraPlatform for V4lCameraPlatform {
    fn request_access(&self) -> Result<(), PlatformError> {
        let nodes = video_nodes(&self.dev_dir);
        let first = nodes
            .first()
            .ok_or_else(|| PlatformError::NotFound("no video devices present".into()))?;
        let id = first.to_string_lossy();
        Device::with_path(first)
            .and_then(|dev| dev.query_caps())
            .map(|caps| log::debug!("Camera access granted via {id} ({})", caps.card))
            .map_err(|e| map_io_error(&e, &id))
    }

    fn enumerate_video_inputs(&self) -> Result<Vec<DeviceDescriptor>, PlatformError> {
        self.capture_devices()
    }

    fn subscribe_device_changes(
        &self,
        callback: DeviceChangeCallback,
    ) -> Result<SubscriptionId, PlatformError> {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let mut callbacks = self.watchers.callbacks.lock();
        callbacks.insert(id, callback);
        if let Err(e) = self.start_watcher() {
            callbacks.remove(&id);
            return Err(e);
        }
        Ok(SubscriptionId(id))
    }

    fn unsubscribe_device_changes(&self, id: SubscriptionId) {
        let mut callbacks = self.watchers.callbacks.lock();
        callbacks.remove(&id.0);
        // The watcher may be the caller (a callback dropping the last
        // catalog handle), so it is told to exit rather than joined.
        if callbacks.is_empty() {
            self.watchers.running.store(false, Ordering::SeqCst);
        }
    }

    fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn VideoStream>, PlatformError> {
        let target = self.resolve(constraints)?;
        log::info!("Opening {} ({})", target.id, target.label);

        let shared = Arc::new(StreamShared::new());
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let worker = {
            let shared = Arc::clone(&shared);
            let constraints = constraints.clone();
            let path = target.id.clone();
            thread::Builder::new()
                .name("v4l-capture".to_string())
                .spawn(move || capture_loop(&path, &constraints, &shared, ready_tx))
                .map_err(|e| PlatformError::Other(format!("failed to start capture thread: {e}")))?
        };

        match ready_rx.recv() {
            Ok(Ok(info)) => Ok(Box::new(V4lStream {
                info,
                shared,
                worker: Some(worker),
            })),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(PlatformError::Other(format!(
                    "capture thread for {} exited during setup",
                    target.id
                )))
            }
        }
    }
}

struct StreamShared {
    latest: Mutex<Option<VideoFrame>>,
    running: AtomicBool,
    live: AtomicBool,
}

impl StreamShared {
    fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            running: AtomicBool::new(true),
            live: AtomicBool::new(false),
        }
    }
}

/// Negotiate format and frame rate on an opened device.
fn configure(
    path: &str,
    constraints: &StreamConstraints,
) -> Result<(Device, PixelFormat, StreamInfo), PlatformError> {
    let dev = Device::with_path(path).map_err(|e| map_io_error(&e, path))?;

    let mut negotiated = None;
    for candidate in PixelFormat::PREFERRED {
        let mut fmt = dev.format().map_err(|e| map_io_error(&e, path))?;
        if let Some(res) = constraints.resolution {
            fmt.width = res.width;
            fmt.height = res.height;
        }
        fmt.fourcc = FourCC::new(&candidate.fourcc());
        match dev.set_format(&fmt) {
            Ok(granted) => {
                if let Some(format) = PixelFormat::from_fourcc(&granted.fourcc.repr) {
                    negotiated = Some((format, granted));
                    break;
                }
            }
            Err(e) if e.raw_os_error() == Some(EBUSY) => return Err(map_io_error(&e, path)),
            Err(e) => log::debug!("{path} rejected {candidate:?}: {e}"),
        }
    }
    let (format, granted) = negotiated.ok_or_else(|| {
        PlatformError::Overconstrained(format!("{path} offers neither MJPG nor YUYV"))
    })?;

    if let Some(fps) = constraints.frame_rate {
        if let Err(e) = dev.set_params(&Parameters::with_fps(fps.round().max(1.0) as u32)) {
            log::debug!("{path} kept its frame rate: {e}");
        }
    }
    let frame_rate = dev
        .params()
        .ok()
        .filter(|p| p.interval.numerator > 0)
        .map(|p| p.interval.denominator as f32 / p.interval.numerator as f32)
        .or(constraints.frame_rate)
        .unwrap_or(0.0);

    let info = StreamInfo {
        width: granted.width,
        height: granted.height,
        frame_rate,
        device_id: path.to_string(),
    };
    log::info!(
        "{path}: {}x{} {format:?} @ {frame_rate:.1} fps",
        info.width,
        info.height
    );
    Ok((dev, format, info))
}

fn capture_loop(
    path: &str,
    constraints: &StreamConstraints,
    shared: &StreamShared,
    ready: SyncSender<Result<StreamInfo, PlatformError>>,
) {
    let (dev, format, info) = match configure(path, constraints) {
        Ok(configured) => configured,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let mut stream = match MmapStream::with_buffers(&dev, BufType::VideoCapture, BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(map_io_error(&e, path)));
            return;
        }
    };
    // a camera that stops delivering must not hold `stop` forever
    stream.set_timeout(READ_TIMEOUT);

    shared.live.store(true, Ordering::SeqCst);
    if ready.send(Ok(info.clone())).is_err() {
        shared.live.store(false, Ordering::SeqCst);
        return;
    }

    let mut failures = 0;
    while shared.running.load(Ordering::SeqCst) {
        match stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                let data = if used == 0 { buf } else { &buf[..used] };
                match decode_frame(format, data, info.width, info.height) {
                    Ok(frame) => {
                        failures = 0;
                        *shared.latest.lock() = Some(frame);
                    }
                    Err(e) => log::debug!("{path}: dropped frame: {e}"),
                }
            }
            Err(e) => {
                failures += 1;
                if is_read_timeout(&e) {
                    log::warn!(
                        "{path}: no frame within {} ms ({failures}/{MAX_READ_FAILURES})",
                        READ_TIMEOUT.as_millis()
                    );
                } else {
                    log::warn!("{path}: capture read failed ({failures}/{MAX_READ_FAILURES}): {e}");
                }
                if failures >= MAX_READ_FAILURES {
                    break;
                }
            }
        }
    }
    shared.live.store(false, Ordering::SeqCst);
    log::info!("Released {path}");
}

/// A dequeue that gave up waiting for the camera.
fn is_read_timeout(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::TimedOut
}

/// A live V4L2 stream. Stopping joins the capture thread, so the device
/// handle is closed before `stop` returns. The join waits at most one
/// `READ_TIMEOUT` plus the decode of a frame in flight.
pub struct V4lStream {
    info: StreamInfo,
    shared: Arc<StreamShared>,
    worker: Option<JoinHandle<()>>,
}

impl VideoStream for V4lStream {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn is_ready(&self) -> bool {
        self.shared.latest.lock().is_some()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.shared.latest.lock().clone()
    }

    fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Capture thread for {} panicked", self.info.device_id);
            }
        }
    }
}

impl Drop for V4lStream {
    fn drop(&mut self) {
        self.stop();
    }
}
