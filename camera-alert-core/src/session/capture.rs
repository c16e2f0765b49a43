use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::{CaptureConfiguration, SessionConfig};
use crate::models::device::StreamInfo;
use crate::models::error::{CaptureError, PermissionDenial};
use crate::models::state::CaptureState;
use crate::permission::PermissionGate;
use crate::traits::camera_platform::{
    CameraPlatform, Constraint, StreamConstraints, VideoFrame, VideoStream,
};

/// Number of constraint sets tried before giving up.
pub const LADDER_STEPS: usize = 4;

/// Receives every capture state transition.
pub type StateListener = Arc<dyn Fn(&CaptureState) + Send + Sync + 'static>;

/// Device or facing preference from `config`, exact or ideal.
fn preference(config: &CaptureConfiguration, exact: bool) -> StreamConstraints {
    let mut constraints = StreamConstraints::default();
    if let Some(id) = config.device_id.clone() {
        constraints.device_id = Some(if exact {
            Constraint::Exact(id)
        } else {
            Constraint::Ideal(id)
        });
    } else if config.facing.is_known() {
        constraints.facing = Some(if exact {
            Constraint::Exact(config.facing)
        } else {
            Constraint::Ideal(config.facing)
        });
    }
    constraints
}

/// The constraint sets tried by [`CaptureSession::start`], strictest first.
///
/// 1. exact device (or facing) at the requested resolution and frame rate
/// 2. the same, with the device/facing only preferred
/// 3. preferred device/facing at the fallback resolution
/// 4. any video input
pub fn fallback_ladder(
    config: &CaptureConfiguration,
    session: &SessionConfig,
) -> [StreamConstraints; LADDER_STEPS] {
    let exact = StreamConstraints {
        resolution: Some(config.resolution),
        frame_rate: Some(session.target_frame_rate),
        ..preference(config, true)
    };
    let preferred = StreamConstraints {
        resolution: Some(config.resolution),
        frame_rate: Some(session.target_frame_rate),
        ..preference(config, false)
    };
    let reduced = StreamConstraints {
        resolution: Some(session.fallback_resolution),
        ..preference(config, false)
    };
    [exact, preferred, reduced, StreamConstraints::any_video()]
}

/// Owns at most one live camera stream.
///
/// `start` releases the previous stream before requesting a new one, so the
/// hardware is never held twice. Acquisition is serialized; `stop` does not
/// wait for a pending acquisition but supersedes it. An attempt that timed
/// out must finish before the next one is made.
pub struct CaptureSession {
    platform: Arc<dyn CameraPlatform>,
    gate: Arc<PermissionGate>,
    config: SessionConfig,
    acquisition: Mutex<()>,
    stream: Mutex<Option<Box<dyn VideoStream>>>,
    state: Mutex<CaptureState>,
    generation: AtomicU64,
    /// Disconnects once a timed-out attempt has finished and released
    /// whatever it opened.
    abandoned: Mutex<Option<mpsc::Receiver<()>>>,
    listener: Mutex<Option<StateListener>>,
}

impl CaptureSession {
    pub fn new(
        platform: Arc<dyn CameraPlatform>,
        gate: Arc<PermissionGate>,
        config: SessionConfig,
    ) -> Self {
        Self {
            platform,
            gate,
            config,
            acquisition: Mutex::new(()),
            stream: Mutex::new(None),
            state: Mutex::new(CaptureState::Idle),
            generation: AtomicU64::new(0),
            abandoned: Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    pub fn set_listener(&self, listener: StateListener) {
        *self.listener.lock() = Some(listener);
    }

    pub fn state(&self) -> CaptureState {
        self.state.lock().clone()
    }

    /// Whether a live stream has delivered at least one frame.
    pub fn is_ready(&self) -> bool {
        self.stream
            .lock()
            .as_ref()
            .is_some_and(|s| s.is_live() && s.is_ready())
    }

    /// Open a stream for `config`, walking the fallback ladder.
    ///
    /// Each step waits at most one acquisition timeout for a previous
    /// timed-out attempt to finish and one for its own stream. If the
    /// previous attempt is still running the ladder ends with the timeout.
    pub fn start(&self, config: &CaptureConfiguration) -> Result<StreamInfo, CaptureError> {
        let _acquiring = self.acquisition.lock();

        config
            .validate()
            .map_err(|msg| CaptureError::Unknown(format!("invalid capture configuration: {msg}")))?;

        let generation = self.release_stream();
        self.transition(CaptureState::Acquiring);

        if !self.gate.request_permission() {
            let err = self
                .gate
                .reason()
                .map(CaptureError::from)
                .unwrap_or(CaptureError::PermissionDenied);
            return Err(self.fail(generation, err));
        }

        let ladder = fallback_ladder(config, &self.config);
        let mut last_error = CaptureError::Unknown("no acquisition attempted".into());

        for (step, constraints) in ladder.iter().enumerate() {
            if self.generation.load(Ordering::SeqCst) != generation {
                return Err(CaptureError::Superseded);
            }
            log::debug!(
                "Acquisition attempt {}/{LADDER_STEPS}: {constraints:?}",
                step + 1
            );

            if let Err(err) = self.settle_abandoned() {
                log::warn!("Previous acquisition still pending, giving up: {err}");
                last_error = err;
                break;
            }

            match self.acquire(constraints) {
                Ok(stream) => return self.install(generation, stream),
                Err(err) => {
                    log::warn!(
                        "Acquisition attempt {}/{LADDER_STEPS} failed: {err}",
                        step + 1
                    );
                    last_error = err;
                }
            }
        }

        if last_error == CaptureError::PermissionDenied {
            self.gate.note_denied(PermissionDenial::Denied);
        }
        log::error!("All {LADDER_STEPS} acquisition attempts failed: {last_error}");
        Err(self.fail(generation, last_error))
    }

    /// Release the stream, if any. Idempotent.
    ///
    /// A `start` still walking the ladder returns `Superseded` and releases
    /// whatever it acquires.
    pub fn stop(&self) {
        let released = {
            let mut slot = self.stream.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            let released = slot.take();
            *self.state.lock() = CaptureState::Idle;
            released
        };
        if let Some(mut stream) = released {
            stream.stop();
            log::info!("Capture stopped");
        }
        self.notify(&CaptureState::Idle);
    }

    /// The most recent frame together with the negotiated stream info.
    pub fn latest_frame(&self) -> Result<(StreamInfo, VideoFrame), CaptureError> {
        let slot = self.stream.lock();
        let stream = slot
            .as_ref()
            .filter(|s| s.is_live())
            .ok_or(CaptureError::NotReady)?;
        let frame = stream.latest_frame().ok_or(CaptureError::NotReady)?;
        Ok((stream.info(), frame))
    }

    /// Stop the current stream and start a new generation.
    fn release_stream(&self) -> u64 {
        let mut slot = self.stream.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(mut old) = slot.take() {
            log::debug!("Releasing previous stream before re-acquiring");
            old.stop();
        }
        generation
    }

    fn install(
        &self,
        generation: u64,
        mut stream: Box<dyn VideoStream>,
    ) -> Result<StreamInfo, CaptureError> {
        let info = {
            let mut slot = self.stream.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                drop(slot);
                stream.stop();
                log::info!("Acquired stream superseded, released");
                return Err(CaptureError::Superseded);
            }
            let info = stream.info();
            *slot = Some(stream);
            *self.state.lock() = CaptureState::Live(info.clone());
            info
        };
        log::info!(
            "Capture live on {} at {}x{} @ {:.1} fps",
            info.device_id,
            info.width,
            info.height,
            info.frame_rate
        );
        self.notify(&CaptureState::Live(info.clone()));
        Ok(info)
    }

    fn fail(&self, generation: u64, err: CaptureError) -> CaptureError {
        let current = {
            let _slot = self.stream.lock();
            self.generation.load(Ordering::SeqCst) == generation
        };
        if current {
            self.transition(CaptureState::Failed(err.clone()));
        }
        err
    }

    /// Wait for a timed-out attempt to finish. Its stream, if any, has been
    /// stopped by then.
    fn settle_abandoned(&self) -> Result<(), CaptureError> {
        let Some(settled) = self.abandoned.lock().take() else {
            return Ok(());
        };
        let timeout = self.config.acquisition_timeout;
        log::debug!("Waiting for the timed-out acquisition to finish");
        match settled.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                *self.abandoned.lock() = Some(settled);
                Err(timed_out(timeout))
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Ok(()),
        }
    }

    /// One bounded attempt. A stream delivered after the deadline is stopped
    /// by the acquiring thread; the attempt stays parked in `abandoned` until
    /// that thread exits.
    fn acquire(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CaptureError> {
        let timeout: Duration = self.config.acquisition_timeout;
        let (tx, rx) = mpsc::sync_channel(1);
        let (settled_tx, settled_rx) = mpsc::channel::<()>();
        let platform = Arc::clone(&self.platform);
        let constraints = constraints.clone();

        thread::Builder::new()
            .name("camera-acquire".into())
            .spawn(move || {
                // dropped last, after any late stream is stopped
                let _settled = settled_tx;
                let result = platform.open_stream(&constraints);
                if let Err(mpsc::SendError(Ok(mut late))) = tx.send(result) {
                    log::warn!("Stream arrived after its attempt timed out, releasing");
                    late.stop();
                }
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn acquisition thread: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(CaptureError::from),
            Err(RecvTimeoutError::Timeout) => {
                // a stream sent after this point is stopped by the sender or
                // dropped with the channel
                drop(rx);
                *self.abandoned.lock() = Some(settled_rx);
                Err(timed_out(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Unknown(
                "acquisition thread exited without a result".into(),
            )),
        }
    }

    fn transition(&self, state: CaptureState) {
        *self.state.lock() = state.clone();
        self.notify(&state);
    }

    fn notify(&self, state: &CaptureState) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener(state);
        }
    }
}

fn timed_out(timeout: Duration) -> CaptureError {
    CaptureError::Unknown(format!(
        "stream acquisition timed out after {} ms",
        timeout.as_millis()
    ))
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.get_mut().take() {
            stream.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::{Facing, Resolution};
    use crate::models::error::PlatformError;
    use crate::testing::MockPlatform;

    fn session(platform: &Arc<MockPlatform>) -> CaptureSession {
        session_with(platform, SessionConfig::default())
    }

    fn session_with(platform: &Arc<MockPlatform>, config: SessionConfig) -> CaptureSession {
        let gate = Arc::new(PermissionGate::new(platform.clone()));
        CaptureSession::new(platform.clone(), gate, config)
    }

    fn rear_config() -> CaptureConfiguration {
        CaptureConfiguration {
            device_id: None,
            facing: Facing::Rear,
            resolution: Resolution::HD,
        }
    }

    #[test]
    fn ladder_relaxes_step_by_step() {
        let config = CaptureConfiguration {
            device_id: Some("cam-1".into()),
            facing: Facing::Rear,
            resolution: Resolution::FULL_HD,
        };
        let ladder = fallback_ladder(&config, &SessionConfig::default());

        assert_eq!(ladder[0].device_id, Some(Constraint::Exact("cam-1".into())));
        assert_eq!(ladder[0].facing, None);
        assert_eq!(ladder[0].resolution, Some(Resolution::FULL_HD));
        assert_eq!(ladder[0].frame_rate, Some(30.0));

        assert_eq!(ladder[1].device_id, Some(Constraint::Ideal("cam-1".into())));
        assert_eq!(ladder[1].resolution, Some(Resolution::FULL_HD));

        assert_eq!(ladder[2].device_id, Some(Constraint::Ideal("cam-1".into())));
        assert_eq!(ladder[2].resolution, Some(Resolution::VGA));

        assert!(ladder[3].is_unconstrained());
    }

    #[test]
    fn ladder_uses_facing_without_device() {
        let ladder = fallback_ladder(&rear_config(), &SessionConfig::default());
        assert_eq!(ladder[0].facing, Some(Constraint::Exact(Facing::Rear)));
        assert_eq!(ladder[1].facing, Some(Constraint::Ideal(Facing::Rear)));
        assert!(ladder[0].device_id.is_none());
    }

    #[test]
    fn first_attempt_success() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        let session = session(&platform);

        let info = session.start(&rear_config()).unwrap();
        assert_eq!(info.width, 64);
        assert!(session.state().is_live());
        assert!(session.is_ready());
        assert_eq!(platform.open_count(), 1);
    }

    #[test]
    fn falls_back_until_any_video() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        platform.fail_opens([
            PlatformError::Overconstrained("facingMode".into()),
            PlatformError::Overconstrained("width".into()),
            PlatformError::Overconstrained("height".into()),
        ]);
        let session = session(&platform);

        assert!(session.start(&rear_config()).is_ok());
        let requests = platform.open_requests.lock();
        assert_eq!(requests.len(), 4);
        assert!(requests[3].is_unconstrained());
    }

    #[test]
    fn four_failures_end_with_last_error() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        platform.fail_opens([
            PlatformError::Overconstrained("a".into()),
            PlatformError::Overconstrained("b".into()),
            PlatformError::NotFound("c".into()),
            PlatformError::NotReadable("d".into()),
            PlatformError::NotReadable("never reached".into()),
        ]);
        let session = session(&platform);

        assert_eq!(session.start(&rear_config()), Err(CaptureError::DeviceBusy));
        assert_eq!(platform.open_count(), 4);
        assert_eq!(session.state(), CaptureState::Failed(CaptureError::DeviceBusy));
        assert_eq!(platform.counter.live(), 0);
    }

    #[test]
    fn repeated_start_holds_one_stream() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        let session = session(&platform);

        for _ in 0..5 {
            session.start(&rear_config()).unwrap();
        }
        assert_eq!(platform.counter.live(), 1);
        assert_eq!(platform.counter.max_live(), 1);

        session.stop();
        assert_eq!(platform.counter.live(), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        let session = session(&platform);
        session.stop();
        session.start(&rear_config()).unwrap();
        session.stop();
        session.stop();
        assert!(session.state().is_idle());
        assert_eq!(platform.counter.live(), 0);
    }

    #[test]
    fn permission_denied_skips_acquisition() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        *platform.access.lock() = Err(PlatformError::NotAllowed("blocked".into()));
        let session = session(&platform);

        assert_eq!(session.start(&rear_config()), Err(CaptureError::PermissionDenied));
        assert_eq!(platform.open_count(), 0);
    }

    #[test]
    fn frame_requires_ready_stream() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        *platform.frame.lock() = None;
        let session = session(&platform);

        assert_eq!(session.latest_frame().unwrap_err(), CaptureError::NotReady);
        session.start(&rear_config()).unwrap();
        assert!(!session.is_ready());
        assert_eq!(session.latest_frame().unwrap_err(), CaptureError::NotReady);
    }

    #[test]
    fn slow_acquisition_times_out_and_late_stream_is_released() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        *platform.open_delay.lock() = Duration::from_millis(150);
        let session = session_with(
            &platform,
            SessionConfig {
                acquisition_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let err = session.start(&rear_config()).unwrap_err();
        assert!(matches!(&err, CaptureError::Unknown(msg) if msg.contains("timed out")));
        // the stalled open is not stacked with new ones
        assert_eq!(platform.open_count(), 1);

        thread::sleep(Duration::from_millis(400));
        assert_eq!(platform.counter.live(), 0);
    }

    #[test]
    fn timed_out_attempt_finishes_before_the_next_one() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        platform
            .open_delays
            .lock()
            .push_back(Duration::from_millis(200));
        let session = session_with(
            &platform,
            SessionConfig {
                acquisition_timeout: Duration::from_millis(120),
                ..Default::default()
            },
        );

        let info = session.start(&rear_config()).unwrap();
        assert_eq!(info.device_id, "cam-0");
        assert_eq!(platform.open_count(), 2);
        assert_eq!(platform.opening.max_live(), 1);
        assert_eq!(platform.counter.max_live(), 1);
        assert_eq!(platform.counter.live(), 1);
        assert!(session.state().is_live());
    }

    #[test]
    fn stop_supersedes_pending_start() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        *platform.open_delay.lock() = Duration::from_millis(150);
        let session = Arc::new(session(&platform));

        let starter = {
            let session = session.clone();
            thread::spawn(move || session.start(&rear_config()))
        };
        thread::sleep(Duration::from_millis(50));
        session.stop();

        assert_eq!(starter.join().unwrap(), Err(CaptureError::Superseded));
        assert!(session.state().is_idle());
        assert_eq!(platform.counter.live(), 0);
    }

    #[test]
    fn listener_sees_transitions() {
        let platform = MockPlatform::new(&[("cam-0", "Back Camera")]);
        let session = session(&platform);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.set_listener(Arc::new(move |state| sink.lock().push(state.name())));

        session.start(&rear_config()).unwrap();
        session.stop();
        assert_eq!(*seen.lock(), vec!["acquiring", "live", "idle"]);
    }
}
