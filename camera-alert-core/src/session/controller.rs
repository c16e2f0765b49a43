use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use super::capture::CaptureSession;
use crate::alert::{AlertEngine, AlertSnapshot};
use crate::analysis::client::AnalysisClient;
use crate::analysis::continuous::{BusyProbe, ContinuousAnalyzer, TickJob};
use crate::catalog::DeviceCatalog;
use crate::models::analysis::{AnalysisResult, SleepState};
use crate::models::config::{AlertConfig, CaptureConfiguration, ContinuousConfig, SessionConfig};
use crate::models::device::{CaptureDevice, Resolution, StreamInfo};
use crate::models::error::{AnalysisError, MonitorError, PermissionDenial};
use crate::models::settings::Settings;
use crate::models::state::CaptureState;
use crate::permission::PermissionGate;
use crate::sampler::image_buffer::DEFAULT_JPEG_QUALITY;
use crate::sampler::FrameSampler;
use crate::traits::analysis_transport::AnalysisTransport;
use crate::traits::audio_output::AudioOutput;
use crate::traits::camera_platform::CameraPlatform;
use crate::traits::monitor_delegate::MonitorDelegate;
use crate::visualizer::{build_overlay, Overlay};

/// Construction-time options for [`MonitorController`].
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub session: SessionConfig,
    pub alert: AlertConfig,
    pub jpeg_quality: u8,
    /// Drive fades from a background thread (default). When off, fades
    /// only move through [`MonitorController::advance_alert`].
    pub fade_ticker: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            alert: AlertConfig::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            fade_ticker: true,
        }
    }
}

/// Everything a UI needs to render the monitor.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    pub devices: Vec<CaptureDevice>,
    pub selected_device: Option<String>,
    pub capture_state: CaptureState,
    pub ready: bool,
    pub permission_granted: bool,
    pub permission_reason: Option<PermissionDenial>,
    pub latest_result: Option<AnalysisResult>,
    pub analysis_busy: bool,
    pub continuous: bool,
    pub dropped_ticks: u64,
    pub alert: AlertSnapshot,
    pub overlay: Option<Overlay>,
}

/// Delegate shared by the component listeners.
#[derive(Default)]
struct DelegateSlot(Mutex<Option<Arc<dyn MonitorDelegate>>>);

impl DelegateSlot {
    fn get(&self) -> Option<Arc<dyn MonitorDelegate>> {
        self.0.lock().clone()
    }

    fn report(&self, error: &MonitorError) {
        if let Some(delegate) = self.get() {
            delegate.on_error(error);
        }
    }
}

struct MonitorInner {
    gate: Arc<PermissionGate>,
    catalog: DeviceCatalog,
    session: Arc<CaptureSession>,
    sampler: FrameSampler,
    client: Arc<AnalysisClient>,
    engine: AlertEngine,
    capture_config: Mutex<CaptureConfiguration>,
    latest: Mutex<Option<AnalysisResult>>,
    delegate: Arc<DelegateSlot>,
    shut_down: AtomicBool,
}

impl MonitorInner {
    fn ensure_running(&self) -> Result<(), MonitorError> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(MonitorError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Capture one frame, submit it and apply the reply.
    fn analyze_once(&self) -> Result<AnalysisResult, MonitorError> {
        self.ensure_running()?;
        let outcome = self
            .sampler
            .capture(&self.session)
            .map_err(MonitorError::from)
            .and_then(|buffer| self.client.analyze(&buffer).map_err(MonitorError::from));

        match outcome {
            Ok(result) => {
                self.accept(&result);
                Ok(result)
            }
            Err(err) => {
                if err != MonitorError::Analysis(AnalysisError::Busy) {
                    self.delegate.report(&err);
                }
                Err(err)
            }
        }
    }

    /// Retain `result` if it is newer than the current one. Returns whether
    /// it was applied.
    fn accept(&self, result: &AnalysisResult) -> bool {
        {
            let mut latest = self.latest.lock();
            if self.shut_down.load(Ordering::SeqCst) {
                log::debug!("Dropping result #{} after shutdown", result.sequence);
                return false;
            }
            if latest.as_ref().is_some_and(|current| !result.is_newer_than(current)) {
                log::debug!("Dropping stale result #{}", result.sequence);
                return false;
            }
            *latest = Some(result.clone());
        }

        self.engine.apply_result(result);
        if let Some(delegate) = self.delegate.get() {
            delegate.on_analysis_result(result);
        }
        true
    }

    fn restart_capture(&self) -> Result<StreamInfo, MonitorError> {
        self.ensure_running()?;
        let config = self.capture_config.lock().clone();
        self.session.start(&config).map_err(|e| {
            let err = MonitorError::from(e);
            self.delegate.report(&err);
            err
        })
    }
}

/// Wires catalog, permission gate, capture session, sampler, analysis
/// client and alert engine into one monitor.
///
/// All methods take `&self` and may be called from any thread.
pub struct MonitorController {
    id: Uuid,
    inner: Arc<MonitorInner>,
    continuous: Mutex<Option<ContinuousAnalyzer>>,
}

impl MonitorController {
    pub fn new(
        platform: Arc<dyn CameraPlatform>,
        transport: Arc<dyn AnalysisTransport>,
        output: Box<dyn AudioOutput>,
        options: MonitorOptions,
    ) -> Result<Self, MonitorError> {
        let gate = Arc::new(PermissionGate::new(Arc::clone(&platform)));
        let catalog = DeviceCatalog::new(Arc::clone(&platform), Arc::clone(&gate));
        let session = Arc::new(CaptureSession::new(
            platform,
            Arc::clone(&gate),
            options.session.clone(),
        ));
        let client = Arc::new(AnalysisClient::with_quality(transport, options.jpeg_quality));
        let engine = if options.fade_ticker {
            AlertEngine::new(options.alert.clone(), output)?
        } else {
            AlertEngine::manual(options.alert.clone(), output)?
        };

        let delegate = Arc::new(DelegateSlot::default());
        {
            let slot = Arc::clone(&delegate);
            catalog.set_listener(Arc::new(move |devices, selected| {
                if let Some(d) = slot.get() {
                    d.on_devices_changed(devices, selected);
                }
            }));
        }
        {
            let slot = Arc::clone(&delegate);
            session.set_listener(Arc::new(move |state| {
                if let Some(d) = slot.get() {
                    d.on_capture_state_changed(state);
                }
            }));
        }
        {
            let slot = Arc::clone(&delegate);
            engine.set_listener(Arc::new(move |alert| {
                if let Some(d) = slot.get() {
                    d.on_alert_changed(alert);
                }
            }));
        }

        let id = Uuid::new_v4();
        log::info!("Monitor {id} created");
        Ok(Self {
            id,
            inner: Arc::new(MonitorInner {
                gate,
                catalog,
                session,
                sampler: FrameSampler::new(),
                client,
                engine,
                capture_config: Mutex::new(CaptureConfiguration::default()),
                latest: Mutex::new(None),
                delegate,
                shut_down: AtomicBool::new(false),
            }),
            continuous: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn set_delegate(&self, delegate: Arc<dyn MonitorDelegate>) {
        *self.inner.delegate.0.lock() = Some(delegate);
    }

    /// Apply settings, enumerate cameras and open the stream.
    ///
    /// A saved camera that is no longer present is replaced by the default
    /// selection.
    pub fn initialize(&self, settings: &Settings) -> Result<StreamInfo, MonitorError> {
        self.inner.ensure_running()?;
        self.inner.engine.reconfigure(settings.alert_config())?;

        let mut config = settings.capture_configuration();
        let refresh = self.inner.catalog.refresh();
        if let Some(err) = refresh.error {
            self.inner.delegate.report(&MonitorError::from(err));
        }

        let saved = config
            .device_id
            .as_deref()
            .map(|id| self.inner.catalog.select(id));
        match saved {
            Some(Ok(_)) => {}
            Some(Err(_)) => {
                log::warn!(
                    "Saved camera {:?} not found, using default selection",
                    config.device_id
                );
                config.device_id = self.inner.catalog.selected().map(|d| d.id);
            }
            None => config.device_id = self.inner.catalog.selected().map(|d| d.id),
        }

        *self.inner.capture_config.lock() = config;
        self.inner.restart_capture()
    }

    /// Switch to the camera with `id` and restart the stream.
    pub fn select_device(&self, id: &str) -> Result<StreamInfo, MonitorError> {
        self.inner.ensure_running()?;
        let device = self.inner.catalog.select(id)?;
        self.inner.capture_config.lock().device_id = Some(device.id);
        self.inner.restart_capture()
    }

    /// Cycle to the next camera. `Ok(None)` when there is nothing to switch to.
    pub fn toggle_camera(&self) -> Result<Option<StreamInfo>, MonitorError> {
        self.inner.ensure_running()?;
        let Some(device) = self.inner.catalog.toggle() else {
            return Ok(None);
        };
        {
            let mut config = self.inner.capture_config.lock();
            config.device_id = Some(device.id);
            config.facing = device.facing;
        }
        self.inner.restart_capture().map(Some)
    }

    pub fn set_resolution(&self, resolution: Resolution) -> Result<StreamInfo, MonitorError> {
        self.inner.ensure_running()?;
        self.inner.capture_config.lock().resolution = resolution;
        self.inner.restart_capture()
    }

    /// Re-enumerate cameras, e.g. after the user granted access.
    pub fn refresh_devices(&self) -> Result<Vec<CaptureDevice>, MonitorError> {
        self.inner.ensure_running()?;
        let refresh = self.inner.catalog.refresh();
        match refresh.error {
            Some(err) => Err(err.into()),
            None => Ok(refresh.devices),
        }
    }

    /// Analyze the current frame now.
    pub fn analyze_now(&self) -> Result<AnalysisResult, MonitorError> {
        self.inner.analyze_once()
    }

    /// Start fixed-interval analysis, replacing any running loop.
    pub fn start_continuous(&self, config: ContinuousConfig) -> Result<(), MonitorError> {
        self.inner.ensure_running()?;
        let mut slot = self.continuous.lock();
        if let Some(mut previous) = slot.take() {
            previous.stop();
        }

        let client = Arc::clone(&self.inner.client);
        let busy: BusyProbe = Arc::new(move || client.is_busy());
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let job: TickJob = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                // failures already went to the delegate
                let _ = inner.analyze_once();
            }
        });

        let analyzer =
            ContinuousAnalyzer::start(&config, busy, job).map_err(MonitorError::Configuration)?;
        *slot = Some(analyzer);
        Ok(())
    }

    pub fn stop_continuous(&self) {
        if let Some(mut analyzer) = self.continuous.lock().take() {
            analyzer.stop();
        }
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
            .lock()
            .as_ref()
            .is_some_and(ContinuousAnalyzer::is_running)
    }

    pub fn force_alert(&self, state: SleepState) -> Result<(), MonitorError> {
        self.inner.ensure_running()?;
        self.inner.engine.force(state);
        Ok(())
    }

    pub fn clear_force(&self) -> Result<(), MonitorError> {
        self.inner.ensure_running()?;
        self.inner.engine.clear_force();
        Ok(())
    }

    pub fn stop_alert(&self) -> Result<(), MonitorError> {
        self.inner.ensure_running()?;
        self.inner.engine.stop();
        Ok(())
    }

    /// Step the alert fade by hand (for monitors built without a fade ticker).
    pub fn advance_alert(&self) {
        self.inner.engine.advance();
    }

    pub fn latest_result(&self) -> Option<AnalysisResult> {
        self.inner.latest.lock().clone()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = &self.inner;
        let latest_result = inner.latest.lock().clone();
        let (continuous, dropped_ticks) = self
            .continuous
            .lock()
            .as_ref()
            .map_or((false, 0), |a| (a.is_running(), a.dropped_ticks()));
        MonitorSnapshot {
            devices: inner.catalog.devices(),
            selected_device: inner.catalog.selected().map(|d| d.id),
            capture_state: inner.session.state(),
            ready: inner.session.is_ready(),
            permission_granted: inner.gate.is_granted(),
            permission_reason: inner.gate.reason(),
            overlay: latest_result.as_ref().map(build_overlay),
            latest_result,
            analysis_busy: inner.client.is_busy(),
            continuous,
            dropped_ticks,
            alert: inner.engine.snapshot(),
        }
    }

    /// Stop analysis, release the camera and silence the alert. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_continuous();
        self.inner.session.stop();
        self.inner.engine.shutdown();
        self.inner.catalog.shutdown();
        log::info!("Monitor {} shut down", self.id);
    }
}

impl Drop for MonitorController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
