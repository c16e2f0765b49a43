use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::classifier::{default_device, KeywordClassifier};
use crate::models::device::CaptureDevice;
use crate::models::error::CaptureError;
use crate::permission::PermissionGate;
use crate::traits::camera_platform::{CameraPlatform, DeviceChangeCallback, SubscriptionId};
use crate::traits::facing_classifier::FacingClassifier;

/// Receives the device list and selected id after every refresh or
/// selection change.
pub type DeviceListener = Arc<dyn Fn(&[CaptureDevice], Option<&str>) + Send + Sync + 'static>;

/// Outcome of [`DeviceCatalog::refresh`].
///
/// On failure `devices` is the last known list, unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRefresh {
    pub devices: Vec<CaptureDevice>,
    pub error: Option<CaptureError>,
}

#[derive(Default)]
struct CatalogState {
    devices: Vec<CaptureDevice>,
    selected: Option<String>,
    last_error: Option<CaptureError>,
}

impl CatalogState {
    fn selected_device(&self) -> Option<&CaptureDevice> {
        let id = self.selected.as_deref()?;
        self.devices.iter().find(|d| d.id == id)
    }
}

struct CatalogInner {
    platform: Arc<dyn CameraPlatform>,
    gate: Arc<PermissionGate>,
    classifier: Box<dyn FacingClassifier>,
    state: Mutex<CatalogState>,
    // serializes refreshes from callers and hot-plug notifications
    refresh_lock: Mutex<()>,
    subscription: Mutex<Option<SubscriptionId>>,
    listener: Mutex<Option<DeviceListener>>,
    shut_down: AtomicBool,
}

/// Enumerates capture devices and tracks the current selection.
///
/// Cheap to clone; clones share the same list and subscription.
#[derive(Clone)]
pub struct DeviceCatalog {
    inner: Arc<CatalogInner>,
}

impl DeviceCatalog {
    pub fn new(platform: Arc<dyn CameraPlatform>, gate: Arc<PermissionGate>) -> Self {
        Self::with_classifier(platform, gate, Box::new(KeywordClassifier))
    }

    pub fn with_classifier(
        platform: Arc<dyn CameraPlatform>,
        gate: Arc<PermissionGate>,
        classifier: Box<dyn FacingClassifier>,
    ) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                platform,
                gate,
                classifier,
                state: Mutex::new(CatalogState::default()),
                refresh_lock: Mutex::new(()),
                subscription: Mutex::new(None),
                listener: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Install the change listener, replacing any previous one.
    pub fn set_listener(&self, listener: DeviceListener) {
        *self.inner.listener.lock() = Some(listener);
    }

    /// Re-enumerate video inputs.
    ///
    /// Never fails hard: errors come back in [`DeviceRefresh::error`] along
    /// with the previous list.
    pub fn refresh(&self) -> DeviceRefresh {
        self.inner.refresh()
    }

    pub fn devices(&self) -> Vec<CaptureDevice> {
        self.inner.state.lock().devices.clone()
    }

    pub fn selected(&self) -> Option<CaptureDevice> {
        self.inner.state.lock().selected_device().cloned()
    }

    pub fn last_error(&self) -> Option<CaptureError> {
        self.inner.state.lock().last_error.clone()
    }

    /// Select a device by id.
    pub fn select(&self, id: &str) -> Result<CaptureDevice, CaptureError> {
        let device = {
            let mut state = self.inner.state.lock();
            let device = state
                .devices
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .ok_or(CaptureError::DeviceNotFound)?;
            state.selected = Some(device.id.clone());
            device
        };
        log::info!("Selected camera {} ({})", device.display_name, device.id);
        self.inner.notify();
        Ok(device)
    }

    /// Cycle the selection to the next device in platform order.
    ///
    /// Returns `None` when fewer than two devices are present.
    pub fn toggle(&self) -> Option<CaptureDevice> {
        let device = {
            let mut state = self.inner.state.lock();
            if state.devices.len() < 2 {
                return None;
            }
            let current = state
                .selected
                .as_deref()
                .and_then(|id| state.devices.iter().position(|d| d.id == id));
            let next = current.map_or(0, |i| (i + 1) % state.devices.len());
            let device = state.devices[next].clone();
            state.selected = Some(device.id.clone());
            device
        };
        log::info!("Switched camera to {} ({})", device.display_name, device.id);
        self.inner.notify();
        Some(device)
    }

    /// Remove the hot-plug subscription. Later notifications are ignored.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.unsubscribe();
    }
}

impl CatalogInner {
    fn refresh(self: &Arc<Self>) -> DeviceRefresh {
        if self.shut_down.load(Ordering::SeqCst) {
            return self.failed(CaptureError::Unknown("device catalog shut down".into()));
        }
        let _guard = self.refresh_lock.lock();

        self.ensure_subscribed();

        if !self.gate.request_permission() {
            let err = self
                .gate
                .reason()
                .map(CaptureError::from)
                .unwrap_or(CaptureError::PermissionDenied);
            return self.failed(err);
        }

        let descriptors = match self.platform.enumerate_video_inputs() {
            Ok(descriptors) => descriptors,
            Err(err) => return self.failed(CaptureError::EnumerationFailed(err.to_string())),
        };

        let devices: Vec<CaptureDevice> = descriptors
            .into_iter()
            .map(|d| CaptureDevice {
                facing: self.classifier.classify(&d.label),
                display_name: d.label,
                id: d.id,
            })
            .collect();

        {
            let mut state = self.state.lock();
            let still_present = state
                .selected
                .as_deref()
                .is_some_and(|id| devices.iter().any(|d| d.id == id));
            if !still_present {
                state.selected = default_device(&devices).map(|d| d.id.clone());
            }
            state.devices = devices.clone();
            state.last_error = None;
            log::debug!(
                "Enumerated {} camera(s), selected {:?}",
                state.devices.len(),
                state.selected
            );
        }

        self.notify();
        DeviceRefresh {
            devices,
            error: None,
        }
    }

    fn failed(&self, err: CaptureError) -> DeviceRefresh {
        log::warn!("Device refresh failed: {err}");
        let mut state = self.state.lock();
        state.last_error = Some(err.clone());
        DeviceRefresh {
            devices: state.devices.clone(),
            error: Some(err),
        }
    }

    fn ensure_subscribed(self: &Arc<Self>) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return;
        }
        let weak: Weak<CatalogInner> = Arc::downgrade(self);
        let callback: DeviceChangeCallback = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                if !inner.shut_down.load(Ordering::SeqCst) {
                    log::debug!("Video inputs changed, refreshing");
                    inner.refresh();
                }
            }
        });
        match self.platform.subscribe_device_changes(callback) {
            Ok(id) => *subscription = Some(id),
            Err(err) => log::warn!("Hot-plug notifications unavailable: {err}"),
        }
    }

    fn unsubscribe(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.platform.unsubscribe_device_changes(id);
        }
    }

    fn notify(&self) {
        let listener = self.listener.lock().clone();
        let Some(listener) = listener else {
            return;
        };
        let (devices, selected) = {
            let state = self.state.lock();
            (state.devices.clone(), state.selected.clone())
        };
        listener(&devices, selected.as_deref());
    }
}

impl Drop for CatalogInner {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
