//! Monitor delegate that publishes events as JSON lines.

use std::sync::Arc;

use serde::Serialize;

use camera_alert_core::{
    build_overlay, AlertSnapshot, AnalysisResult, CaptureDevice, CaptureState, MonitorDelegate,
    MonitorError, Overlay,
};

/// Receives `(event, json_payload)` pairs.
pub type EventSink = Box<dyn Fn(&str, String) + Send + Sync>;

/// Forwards controller events to an [`EventSink`], by default the log.
pub struct LogDelegate {
    sink: EventSink,
}

impl LogDelegate {
    pub fn new() -> Arc<Self> {
        Self::with_sink(Box::new(|event: &str, payload: String| {
            log::info!("{event} {payload}");
        }))
    }

    pub fn with_sink(sink: EventSink) -> Arc<Self> {
        Arc::new(Self { sink })
    }

    fn emit<T: Serialize>(&self, event: &str, payload: T) {
        match serde_json::to_string(&payload) {
            Ok(json) => (self.sink)(event, json),
            Err(e) => log::warn!("Failed to serialize {event} payload: {e}"),
        }
    }
}

// -- Event payloads --

#[derive(Serialize)]
struct DeviceInfo<'a> {
    id: &'a str,
    name: &'a str,
    facing: &'static str,
}

#[derive(Serialize)]
struct DevicesPayload<'a> {
    devices: Vec<DeviceInfo<'a>>,
    selected: Option<&'a str>,
}

#[derive(Serialize)]
struct CaptureStatePayload {
    state: &'static str,
    width: Option<u32>,
    height: Option<u32>,
    device_id: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct AnalysisPayload {
    state: String,
    confidence: f32,
    sequence: u64,
    timestamp: String,
    overlay: Overlay,
}

#[derive(Serialize)]
struct AlertPayload {
    phase: &'static str,
    active_state: Option<String>,
    track: Option<String>,
    volume: f32,
    forced: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ErrorPayload {
    message: String,
}

impl MonitorDelegate for LogDelegate {
    fn on_devices_changed(&self, devices: &[CaptureDevice], selected: Option<&str>) {
        self.emit(
            "monitor://devices-changed",
            DevicesPayload {
                devices: devices
                    .iter()
                    .map(|d| DeviceInfo {
                        id: &d.id,
                        name: &d.display_name,
                        facing: d.facing.facing_mode().unwrap_or("unknown"),
                    })
                    .collect(),
                selected,
            },
        );
    }

    fn on_capture_state_changed(&self, state: &CaptureState) {
        let info = state.stream_info();
        self.emit(
            "monitor://capture-state",
            CaptureStatePayload {
                state: state.name(),
                width: info.map(|i| i.width),
                height: info.map(|i| i.height),
                device_id: info.map(|i| i.device_id.clone()),
                error: state.error().map(ToString::to_string),
            },
        );
    }

    fn on_analysis_result(&self, result: &AnalysisResult) {
        self.emit(
            "monitor://analysis-result",
            AnalysisPayload {
                state: result.state.to_string(),
                confidence: result.confidence,
                sequence: result.sequence,
                timestamp: result.timestamp.to_rfc3339(),
                overlay: build_overlay(result),
            },
        );
    }

    fn on_alert_changed(&self, alert: &AlertSnapshot) {
        self.emit(
            "monitor://alert",
            AlertPayload {
                phase: alert.phase.name(),
                active_state: alert.active_state.map(|s| s.to_string()),
                track: alert.track_uri.clone(),
                volume: alert.current_volume,
                forced: alert.forced.map(|s| s.to_string()),
                error: alert.last_error.as_ref().map(ToString::to_string),
            },
        );
    }

    fn on_error(&self, error: &MonitorError) {
        self.emit(
            "monitor://error",
            ErrorPayload {
                message: error.to_string(),
            },
        );
    }
}
