//! JSON reply format of the analysis endpoint.
//!
//! ```json
//! { "state": "SLEEPING", "confidence": 0.92,
//!   "objects": { "person": [x, y, z, w, h, d, roll, pitch, yaw, conf] },
//!   "timestamp": 1718000000.5 }
//! ```
//!
//! Boxes may also be objects with `position`/`dimensions`/`rotation`, and
//! the map may be named `boxes`. Failures come back as
//! `{"status": "error", "error": "..."}`, a bare `{"error": "..."}`, or a
//! `{"detail": "..."}` body with an error status.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::analysis::{AnalysisResult, Box3D, SleepState};
use crate::models::error::AnalysisError;
use crate::traits::analysis_transport::TransportResponse;

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "boxes")]
    objects: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    detail: Option<Value>,
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Best human-readable message in an error body.
fn error_message(body: &str) -> String {
    if let Ok(wire) = serde_json::from_str::<WireResult>(body) {
        if let Some(msg) = wire.error.as_ref().or(wire.detail.as_ref()) {
            return value_text(msg);
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(512).collect()
    }
}

fn parse_box(label: &str, value: Value) -> Option<Box3D> {
    let parsed = match value {
        Value::Array(items) => {
            let values: Option<Vec<f32>> =
                items.iter().map(|v| v.as_f64().map(|f| f as f32)).collect();
            values.and_then(|v| Box3D::from_flat(&v))
        }
        obj @ Value::Object(_) => serde_json::from_value::<Box3D>(obj).ok().map(|mut b| {
            b.confidence = clamp_unit(b.confidence);
            b
        }),
        _ => None,
    };
    if parsed.is_none() {
        log::warn!("Skipping malformed box for {label:?}");
    }
    parsed
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn parse_timestamp(seconds: Option<f64>) -> DateTime<Utc> {
    seconds
        .filter(|s| s.is_finite())
        .and_then(|s| DateTime::from_timestamp_millis((s * 1000.0) as i64))
        .unwrap_or_else(Utc::now)
}

/// Turn a transport reply into a result tagged with `sequence`.
pub fn parse_response(
    response: &TransportResponse,
    sequence: u64,
) -> Result<AnalysisResult, AnalysisError> {
    if !response.is_success() {
        return Err(AnalysisError::Server {
            status: response.status,
            message: error_message(&response.body),
        });
    }

    let wire: WireResult = serde_json::from_str(&response.body)
        .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

    let reported_error = wire.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("error"));
    if reported_error || wire.error.is_some() {
        let message = wire
            .error
            .as_ref()
            .or(wire.detail.as_ref())
            .map(value_text)
            .unwrap_or_else(|| "analysis failed".to_string());
        return Err(AnalysisError::Server {
            status: response.status,
            message,
        });
    }

    let label = wire
        .state
        .ok_or_else(|| AnalysisError::InvalidResponse("missing state".into()))?;

    let objects = wire
        .objects
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(label, value)| parse_box(&label, value).map(|b| (label, b)))
        .collect();

    Ok(AnalysisResult {
        state: SleepState::parse(&label),
        confidence: clamp_unit(wire.confidence.unwrap_or(0.0) as f32),
        objects,
        timestamp: parse_timestamp(wire.timestamp),
        sequence,
    })
}
