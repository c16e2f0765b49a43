//! Overlay description for the latest analysis result.
//!
//! Coordinates are normalized image coordinates; the drawing backend scales
//! them to its surface.

use serde::Serialize;

use crate::models::analysis::{AnalysisResult, Box3D, SleepState};

/// Camera distance added to `z` before the perspective divide.
const CAMERA_DISTANCE: f32 = 5.0;
const MIN_DEPTH: f32 = 0.01;

pub const PERSON_COLOR: &str = "#00ff00";
pub const OBJECT_COLOR: &str = "#0000ff";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    pub label: String,
    /// Center after projection.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub boxes: Vec<OverlayBox>,
    pub state_label: &'static str,
    pub state_color: &'static str,
    pub confidence_text: String,
}

pub fn state_color(state: SleepState) -> &'static str {
    match state {
        SleepState::Sleeping => "#4CAF50",
        SleepState::Struggling => "#FFC107",
        SleepState::Awake => "#2196F3",
        SleepState::Unknown => "#9E9E9E",
    }
}

fn project(label: &str, b: &Box3D) -> Option<OverlayBox> {
    let depth = b.position[2] + CAMERA_DISTANCE;
    if depth <= MIN_DEPTH {
        return None;
    }
    let scale = 1.0 / depth;
    Some(OverlayBox {
        label: label.to_string(),
        x: b.position[0] * scale,
        y: b.position[1] * scale,
        width: b.dimensions[0] * scale,
        height: b.dimensions[1] * scale,
        color: if label.eq_ignore_ascii_case("person") {
            PERSON_COLOR
        } else {
            OBJECT_COLOR
        },
    })
}

/// Project every detected object and label the state.
///
/// Objects behind the camera are left out.
pub fn build_overlay(result: &AnalysisResult) -> Overlay {
    Overlay {
        boxes: result
            .objects
            .iter()
            .filter_map(|(label, b)| project(label, b))
            .collect(),
        state_label: result.state.as_str(),
        state_color: state_color(result.state),
        confidence_text: format!("Confidence: {:.1}%", result.confidence * 100.0),
    }
}
