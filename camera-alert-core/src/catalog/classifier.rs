use crate::models::device::{CaptureDevice, Facing};
use crate::traits::facing_classifier::FacingClassifier;

const REAR_KEYWORDS: &[&str] = &["back", "rear", "environment", "背面", "外側"];
const FRONT_KEYWORDS: &[&str] = &["front", "user", "selfie", "前面"];
const EXTERNAL_KEYWORDS: &[&str] = &["webcam", "usb", "external"];
const INTEGRATED_KEYWORDS: &[&str] = &["integrated", "built-in", "builtin", "internal"];

fn contains_any(label: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| label.contains(k))
}

/// Label-keyword facing heuristic. Rear keywords win over front ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl FacingClassifier for KeywordClassifier {
    fn classify(&self, label: &str) -> Facing {
        let label = label.to_lowercase();
        if contains_any(&label, REAR_KEYWORDS) {
            Facing::Rear
        } else if contains_any(&label, FRONT_KEYWORDS) {
            Facing::Front
        } else {
            Facing::Unknown
        }
    }
}

fn is_external_webcam(device: &CaptureDevice) -> bool {
    let label = device.display_name.to_lowercase();
    contains_any(&label, EXTERNAL_KEYWORDS) && !contains_any(&label, INTEGRATED_KEYWORDS)
}

/// Pick the device a fresh session should use.
///
/// First rear camera, else first external webcam, else the first device.
pub fn default_device(devices: &[CaptureDevice]) -> Option<&CaptureDevice> {
    devices
        .iter()
        .find(|d| d.facing == Facing::Rear)
        .or_else(|| devices.iter().find(|d| is_external_webcam(d)))
        .or_else(|| devices.first())
}
