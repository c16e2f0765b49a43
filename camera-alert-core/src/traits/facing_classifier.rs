use crate::models::device::Facing;

/// Infers which way a camera points.
///
/// The default implementation parses device labels; a platform that
/// reports facing directly can supply its own.
pub trait FacingClassifier: Send + Sync {
    fn classify(&self, label: &str) -> Facing;
}
