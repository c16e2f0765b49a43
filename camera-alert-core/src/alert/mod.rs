pub mod engine;
pub mod fade;

pub use engine::{AlertEngine, AlertListener, AlertSnapshot};
pub use fade::{Fade, FadeKind};
