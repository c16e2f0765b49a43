pub mod overlay;

pub use overlay::{build_overlay, Overlay, OverlayBox};
