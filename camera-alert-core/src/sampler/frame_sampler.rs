use image::imageops::{self, FilterType};
use image::RgbImage;

use super::image_buffer::ImageBuffer;
use crate::models::error::CaptureError;
use crate::session::capture::CaptureSession;

/// Copies the latest live frame into a fresh buffer.
///
/// The buffer always has the negotiated stream dimensions; frames delivered
/// at another size are resized.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameSampler;

impl FrameSampler {
    pub fn new() -> Self {
        Self
    }

    pub fn capture(&self, session: &CaptureSession) -> Result<ImageBuffer, CaptureError> {
        let (info, frame) = session.latest_frame()?;
        if frame.width == 0 || frame.height == 0 {
            return Err(CaptureError::NotReady);
        }

        let (frame_width, frame_height) = (frame.width, frame.height);
        let image = RgbImage::from_raw(frame_width, frame_height, frame.rgb).ok_or_else(|| {
            CaptureError::Unknown(format!(
                "frame buffer does not match {frame_width}x{frame_height}"
            ))
        })?;

        let image = if info.width > 0
            && info.height > 0
            && (info.width, info.height) != (frame_width, frame_height)
        {
            log::debug!(
                "Resizing frame {frame_width}x{frame_height} to {}x{}",
                info.width,
                info.height
            );
            imageops::resize(&image, info.width, info.height, FilterType::Triangle)
        } else {
            image
        };

        Ok(ImageBuffer::new(image))
    }
}
