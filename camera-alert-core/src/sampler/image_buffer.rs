use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// Default JPEG quality for uploads.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// One still frame copied out of the live stream.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl ImageBuffer {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode as JPEG for upload. `quality` is clamped to `1..=100`.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut out = Cursor::new(Vec::with_capacity(self.image.as_raw().len() / 8));
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder.encode_image(&self.image)?;
        }
        Ok(out.into_inner())
    }
}
