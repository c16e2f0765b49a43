//! Pixel format conversion for raw capture buffers.

use camera_alert_core::VideoFrame;
use thiserror::Error;

/// Why a captured buffer could not become a frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("short YUYV buffer: {len} bytes for {width}x{height}")]
    ShortBuffer { len: usize, width: u32, height: u32 },
    #[error("MJPG decode failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Packed formats the capture backend negotiates, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mjpeg,
    Yuyv,
}

impl PixelFormat {
    pub const PREFERRED: [PixelFormat; 2] = [PixelFormat::Mjpeg, PixelFormat::Yuyv];

    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::Mjpeg => *b"MJPG",
            Self::Yuyv => *b"YUYV",
        }
    }

    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"MJPG" => Some(Self::Mjpeg),
            b"YUYV" => Some(Self::Yuyv),
            _ => None,
        }
    }
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// BT.601 limited-range YUYV (4:2:2) to packed RGB8.
///
/// Returns `None` when the buffer is shorter than `width * height * 2`.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    let pixels = (width as usize) * (height as usize);
    if data.len() < pixels * 2 || width % 2 != 0 {
        return None;
    }
    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in data[..pixels * 2].chunks_exact(4) {
        let u = chunk[1] as i32 - 128;
        let v = chunk[3] as i32 - 128;
        for y in [chunk[0], chunk[2]] {
            let c = 298 * (y as i32 - 16);
            rgb.push(clamp_u8((c + 409 * v + 128) >> 8));
            rgb.push(clamp_u8((c - 100 * u - 208 * v + 128) >> 8));
            rgb.push(clamp_u8((c + 516 * u + 128) >> 8));
        }
    }
    Some(rgb)
}

/// Decode one captured buffer into a frame.
pub fn decode_frame(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<VideoFrame, DecodeError> {
    match format {
        PixelFormat::Yuyv => {
            let rgb = yuyv_to_rgb(data, width, height).ok_or(DecodeError::ShortBuffer {
                len: data.len(),
                width,
                height,
            })?;
            Ok(VideoFrame { width, height, rgb })
        }
        PixelFormat::Mjpeg => {
            let image =
                image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgb8();
            Ok(VideoFrame {
                width: image.width(),
                height: image.height(),
                rgb: image.into_raw(),
            })
        }
    }
}
