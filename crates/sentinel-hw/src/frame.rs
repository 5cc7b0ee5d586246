//! Raw frame type and conversions — YUYV to RGB, dark detection, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Pixel layout of a raw buffer as negotiated with the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// Motion-JPEG: each buffer is already a complete JPEG.
    Mjpeg,
}

/// One dequeued driver buffer, copied out of the mmap ring.
#[derive(Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub sequence: u32,
}

impl RawFrame {
    /// Luma plane, when the format carries one uncompressed.
    pub fn luma(&self) -> Option<Vec<u8>> {
        let pixels = (self.width * self.height) as usize;
        match self.format {
            PixelFormat::Grey => Some(self.data.iter().take(pixels).copied().collect()),
            PixelFormat::Yuyv => Some(self.data.iter().step_by(2).take(pixels).copied().collect()),
            PixelFormat::Mjpeg => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame buffer")]
    Empty,
    #[error("invalid {format:?} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("MJPG buffer is not a JPEG (missing SOI marker)")]
    NotJpeg,
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Convert packed YUYV (4:2:2) to interleaved RGB8 (BT.601, studio range).
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            format: PixelFormat::Yuyv,
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for px in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (px[0], px[1], px[2], px[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| x.clamp(0, 255) as u8;
    [
        clamp((298 * c + 409 * e + 128) >> 8),
        clamp((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Check if a frame is dark: more than `threshold_pct` of pixels below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

/// Encode a raw frame as JPEG. MJPG buffers pass through unchanged.
pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<Vec<u8>, FrameError> {
    if frame.data.is_empty() {
        return Err(FrameError::Empty);
    }

    let (pixels, color) = match frame.format {
        PixelFormat::Mjpeg => {
            if !frame.data.starts_with(&[0xFF, 0xD8]) {
                return Err(FrameError::NotJpeg);
            }
            return Ok(frame.data.clone());
        }
        PixelFormat::Yuyv => (
            yuyv_to_rgb(&frame.data, frame.width, frame.height)?,
            ExtendedColorType::Rgb8,
        ),
        PixelFormat::Grey => {
            let expected = (frame.width * frame.height) as usize;
            if frame.data.len() < expected {
                return Err(FrameError::InvalidLength {
                    format: PixelFormat::Grey,
                    expected,
                    actual: frame.data.len(),
                });
            }
            (frame.data[..expected].to_vec(), ExtendedColorType::L8)
        }
    };

    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder.encode(&pixels, frame.width, frame.height, color)?;
    }
    Ok(out)
}
