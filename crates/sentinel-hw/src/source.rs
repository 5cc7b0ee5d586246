//! [`CaptureSource`] backed by a V4L2 camera.

use crate::camera::Camera;
use crate::frame;
use chrono::Utc;
use sentinel_core::{CaptureError, CaptureFrame, CaptureSource};
use std::time::Duration;

/// Opens the camera per capture and releases it before returning.
#[derive(Debug, Clone)]
pub struct V4lCaptureSource {
    device_path: String,
    width: u32,
    height: u32,
    settle: Duration,
    jpeg_quality: u8,
}

impl V4lCaptureSource {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
            width: 640,
            height: 480,
            settle: Duration::from_millis(300),
            jpeg_quality: 90,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl CaptureSource for V4lCaptureSource {
    fn capture(&self) -> Result<CaptureFrame, CaptureError> {
        let raw = {
            let camera = Camera::open(&self.device_path, self.width, self.height)?;
            camera.capture_settled(self.settle)
            // camera dropped here: the device is closed whether or not the read succeeded
        };
        let captured_at = Utc::now();
        let raw = raw?;

        if let Some(luma) = raw.luma() {
            if frame::is_dark_frame(&luma, 0.95) {
                tracing::warn!(device = %self.device_path, "captured frame is almost entirely dark");
            }
        }

        let jpeg = frame::encode_jpeg(&raw, self.jpeg_quality)
            .map_err(|e| CaptureError::NoFrame(e.to_string()))?;

        tracing::debug!(
            device = %self.device_path,
            seq = raw.sequence,
            bytes = jpeg.len(),
            "still captured"
        );

        Ok(CaptureFrame::new(jpeg, captured_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_is_capture_error() {
        let source = V4lCaptureSource::new("/dev/video-does-not-exist").with_settle(Duration::ZERO);
        assert!(matches!(source.capture(), Err(CaptureError::DeviceNotFound(_))));
    }

    #[test]
    fn test_defaults() {
        let source = V4lCaptureSource::new("/dev/video2");
        assert_eq!(source.device_path(), "/dev/video2");
        assert_eq!((source.width, source.height), (640, 480));
    }

    #[test]
    fn test_jpeg_quality_clamped() {
        let source = V4lCaptureSource::new("/dev/video0").with_jpeg_quality(0);
        assert_eq!(source.jpeg_quality, 1);
        let source = source.with_jpeg_quality(250);
        assert_eq!(source.jpeg_quality, 100);
    }
}
