//! V4L2 camera access via the `v4l` crate.

use crate::frame::{PixelFormat, RawFrame};
use sentinel_core::CaptureError;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Upper bound on buffers dequeued while waiting out the settle interval.
const MAX_SETTLE_FRAMES: usize = 120;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

impl From<CameraError> for CaptureError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::DeviceNotFound(path) => CaptureError::DeviceNotFound(path),
            CameraError::DeviceBusy => CaptureError::DeviceBusy,
            CameraError::CaptureFailed(msg) => CaptureError::NoFrame(msg),
            other @ (CameraError::FormatNegotiationFailed(_)
            | CameraError::StreamingNotSupported) => CaptureError::Device(other.to_string()),
        }
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Open V4L2 device. The device is closed when this is dropped.
pub struct Camera {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera by path (e.g., "/dev/video0") and negotiate a format.
    ///
    /// Asks for YUYV at the requested size; accepts GREY or MJPG if the
    /// driver substitutes one of those.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::debug!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpeg
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or MJPG)"
            )));
        };

        tracing::debug!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    /// Start streaming, discard frames until `settle` has elapsed, and return
    /// the first frame after it.
    ///
    /// Gives auto-exposure time to converge before the still is taken.
    pub fn capture_settled(&self, settle: Duration) -> Result<RawFrame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let deadline = Instant::now() + settle;
        let mut discarded = 0usize;

        loop {
            let (buf, meta) = stream.next().map_err(|e| {
                CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
            })?;

            if Instant::now() < deadline && discarded < MAX_SETTLE_FRAMES {
                discarded += 1;
                continue;
            }

            let used = (meta.bytesused as usize).min(buf.len());
            let data = if used > 0 { &buf[..used] } else { buf };
            if data.is_empty() {
                return Err(CameraError::CaptureFailed("driver returned an empty buffer".into()));
            }

            tracing::debug!(seq = meta.sequence, discarded, bytes = data.len(), "frame dequeued");

            return Ok(RawFrame {
                data: data.to_vec(),
                width: self.width,
                height: self.height,
                format: self.pixel_format,
                sequence: meta.sequence,
            });
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_reported() {
        let err = Camera::open("/dev/video-does-not-exist", 640, 480).err().unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }

    #[test]
    fn test_camera_errors_map_to_capture_errors() {
        assert!(matches!(
            CaptureError::from(CameraError::DeviceBusy),
            CaptureError::DeviceBusy
        ));
        assert!(matches!(
            CaptureError::from(CameraError::CaptureFailed("empty".into())),
            CaptureError::NoFrame(_)
        ));
        assert!(matches!(
            CaptureError::from(CameraError::StreamingNotSupported),
            CaptureError::Device(_)
        ));
    }
}
