use crate::{
    CameraDevice, CameraTransport, DeviceDescriptor, GrabStrategy, PixelFormat, RawFrame, Result,
    TransportClass, TransportError,
};
use opencv::prelude::*;
use opencv::{core, videoio};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::debug;

/// Highest UVC index probed during enumeration.
const MAX_PROBE: i32 = 8;

fn backend(e: opencv::Error) -> TransportError {
    TransportError::Io(e.to_string())
}

fn index_of(descriptor: &DeviceDescriptor) -> Option<i32> {
    descriptor.id.strip_prefix("uvc:")?.parse().ok()
}

/// A listed index that no longer opens is held by another process.
fn unopened(descriptor: &DeviceDescriptor, idx: i32) -> TransportError {
    if (0..MAX_PROBE).contains(&idx) {
        TransportError::DeviceBusy(descriptor.id.clone())
    } else {
        TransportError::DeviceNotFound(descriptor.id.clone())
    }
}

/// A read that came back empty before the deadline means the device stopped
/// delivering, not that it is slow.
fn empty_read(elapsed: Duration, timeout: Duration) -> TransportError {
    if elapsed >= timeout {
        TransportError::Timeout
    } else {
        TransportError::GrabFailed("no frame from device".into())
    }
}

/// USB/UVC cameras reached through OpenCV `videoio`.
#[derive(Clone, Debug, Default)]
pub struct OpenCvTransport;

impl CameraTransport for OpenCvTransport {
    type Device = OpenCvDevice;

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut out = Vec::new();
        for idx in 0..MAX_PROBE {
            // Probing a missing index is not an error
            let Ok(mut cap) = videoio::VideoCapture::new(idx, videoio::CAP_ANY) else {
                continue;
            };
            if !videoio::VideoCapture::is_opened(&cap).unwrap_or(false) {
                continue;
            }
            let model_name = cap
                .get_backend_name()
                .unwrap_or_else(|_| "UVC camera".to_string());
            let _ = cap.release();
            out.push(DeviceDescriptor {
                id: format!("uvc:{idx}"),
                model_name,
                serial_number: idx.to_string(),
                transport: TransportClass::Usb,
            });
        }
        Ok(out)
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<OpenCvDevice> {
        let idx = index_of(descriptor)
            .ok_or_else(|| TransportError::DeviceNotFound(descriptor.id.clone()))?;
        let cap = videoio::VideoCapture::new(idx, videoio::CAP_ANY).map_err(backend)?;
        let opened = videoio::VideoCapture::is_opened(&cap).map_err(backend)?;
        if !opened {
            debug!(device = %descriptor.id, "capture index did not open");
            return Err(unopened(descriptor, idx));
        }
        Ok(OpenCvDevice {
            cap,
            format: PixelFormat::Bgr8,
            grabbing: false,
            read_timeout: None,
        })
    }
}

pub struct OpenCvDevice {
    cap: videoio::VideoCapture,
    format: PixelFormat,
    grabbing: bool,
    read_timeout: Option<Duration>,
}

impl OpenCvDevice {
    fn apply_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        if self.read_timeout == Some(timeout) {
            return Ok(());
        }
        let accepted = self
            .cap
            .set(videoio::CAP_PROP_READ_TIMEOUT_MSEC, timeout.as_millis() as f64)
            .map_err(backend)?;
        if !accepted {
            debug!(?timeout, "capture backend ignored read timeout");
        }
        self.read_timeout = Some(timeout);
        Ok(())
    }
}

impl CameraDevice for OpenCvDevice {
    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        // videoio hands out BGR when conversion is on; nothing else is negotiable
        if format != PixelFormat::Bgr8 {
            return Err(TransportError::FormatRejected(format.to_string()));
        }
        let accepted = self
            .cap
            .set(videoio::CAP_PROP_CONVERT_RGB, 1.0)
            .map_err(backend)?;
        if !accepted {
            return Err(TransportError::FormatRejected(format.to_string()));
        }
        self.format = format;
        Ok(())
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn start_grabbing(&mut self, strategy: GrabStrategy) -> Result<()> {
        if strategy == GrabStrategy::LatestImageOnly {
            let accepted = self
                .cap
                .set(videoio::CAP_PROP_BUFFERSIZE, 1.0)
                .map_err(backend)?;
            if !accepted {
                debug!("capture backend ignored single-buffer request");
            }
        }
        self.grabbing = true;
        Ok(())
    }

    fn retrieve(&mut self, timeout: Duration) -> Result<RawFrame> {
        if !self.grabbing {
            return Err(TransportError::GrabFailed("not grabbing".into()));
        }
        self.apply_read_timeout(timeout)?;
        let started = Instant::now();
        let mut mat = core::Mat::default();
        let got = self
            .cap
            .read(&mut mat)
            .map_err(|e| TransportError::GrabFailed(e.to_string()))?;
        if !got || mat.empty() {
            return Err(empty_read(started.elapsed(), timeout));
        }
        if !mat.is_continuous() {
            return Err(TransportError::GrabFailed("non-contiguous frame".into()));
        }

        let width = mat.cols() as u32;
        let height = mat.rows() as u32;
        let format = match mat.channels() {
            1 => PixelFormat::Mono8,
            2 => PixelFormat::Yuv422,
            4 => PixelFormat::Bgra8,
            _ => PixelFormat::Bgr8,
        };
        let data = mat
            .data_bytes()
            .map_err(|e| TransportError::GrabFailed(e.to_string()))?
            .to_vec();
        let mut frame = RawFrame::from_vec(width, height, format, data);
        frame.channels = mat.channels() as u8;
        Ok(frame.with_timestamp(OffsetDateTime::now_utc()))
    }

    fn stop_grabbing(&mut self) -> Result<()> {
        self.grabbing = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.grabbing = false;
        self.cap.release().map_err(backend)
    }
}
