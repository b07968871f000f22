use crate::{DeviceDescriptor, GrabStrategy, PixelFormat, RawFrame, Result, TransportError};
use std::time::Duration;

/// Entry point of a camera driver stack.
pub trait CameraTransport {
    type Device: CameraDevice;

    /// List attached devices. An empty list is not an error; failing to
    /// bring up the transport layer itself is.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open a device for exclusive use.
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Self::Device>;
}

/// A single opened camera.
pub trait CameraDevice {
    /// Request a pixel format. Backends that cannot negotiate refuse.
    fn set_pixel_format(&mut self, _format: PixelFormat) -> Result<()> {
        Err(TransportError::Unsupported("pixel format negotiation"))
    }

    /// Currently active pixel format.
    fn pixel_format(&self) -> PixelFormat;

    fn start_grabbing(&mut self, strategy: GrabStrategy) -> Result<()>;

    /// Wait at most `timeout` for the next frame.
    fn retrieve(&mut self, timeout: Duration) -> Result<RawFrame>;

    fn stop_grabbing(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}
