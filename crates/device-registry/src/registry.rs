use crate::Result;
use camera_transport::{CameraTransport, DeviceDescriptor};
use tracing::{debug, warn};

/// Snapshot of the cameras seen by the last successful enumeration.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the transport and replace the cached list. On failure the
    /// previous list is kept.
    pub fn enumerate<T: CameraTransport>(
        &mut self,
        transport: &T,
    ) -> Result<Vec<DeviceDescriptor>> {
        let found = transport.enumerate().map_err(|e| {
            warn!(error = %e, "camera enumeration failed");
            e
        })?;
        debug!(count = found.len(), "enumerated cameras");
        self.devices = found.clone();
        Ok(found)
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn find(&self, id: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
