//! device-registry: discovery and lookup of attached cameras

mod error;
pub use error::{DiscoveryError, Result};

mod registry;
pub use registry::DeviceRegistry;
