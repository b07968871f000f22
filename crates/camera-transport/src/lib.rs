//! camera-transport: cross-platform industrial camera abstractions
//!
//! This crate provides traits and types for enumerating and driving camera
//! devices, with feature-gated backends. The default build enables a `mock`
//! backend so that binaries can compile and be exercised on any host without
//! vendor drivers.

mod types;
pub use types::{DeviceDescriptor, GrabStrategy, PixelFormat, TransportClass};

mod frame;
pub use frame::{FrameBuffer, RawFrame, VecBuffer};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{CameraDevice, CameraTransport};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockCamera, MockDevice, MockEvent, MockGrab, MockLedger, MockTransport};

#[cfg(feature = "opencv")]
mod opencv_backend;

#[cfg(feature = "opencv")]
pub use opencv_backend::{OpenCvDevice, OpenCvTransport};
