//! live-stream: acquisition pipeline for a single live camera
//!
//! Data flows `DeviceRegistry -> FrameSource -> AcquisitionLoop -> normalize
//! -> DisplaySink`. [`StreamController`] ties the pieces together behind the
//! handful of operations a viewer front-end needs.

mod error;
pub use error::{Result, StreamError};

mod config;
pub use config::StreamConfig;

mod source;
pub use source::{FrameSource, SessionState};

mod display;
pub use display::{DisplayFrame, DisplaySink, LatestFrameSink};

pub mod decode;
pub use decode::normalize;

mod acquisition;
pub use acquisition::{AcquisitionLoop, TickOutcome};

mod controller;
pub use controller::StreamController;

mod metrics;
pub use metrics::StreamMetrics;
