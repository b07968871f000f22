use anyhow::Context;
use camera_transport::{GrabStrategy, PixelFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Streaming parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Period of the acquisition tick.
    pub tick_interval_ms: u64,
    /// Upper bound on a single blocking retrieve.
    pub retrieve_timeout_ms: u64,
    /// Pixel formats to request, most preferred first.
    pub preferred_formats: Vec<PixelFormat>,
    pub grab_strategy: GrabStrategy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 30,
            retrieve_timeout_ms: 5000,
            preferred_formats: vec![PixelFormat::Mono8, PixelFormat::Rgb8, PixelFormat::Bgr8],
            grab_strategy: GrabStrategy::LatestImageOnly,
        }
    }
}

impl StreamConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn retrieve_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieve_timeout_ms)
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("parsing stream config")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading stream config: {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("in {}", path.display()))
    }
}
