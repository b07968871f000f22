use anyhow::{Context, Result};
use camera_transport::{MockCamera, MockGrab, MockTransport, PixelFormat};
use live_stream::StreamConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Contents of the optional `--config` YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub stream: StreamConfig,
    /// Simulated cameras served by the mock backend.
    pub mock_cameras: Vec<MockCamera>,
}

impl ViewerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))
    }

    pub fn mock_transport(&self) -> MockTransport {
        if self.mock_cameras.is_empty() {
            MockTransport::new(demo_inventory())
        } else {
            MockTransport::new(self.mock_cameras.clone())
        }
    }
}

/// Two cameras: a clean mono one and a colour one with padded rows and an
/// occasional stall and fault.
fn demo_inventory() -> Vec<MockCamera> {
    let mut flaky = vec![MockGrab::Frame; 8];
    flaky.push(MockGrab::Timeout);
    flaky.push(MockGrab::Fault);
    vec![
        MockCamera::new("mock0", "MockCam-640m", "10000001").with_size(640, 480),
        MockCamera::new("mock1", "MockCam-1280c", "10000002")
            .with_size(1280, 720)
            .with_formats(&[PixelFormat::Bgr8, PixelFormat::Bgra8], PixelFormat::Bgra8)
            .with_row_padding(64)
            .with_script(&flaky),
    ]
}
