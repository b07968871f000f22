use crate::{
    CameraDevice, CameraTransport, DeviceDescriptor, FrameBuffer, GrabStrategy, PixelFormat,
    RawFrame, Result, TransportClass, TransportError,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// What a mock camera does on one retrieve call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockGrab {
    Frame,
    Timeout,
    Fault,
}

/// Definition of one simulated camera.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MockCamera {
    pub descriptor: DeviceDescriptor,
    #[serde(default = "default_formats")]
    pub supported_formats: Vec<PixelFormat>,
    #[serde(default = "default_format")]
    pub default_format: PixelFormat,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Extra bytes appended to every row.
    #[serde(default)]
    pub row_padding: usize,
    /// Outcomes replayed in a cycle; empty means every retrieve yields a frame.
    #[serde(default)]
    pub script: Vec<MockGrab>,
    /// Frames the sensor exposes between two retrieve calls.
    #[serde(default = "default_frames_per_retrieve")]
    pub frames_per_retrieve: u64,
    /// When set, `start_grabbing` fails with this reason.
    #[serde(default)]
    pub start_failure: Option<String>,
}

fn default_formats() -> Vec<PixelFormat> {
    vec![PixelFormat::Mono8]
}

fn default_format() -> PixelFormat {
    PixelFormat::Mono8
}

fn default_width() -> u32 {
    320
}

fn default_height() -> u32 {
    240
}

fn default_frames_per_retrieve() -> u64 {
    1
}

impl MockCamera {
    pub fn new(id: &str, model_name: &str, serial_number: &str) -> Self {
        Self {
            descriptor: DeviceDescriptor {
                id: id.to_string(),
                model_name: model_name.to_string(),
                serial_number: serial_number.to_string(),
                transport: TransportClass::Mock,
            },
            supported_formats: default_formats(),
            default_format: default_format(),
            width: default_width(),
            height: default_height(),
            row_padding: 0,
            script: Vec::new(),
            frames_per_retrieve: default_frames_per_retrieve(),
            start_failure: None,
        }
    }

    pub fn with_formats(mut self, supported: &[PixelFormat], default: PixelFormat) -> Self {
        self.supported_formats = supported.to_vec();
        self.default_format = default;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_row_padding(mut self, padding: usize) -> Self {
        self.row_padding = padding;
        self
    }

    pub fn with_script(mut self, script: &[MockGrab]) -> Self {
        self.script = script.to_vec();
        self
    }

    pub fn with_frames_per_retrieve(mut self, frames: u64) -> Self {
        self.frames_per_retrieve = frames.max(1);
        self
    }

    pub fn with_start_failure(mut self, reason: &str) -> Self {
        self.start_failure = Some(reason.to_string());
        self
    }
}

/// Driver calls observed by the mock, in order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MockEvent {
    Open(String),
    SetFormat(String, PixelFormat),
    StartGrabbing(String, GrabStrategy),
    StopGrabbing(String),
    Close(String),
}

/// Shared bookkeeping for every device opened through one [`MockTransport`].
#[derive(Clone, Debug, Default)]
pub struct MockLedger {
    pub events: Vec<MockEvent>,
    pub retrieved: u64,
    pub released: u64,
    /// Frames overwritten before anyone retrieved them.
    pub dropped: u64,
    pub open_ids: Vec<String>,
    pub offline: bool,
}

fn lock(ledger: &Mutex<MockLedger>) -> MutexGuard<'_, MockLedger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process transport serving a fixed inventory of simulated cameras.
/// Clones share the same ledger.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    cameras: Vec<MockCamera>,
    ledger: Arc<Mutex<MockLedger>>,
}

impl MockTransport {
    pub fn new(cameras: Vec<MockCamera>) -> Self {
        Self {
            cameras,
            ledger: Arc::default(),
        }
    }

    /// A single mono camera that always delivers frames.
    pub fn single() -> Self {
        Self::new(vec![MockCamera::new("mock0", "MockCam-640", "00000001")])
    }

    /// Simulate the transport layer failing to initialise.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.ledger).offline = offline;
    }

    pub fn ledger(&self) -> MockLedger {
        lock(&self.ledger).clone()
    }
}

impl CameraTransport for MockTransport {
    type Device = MockDevice;

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        if lock(&self.ledger).offline {
            return Err(TransportError::InitFailed(
                "mock transport offline".to_string(),
            ));
        }
        Ok(self.cameras.iter().map(|c| c.descriptor.clone()).collect())
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<MockDevice> {
        let camera = self
            .cameras
            .iter()
            .find(|c| c.descriptor == *descriptor)
            .ok_or_else(|| TransportError::DeviceNotFound(descriptor.id.clone()))?;
        let mut ledger = lock(&self.ledger);
        if ledger.offline {
            return Err(TransportError::Io("mock transport offline".to_string()));
        }
        if ledger.open_ids.contains(&descriptor.id) {
            return Err(TransportError::DeviceBusy(descriptor.id.clone()));
        }
        ledger.open_ids.push(descriptor.id.clone());
        ledger.events.push(MockEvent::Open(descriptor.id.clone()));
        Ok(MockDevice {
            format: camera.default_format,
            camera: camera.clone(),
            grabbing: false,
            strategy: GrabStrategy::default(),
            open: true,
            cursor: 0,
            exposed: 0,
            delivered: 0,
            ledger: Arc::clone(&self.ledger),
        })
    }
}

pub struct MockDevice {
    camera: MockCamera,
    format: PixelFormat,
    grabbing: bool,
    strategy: GrabStrategy,
    open: bool,
    cursor: usize,
    /// Sequence number of the newest frame the sensor produced.
    exposed: u64,
    /// Sequence number of the last frame handed out.
    delivered: u64,
    ledger: Arc<Mutex<MockLedger>>,
}

impl MockDevice {
    fn id(&self) -> String {
        self.camera.descriptor.id.clone()
    }

    fn next_step(&mut self) -> MockGrab {
        if self.camera.script.is_empty() {
            return MockGrab::Frame;
        }
        let step = self.camera.script[self.cursor % self.camera.script.len()];
        self.cursor += 1;
        step
    }

    /// Advance the sensor and pick the next frame according to the grab
    /// strategy. Returns its sequence number.
    fn next_sequence(&mut self) -> u64 {
        self.exposed += self.camera.frames_per_retrieve.max(1);
        let next = match self.strategy {
            GrabStrategy::LatestImageOnly => {
                let overwritten = self.exposed - self.delivered - 1;
                if overwritten > 0 {
                    lock(&self.ledger).dropped += overwritten;
                }
                self.exposed
            }
            GrabStrategy::OneByOne => self.delivered + 1,
        };
        self.delivered = next;
        next
    }

    fn synthesize(&mut self, sequence: u64) -> RawFrame {
        let width = self.camera.width;
        let height = self.camera.height;
        let channels = self.format.channels() as usize;
        let stride = width as usize * channels + self.camera.row_padding;
        // Diagonal ramp that drifts with the sequence number
        let mut data = vec![0u8; stride * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let v = ((x + y) as u64 + sequence) % 256;
                let base = y * stride + x * channels;
                for c in 0..channels {
                    data[base + c] = v as u8;
                }
            }
        }
        let buffer = MockBuffer {
            data,
            ledger: Arc::clone(&self.ledger),
        };
        RawFrame::new(width, height, self.format, stride, Box::new(buffer))
            .with_timestamp(OffsetDateTime::now_utc())
    }

    fn detach(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let id = self.id();
        let mut ledger = lock(&self.ledger);
        ledger.open_ids.retain(|open| *open != id);
    }
}

impl CameraDevice for MockDevice {
    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        if self.grabbing {
            return Err(TransportError::Unsupported(
                "pixel format is locked while grabbing",
            ));
        }
        if !self.camera.supported_formats.contains(&format) {
            debug!(device = %self.camera.descriptor.id, %format, "mock rejected pixel format");
            return Err(TransportError::FormatRejected(format.to_string()));
        }
        self.format = format;
        lock(&self.ledger)
            .events
            .push(MockEvent::SetFormat(self.id(), format));
        Ok(())
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn start_grabbing(&mut self, strategy: GrabStrategy) -> Result<()> {
        if !self.open {
            return Err(TransportError::Io("device closed".to_string()));
        }
        if let Some(reason) = &self.camera.start_failure {
            warn!(device = %self.camera.descriptor.id, %reason, "mock start grabbing failed");
            return Err(TransportError::Io(reason.clone()));
        }
        self.grabbing = true;
        self.strategy = strategy;
        // Nothing is pending when a grab starts
        self.exposed = self.delivered;
        lock(&self.ledger)
            .events
            .push(MockEvent::StartGrabbing(self.id(), strategy));
        Ok(())
    }

    fn retrieve(&mut self, _timeout: Duration) -> Result<RawFrame> {
        if !self.grabbing {
            return Err(TransportError::GrabFailed("not grabbing".to_string()));
        }
        match self.next_step() {
            MockGrab::Timeout => {
                debug!(device = %self.camera.descriptor.id, "scripted timeout");
                Err(TransportError::Timeout)
            }
            MockGrab::Fault => {
                warn!(device = %self.camera.descriptor.id, "scripted grab fault");
                Err(TransportError::GrabFailed("frame incomplete".to_string()))
            }
            MockGrab::Frame => {
                let sequence = self.next_sequence();
                let frame = self.synthesize(sequence);
                lock(&self.ledger).retrieved += 1;
                Ok(frame)
            }
        }
    }

    fn stop_grabbing(&mut self) -> Result<()> {
        if self.grabbing {
            self.grabbing = false;
            lock(&self.ledger)
                .events
                .push(MockEvent::StopGrabbing(self.id()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.grabbing = false;
            self.detach();
            lock(&self.ledger).events.push(MockEvent::Close(self.id()));
        }
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.detach();
    }
}

struct MockBuffer {
    data: Vec<u8>,
    ledger: Arc<Mutex<MockLedger>>,
}

impl FrameBuffer for MockBuffer {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn release(self: Box<Self>) {
        lock(&self.ledger).released += 1;
    }
}
