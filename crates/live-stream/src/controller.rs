use crate::{
    AcquisitionLoop, DisplaySink, FrameSource, Result, SessionState, StreamConfig, StreamError,
    StreamMetrics, TickOutcome,
};
use camera_transport::{CameraTransport, DeviceDescriptor};
use device_registry::DeviceRegistry;
use std::time::Instant;
use tracing::info;

type StatusCallback = Box<dyn FnMut(&str)>;

/// Front-end facing facade over registry, source, loop and sink.
///
/// Every failure, and a few informational events, are reported as plain
/// text through the status callback; the front-end only displays them.
pub struct StreamController<T: CameraTransport, S: DisplaySink> {
    config: StreamConfig,
    registry: DeviceRegistry,
    source: FrameSource<T>,
    acquisition: AcquisitionLoop,
    sink: S,
    selected: Option<DeviceDescriptor>,
    metrics: Option<StreamMetrics>,
    status: Option<StatusCallback>,
}

impl<T: CameraTransport, S: DisplaySink> StreamController<T, S> {
    pub fn new(transport: T, sink: S, config: StreamConfig) -> Self {
        Self {
            acquisition: AcquisitionLoop::new(&config),
            config,
            registry: DeviceRegistry::new(),
            source: FrameSource::new(transport),
            sink,
            selected: None,
            metrics: None,
            status: None,
        }
    }

    pub fn with_metrics(mut self, metrics: StreamMetrics) -> Self {
        self.acquisition = AcquisitionLoop::new(&self.config).with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn on_status(&mut self, callback: impl FnMut(&str) + 'static) {
        self.status = Some(Box::new(callback));
    }

    fn notify(&mut self, message: &str) {
        info!(status = message);
        if let Some(callback) = self.status.as_mut() {
            callback(message);
        }
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        self.notify(&err.to_string());
        err
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn source(&self) -> &FrameSource<T> {
        &self.source
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn selected(&self) -> Option<&DeviceDescriptor> {
        self.selected.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.source.state()
    }

    pub fn is_streaming(&self) -> bool {
        self.acquisition.is_running()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.acquisition.is_due(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.acquisition.next_deadline()
    }

    pub fn list_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
        match self.registry.enumerate(self.source.transport()) {
            Ok(found) => {
                let message = match found.len() {
                    0 => "No cameras found.".to_string(),
                    n => format!("Found {n} camera(s)."),
                };
                self.notify(&message);
                Ok(found)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Remember which camera `start_streaming` should open. The id must
    /// come from the last `list_devices` result.
    pub fn select_device(&mut self, id: &str) -> Result<()> {
        let Some(descriptor) = self.registry.find(id).cloned() else {
            return Err(self.fail(StreamError::DeviceOpen(format!("unknown camera id {id}"))));
        };
        self.notify(&format!("Selected {}", descriptor.label()));
        self.selected = Some(descriptor);
        Ok(())
    }

    /// Hand off from any running session, then open, configure and start
    /// the selected camera.
    pub fn start_streaming(&mut self) -> Result<()> {
        let Some(descriptor) = self.selected.clone() else {
            return Err(self.fail(StreamError::DeviceOpen("no camera selected".to_string())));
        };
        self.shutdown();
        if let Err(e) = self.bring_up(&descriptor) {
            self.shutdown();
            return Err(self.fail(e));
        }
        if let Some(m) = &self.metrics {
            m.sessions_opened.inc();
        }
        self.notify(&format!("Streaming from {}", descriptor.label()));
        Ok(())
    }

    fn bring_up(&mut self, descriptor: &DeviceDescriptor) -> Result<()> {
        self.source.open(descriptor)?;
        self.source.configure(&self.config.preferred_formats)?;
        self.source.start_grabbing(self.config.grab_strategy)?;
        self.acquisition.start(&self.source)
    }

    pub fn stop_streaming(&mut self) {
        let was_active = self.source.state() != SessionState::Closed;
        self.shutdown();
        if was_active {
            self.notify("Streaming stopped.");
        }
    }

    /// Loop first, then the grab, then the session.
    fn shutdown(&mut self) {
        self.acquisition.stop();
        self.source.stop_grabbing();
        self.source.close();
    }

    /// Run one acquisition tick and forward its status message.
    pub fn tick(&mut self) -> TickOutcome {
        let outcome = self.acquisition.tick(&mut self.source, &mut self.sink);
        if let Some(message) = outcome.status_message() {
            self.notify(&message);
        }
        outcome
    }

    /// Block, ticking on schedule, until streaming stops or `keep_going`
    /// returns false.
    pub fn run(&mut self, mut keep_going: impl FnMut(&TickOutcome) -> bool) {
        while self.acquisition.is_running() {
            self.acquisition.wait_for_deadline();
            let outcome = self.tick();
            if !keep_going(&outcome) {
                break;
            }
        }
    }
}

impl<T: CameraTransport, S: DisplaySink> Drop for StreamController<T, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
