use crate::{
    decode, DisplaySink, FrameSource, Result, SessionState, StreamConfig, StreamError,
    StreamMetrics,
};
use camera_transport::CameraTransport;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// What one tick did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TickOutcome {
    /// Loop stopped or source not grabbing; nothing attempted.
    Idle,
    Delivered,
    TimedOut,
    GrabFault { message: String, consecutive: u32 },
    /// A frame arrived but could not be decoded.
    Skipped(String),
}

impl TickOutcome {
    /// Text for the viewer's status line, if this outcome warrants one.
    pub fn status_message(&self) -> Option<String> {
        match self {
            TickOutcome::GrabFault {
                message,
                consecutive,
            } if *consecutive > 1 => Some(format!("{message} ({consecutive} in a row)")),
            TickOutcome::GrabFault { message, .. } => Some(message.clone()),
            TickOutcome::Skipped(message) => Some(format!("Frame skipped: {message}")),
            _ => None,
        }
    }
}

/// Fixed-interval driver pulling frames from a [`FrameSource`] into a
/// [`DisplaySink`]. Errors raised inside a tick are classified into a
/// [`TickOutcome`] and never stop the loop.
pub struct AcquisitionLoop {
    interval: Duration,
    retrieve_timeout: Duration,
    running: bool,
    next_deadline: Option<Instant>,
    consecutive_faults: u32,
    metrics: Option<StreamMetrics>,
}

impl AcquisitionLoop {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            interval: config.tick_interval(),
            retrieve_timeout: config.retrieve_timeout(),
            running: false,
            next_deadline: None,
            consecutive_faults: 0,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: StreamMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Begin ticking. The source must already be grabbing.
    pub fn start<T: CameraTransport>(&mut self, source: &FrameSource<T>) -> Result<()> {
        let state = source.state();
        if state != SessionState::Grabbing {
            return Err(StreamError::InvalidState {
                op: "start acquisition",
                state,
            });
        }
        self.running = true;
        self.consecutive_faults = 0;
        self.next_deadline = Some(Instant::now());
        Ok(())
    }

    /// Takes effect before the next tick.
    pub fn stop(&mut self) {
        self.running = false;
        self.next_deadline = None;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.running && self.next_deadline.is_some_and(|d| now >= d)
    }

    /// Sleep until the next tick is due.
    pub fn wait_for_deadline(&self) {
        if let Some(deadline) = self.next_deadline {
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }
    }

    pub fn tick<T, S>(&mut self, source: &mut FrameSource<T>, sink: &mut S) -> TickOutcome
    where
        T: CameraTransport,
        S: DisplaySink + ?Sized,
    {
        if !self.running {
            return TickOutcome::Idle;
        }
        self.next_deadline = Some(Instant::now() + self.interval);
        if source.state() != SessionState::Grabbing {
            return TickOutcome::Idle;
        }

        let raw = match source.retrieve(self.retrieve_timeout) {
            Ok(raw) => raw,
            Err(StreamError::GrabTimeout) => {
                debug!("no frame within retrieve timeout");
                if let Some(m) = &self.metrics {
                    m.grab_timeouts.inc();
                }
                return TickOutcome::TimedOut;
            }
            Err(e) => {
                self.consecutive_faults += 1;
                warn!(error = %e, consecutive = self.consecutive_faults, "grab fault");
                if let Some(m) = &self.metrics {
                    m.grab_faults.inc();
                }
                return TickOutcome::GrabFault {
                    message: e.to_string(),
                    consecutive: self.consecutive_faults,
                };
            }
        };

        let decoded = decode::normalize(&raw);
        raw.release();

        match decoded {
            Ok(frame) => {
                self.consecutive_faults = 0;
                sink.present(frame);
                if let Some(m) = &self.metrics {
                    m.frames_delivered.inc();
                }
                TickOutcome::Delivered
            }
            Err(e) => {
                warn!(error = %e, "skipping undecodable frame");
                if let Some(m) = &self.metrics {
                    m.frames_skipped.inc();
                }
                TickOutcome::Skipped(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LatestFrameSink;
    use camera_transport::{GrabStrategy, MockCamera, MockGrab, MockTransport, PixelFormat};

    fn grabbing(camera: MockCamera) -> FrameSource<MockTransport> {
        let desc = camera.descriptor.clone();
        let mut src = FrameSource::new(MockTransport::new(vec![camera]));
        src.open(&desc).unwrap();
        src.start_grabbing(GrabStrategy::LatestImageOnly).unwrap();
        src
    }

    fn camera() -> MockCamera {
        MockCamera::new("cam0", "acA640-90um", "22000001").with_size(16, 12)
    }

    fn started(src: &FrameSource<MockTransport>) -> AcquisitionLoop {
        let mut acq = AcquisitionLoop::new(&StreamConfig::default());
        acq.start(src).unwrap();
        acq
    }

    #[test]
    fn test_start_requires_grabbing() {
        let desc = camera().descriptor;
        let mut src = FrameSource::new(MockTransport::new(vec![camera()]));
        let mut acq = AcquisitionLoop::new(&StreamConfig::default());
        assert!(acq.start(&src).is_err());
        src.open(&desc).unwrap();
        assert!(matches!(
            acq.start(&src),
            Err(StreamError::InvalidState {
                state: SessionState::Open,
                ..
            })
        ));
        assert!(!acq.is_running());
    }

    #[test]
    fn test_delivers_decoded_frames() {
        let mut src = grabbing(camera());
        let mut acq = started(&src);
        let mut sink = LatestFrameSink::new();
        assert_eq!(acq.tick(&mut src, &mut sink), TickOutcome::Delivered);
        let frame = sink.latest().unwrap();
        assert_eq!((frame.width, frame.height), (16, 12));
        assert_eq!(frame.data.len(), 16 * 12 * 3);
    }

    #[test]
    fn test_releases_match_successful_retrieves() {
        let cam = camera()
            .with_row_padding(5)
            .with_script(&[
                MockGrab::Frame,
                MockGrab::Timeout,
                MockGrab::Fault,
                MockGrab::Frame,
                MockGrab::Frame,
                MockGrab::Timeout,
            ]);
        let mut src = grabbing(cam);
        let mut acq = started(&src);
        let mut sink = LatestFrameSink::new();
        for _ in 0..60 {
            acq.tick(&mut src, &mut sink);
        }
        let ledger = src.transport().ledger();
        assert_eq!(ledger.retrieved, 30);
        assert_eq!(ledger.released, ledger.retrieved);
        assert_eq!(sink.presented(), 30);
    }

    #[test]
    fn test_undecodable_frames_are_released_and_skipped() {
        let cam = camera().with_formats(&[PixelFormat::Yuv422], PixelFormat::Yuv422);
        let mut src = grabbing(cam);
        let mut acq = started(&src);
        let mut sink = LatestFrameSink::new();
        for _ in 0..5 {
            assert!(matches!(
                acq.tick(&mut src, &mut sink),
                TickOutcome::Skipped(_)
            ));
        }
        assert!(acq.is_running());
        assert_eq!(sink.presented(), 0);
        let ledger = src.transport().ledger();
        assert_eq!(ledger.retrieved, 5);
        assert_eq!(ledger.released, 5);
    }

    #[test]
    fn test_always_timeout_never_stops() {
        let mut src = grabbing(camera().with_script(&[MockGrab::Timeout]));
        let mut acq = started(&src);
        let mut sink = LatestFrameSink::new();
        for _ in 0..1000 {
            assert_eq!(acq.tick(&mut src, &mut sink), TickOutcome::TimedOut);
        }
        assert!(acq.is_running());
        assert_eq!(sink.presented(), 0);
        assert_eq!(src.state(), SessionState::Grabbing);
    }

    #[test]
    fn test_consecutive_faults_counted_and_reset() {
        let cam = camera().with_script(&[MockGrab::Fault, MockGrab::Fault, MockGrab::Frame]);
        let mut src = grabbing(cam);
        let mut acq = started(&src);
        let mut sink = LatestFrameSink::new();

        let first = acq.tick(&mut src, &mut sink);
        assert!(matches!(first, TickOutcome::GrabFault { consecutive: 1, .. }));
        let second = acq.tick(&mut src, &mut sink);
        assert!(matches!(second, TickOutcome::GrabFault { consecutive: 2, .. }));
        assert!(second.status_message().unwrap().contains("2 in a row"));
        assert_eq!(acq.tick(&mut src, &mut sink), TickOutcome::Delivered);
        let again = acq.tick(&mut src, &mut sink);
        assert!(matches!(again, TickOutcome::GrabFault { consecutive: 1, .. }));
        assert!(acq.is_running());
    }

    #[test]
    fn test_idle_when_stopped_or_not_grabbing() {
        let mut src = grabbing(camera());
        let mut acq = started(&src);
        let mut sink = LatestFrameSink::new();

        acq.stop();
        assert_eq!(acq.tick(&mut src, &mut sink), TickOutcome::Idle);
        acq.stop();

        acq.start(&src).unwrap();
        src.stop_grabbing();
        assert_eq!(acq.tick(&mut src, &mut sink), TickOutcome::Idle);
        assert_eq!(src.transport().ledger().retrieved, 0);
    }

    #[test]
    fn test_deadline_schedule() {
        let mut src = grabbing(camera());
        let mut acq = started(&src);
        let mut sink = LatestFrameSink::new();
        let now = Instant::now();
        assert!(acq.is_due(now));
        acq.tick(&mut src, &mut sink);
        let next = acq.next_deadline().unwrap();
        assert!(next >= now + acq.interval());
        assert!(!acq.is_due(now));
        acq.stop();
        assert!(!acq.is_due(next + acq.interval()));
    }

    #[test]
    fn test_metrics_recorded() {
        let cam = camera().with_script(&[MockGrab::Frame, MockGrab::Timeout, MockGrab::Fault]);
        let mut src = grabbing(cam);
        let metrics = StreamMetrics::new().unwrap();
        let mut acq = AcquisitionLoop::new(&StreamConfig::default()).with_metrics(metrics.clone());
        acq.start(&src).unwrap();
        let mut sink = LatestFrameSink::new();
        for _ in 0..6 {
            acq.tick(&mut src, &mut sink);
        }
        assert_eq!(metrics.frames_delivered.get(), 2);
        assert_eq!(metrics.grab_timeouts.get(), 2);
        assert_eq!(metrics.grab_faults.get(), 2);
        assert_eq!(metrics.frames_skipped.get(), 0);
    }
}
