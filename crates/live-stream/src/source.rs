use crate::{Result, StreamError};
use camera_transport::{
    CameraDevice, CameraTransport, DeviceDescriptor, GrabStrategy, PixelFormat, RawFrame,
    TransportError,
};
use core::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle of the camera session held by a [`FrameSource`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Closed,
    Open,
    Grabbing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Open => "open",
            SessionState::Grabbing => "grabbing",
        };
        f.write_str(name)
    }
}

fn grab_error(e: TransportError) -> StreamError {
    match e {
        TransportError::Timeout => StreamError::GrabTimeout,
        TransportError::GrabFailed(reason) => StreamError::GrabFailed(reason),
        other => StreamError::GrabFailed(other.to_string()),
    }
}

struct CameraSession<D> {
    descriptor: DeviceDescriptor,
    device: D,
    grabbing: bool,
}

/// Owner of at most one open camera.
///
/// ```text
/// Closed -open-> Open -start_grabbing-> Grabbing -stop_grabbing-> Open -close-> Closed
/// ```
///
/// Transitions not on this path fail with [`StreamError::InvalidState`],
/// except `stop_grabbing` and `close`, which are no-ops when there is
/// nothing to stop. Dropping the source closes the session.
pub struct FrameSource<T: CameraTransport> {
    transport: T,
    session: Option<CameraSession<T::Device>>,
}

impl<T: CameraTransport> FrameSource<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        match &self.session {
            None => SessionState::Closed,
            Some(s) if s.grabbing => SessionState::Grabbing,
            Some(_) => SessionState::Open,
        }
    }

    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.session.as_ref().map(|s| &s.descriptor)
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.session.as_ref().map(|s| s.device.pixel_format())
    }

    fn session_in(
        &mut self,
        wanted: SessionState,
        op: &'static str,
    ) -> Result<&mut CameraSession<T::Device>> {
        let state = self.state();
        match self.session.as_mut() {
            Some(session) if state == wanted => Ok(session),
            _ => Err(StreamError::InvalidState { op, state }),
        }
    }

    pub fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<()> {
        let state = self.state();
        if state != SessionState::Closed {
            return Err(StreamError::InvalidState { op: "open", state });
        }
        let device = self
            .transport
            .open(descriptor)
            .map_err(|e| StreamError::DeviceOpen(format!("{}: {e}", descriptor.label())))?;
        info!(id = %descriptor.id, model = %descriptor.model_name, "camera opened");
        self.session = Some(CameraSession {
            descriptor: descriptor.clone(),
            device,
            grabbing: false,
        });
        Ok(())
    }

    /// Request the first pixel format in `preferred` the device accepts.
    /// Returns the accepted format, or `None` when the device kept its
    /// default. Refusals are not errors.
    pub fn configure(&mut self, preferred: &[PixelFormat]) -> Result<Option<PixelFormat>> {
        let session = self.session_in(SessionState::Open, "configure")?;
        for &format in preferred {
            match session.device.set_pixel_format(format) {
                Ok(()) => {
                    info!(%format, "pixel format selected");
                    return Ok(Some(format));
                }
                Err(e) => debug!(%format, error = %e, "pixel format refused"),
            }
        }
        debug!(
            format = %session.device.pixel_format(),
            "keeping device default pixel format"
        );
        Ok(None)
    }

    pub fn start_grabbing(&mut self, strategy: GrabStrategy) -> Result<()> {
        let session = self.session_in(SessionState::Open, "start grabbing")?;
        session
            .device
            .start_grabbing(strategy)
            .map_err(grab_error)?;
        session.grabbing = true;
        info!(?strategy, "grabbing started");
        Ok(())
    }

    /// Wait at most `timeout` for the next frame. The caller owns the
    /// returned frame and must let it be released.
    pub fn retrieve(&mut self, timeout: Duration) -> Result<RawFrame> {
        let session = self.session_in(SessionState::Grabbing, "retrieve")?;
        session.device.retrieve(timeout).map_err(grab_error)
    }

    pub fn stop_grabbing(&mut self) {
        let Some(session) = self.session.as_mut().filter(|s| s.grabbing) else {
            return;
        };
        if let Err(e) = session.device.stop_grabbing() {
            warn!(error = %e, "driver error while stopping grab");
        }
        session.grabbing = false;
        info!("grabbing stopped");
    }

    pub fn close(&mut self) {
        self.stop_grabbing();
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Err(e) = session.device.close() {
            error!(id = %session.descriptor.id, error = %e, "driver error while closing camera");
        }
        info!(id = %session.descriptor.id, "camera closed");
    }
}

impl<T: CameraTransport> Drop for FrameSource<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_transport::{MockCamera, MockEvent, MockGrab, MockTransport};

    fn source_with(camera: MockCamera) -> (FrameSource<MockTransport>, DeviceDescriptor) {
        let desc = camera.descriptor.clone();
        (FrameSource::new(MockTransport::new(vec![camera])), desc)
    }

    fn mono() -> MockCamera {
        MockCamera::new("cam0", "acA640-90um", "22000001").with_size(8, 6)
    }

    #[test]
    fn test_full_lifecycle() {
        let (mut src, desc) = source_with(mono());
        assert_eq!(src.state(), SessionState::Closed);
        src.open(&desc).unwrap();
        assert_eq!(src.state(), SessionState::Open);
        assert_eq!(src.descriptor(), Some(&desc));
        src.start_grabbing(GrabStrategy::LatestImageOnly).unwrap();
        assert_eq!(src.state(), SessionState::Grabbing);
        let frame = src.retrieve(Duration::from_millis(100)).unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
        frame.release();
        src.stop_grabbing();
        assert_eq!(src.state(), SessionState::Open);
        src.close();
        assert_eq!(src.state(), SessionState::Closed);
        assert!(src.descriptor().is_none());
    }

    #[test]
    fn test_illegal_transitions_fail() {
        let (mut src, desc) = source_with(mono());
        assert!(matches!(
            src.start_grabbing(GrabStrategy::LatestImageOnly),
            Err(StreamError::InvalidState {
                state: SessionState::Closed,
                ..
            })
        ));
        assert!(matches!(
            src.retrieve(Duration::from_millis(1)),
            Err(StreamError::InvalidState { .. })
        ));
        assert!(matches!(
            src.configure(&[PixelFormat::Mono8]),
            Err(StreamError::InvalidState { .. })
        ));

        src.open(&desc).unwrap();
        assert!(matches!(
            src.retrieve(Duration::from_millis(1)),
            Err(StreamError::InvalidState {
                state: SessionState::Open,
                ..
            })
        ));
        src.start_grabbing(GrabStrategy::LatestImageOnly).unwrap();
        assert!(matches!(
            src.start_grabbing(GrabStrategy::LatestImageOnly),
            Err(StreamError::InvalidState {
                state: SessionState::Grabbing,
                ..
            })
        ));
    }

    #[test]
    fn test_open_twice_is_refused_not_reopened() {
        let (mut src, desc) = source_with(mono());
        src.open(&desc).unwrap();
        let err = src.open(&desc).unwrap_err();
        assert!(matches!(err, StreamError::InvalidState { op: "open", .. }));
        let opens = src
            .transport()
            .ledger()
            .events
            .iter()
            .filter(|e| matches!(e, MockEvent::Open(_)))
            .count();
        assert_eq!(opens, 1);
    }

    #[test]
    fn test_open_busy_or_missing_device() {
        let camera = mono();
        let transport = MockTransport::new(vec![camera.clone()]);
        let mut first = FrameSource::new(transport.clone());
        let mut second = FrameSource::new(transport);
        first.open(&camera.descriptor).unwrap();
        assert!(matches!(
            second.open(&camera.descriptor),
            Err(StreamError::DeviceOpen(_))
        ));
        assert_eq!(second.state(), SessionState::Closed);

        let ghost = MockCamera::new("ghost", "none", "0").descriptor;
        first.close();
        assert!(matches!(first.open(&ghost), Err(StreamError::DeviceOpen(_))));
    }

    #[test]
    fn test_configure_picks_first_supported() {
        let camera =
            mono().with_formats(&[PixelFormat::Bgr8, PixelFormat::Bgra8], PixelFormat::Bgra8);
        let (mut src, desc) = source_with(camera);
        src.open(&desc).unwrap();
        let picked = src
            .configure(&[PixelFormat::Mono8, PixelFormat::Rgb8, PixelFormat::Bgr8])
            .unwrap();
        assert_eq!(picked, Some(PixelFormat::Bgr8));
        assert_eq!(src.pixel_format(), Some(PixelFormat::Bgr8));
    }

    #[test]
    fn test_configure_keeps_default_when_nothing_matches() {
        let camera = mono().with_formats(&[PixelFormat::Bgra8], PixelFormat::Bgra8);
        let (mut src, desc) = source_with(camera);
        src.open(&desc).unwrap();
        assert_eq!(src.configure(&[PixelFormat::Mono8, PixelFormat::Rgb8]).unwrap(), None);
        assert_eq!(src.pixel_format(), Some(PixelFormat::Bgra8));
        assert_eq!(src.state(), SessionState::Open);
    }

    #[test]
    fn test_retrieve_maps_timeout_and_fault() {
        let camera = mono().with_script(&[MockGrab::Timeout, MockGrab::Fault]);
        let (mut src, desc) = source_with(camera);
        src.open(&desc).unwrap();
        src.start_grabbing(GrabStrategy::LatestImageOnly).unwrap();
        assert!(matches!(
            src.retrieve(Duration::from_millis(1)),
            Err(StreamError::GrabTimeout)
        ));
        assert!(matches!(
            src.retrieve(Duration::from_millis(1)),
            Err(StreamError::GrabFailed(_))
        ));
        let ledger = src.transport().ledger();
        assert_eq!(ledger.retrieved, 0);
        assert_eq!(ledger.released, 0);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (mut src, desc) = source_with(mono());
        src.stop_grabbing();
        src.close();
        src.close();

        src.open(&desc).unwrap();
        src.start_grabbing(GrabStrategy::OneByOne).unwrap();
        src.stop_grabbing();
        src.stop_grabbing();
        src.close();
        src.close();
        src.stop_grabbing();

        let events = src.transport().ledger().events;
        assert_eq!(
            events,
            vec![
                MockEvent::Open("cam0".into()),
                MockEvent::StartGrabbing("cam0".into(), GrabStrategy::OneByOne),
                MockEvent::StopGrabbing("cam0".into()),
                MockEvent::Close("cam0".into()),
            ]
        );
    }

    #[test]
    fn test_close_while_grabbing_stops_first() {
        let (mut src, desc) = source_with(mono());
        src.open(&desc).unwrap();
        src.start_grabbing(GrabStrategy::LatestImageOnly).unwrap();
        src.close();
        let events = src.transport().ledger().events;
        assert_eq!(
            &events[2..],
            &[MockEvent::StopGrabbing("cam0".into()), MockEvent::Close("cam0".into())]
        );
    }

    #[test]
    fn test_drop_closes_session() {
        let camera = mono();
        let transport = MockTransport::new(vec![camera.clone()]);
        {
            let mut src = FrameSource::new(transport.clone());
            src.open(&camera.descriptor).unwrap();
            src.start_grabbing(GrabStrategy::LatestImageOnly).unwrap();
        }
        let ledger = transport.ledger();
        assert!(ledger.open_ids.is_empty());
        assert_eq!(ledger.events.last(), Some(&MockEvent::Close("cam0".into())));
    }
}
