use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Per-process streaming counters.
#[derive(Clone)]
pub struct StreamMetrics {
    pub registry: Registry,
    pub frames_delivered: IntCounter,
    pub grab_timeouts: IntCounter,
    pub grab_faults: IntCounter,
    pub frames_skipped: IntCounter,
    pub sessions_opened: IntCounter,
}

impl StreamMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let frames_delivered = IntCounter::new(
            "camview_frames_delivered_total",
            "Frames decoded and handed to the display sink",
        )?;
        let grab_timeouts = IntCounter::new(
            "camview_grab_timeouts_total",
            "Ticks skipped because no frame arrived in time",
        )?;
        let grab_faults = IntCounter::new(
            "camview_grab_faults_total",
            "Acquisition faults reported by the device",
        )?;
        let frames_skipped = IntCounter::new(
            "camview_frames_skipped_total",
            "Frames dropped because their pixel format could not be decoded",
        )?;
        let sessions_opened = IntCounter::new(
            "camview_sessions_opened_total",
            "Camera sessions that reached the grabbing state",
        )?;
        for counter in [
            &frames_delivered,
            &grab_timeouts,
            &grab_faults,
            &frames_skipped,
            &sessions_opened,
        ] {
            registry.register(Box::new(counter.clone()))?;
        }
        Ok(Self {
            registry,
            frames_delivered,
            grab_timeouts,
            grab_faults,
            frames_skipped,
            sessions_opened,
        })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
