use time::OffsetDateTime;

/// Tightly packed RGB8 image ready for rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayFrame {
    pub width: u32,
    pub height: u32,
    /// Always `width * 3`.
    pub stride: usize,
    pub data: Vec<u8>,
    pub ts: Option<OffsetDateTime>,
}

impl DisplayFrame {
    pub const CHANNELS: usize = 3;

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y as usize * self.stride + x as usize * Self::CHANNELS;
        let px = self.data.get(i..i + Self::CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }

    /// Largest size with this frame's aspect ratio that fits the viewport.
    pub fn fit_within(&self, viewport_w: u32, viewport_h: u32) -> (u32, u32) {
        if self.width == 0 || self.height == 0 {
            return (0, 0);
        }
        let (w, h) = (self.width as u64, self.height as u64);
        let (vw, vh) = (viewport_w as u64, viewport_h as u64);
        if w * vh <= h * vw {
            ((w * vh / h) as u32, viewport_h)
        } else {
            (viewport_w, (h * vw / w) as u32)
        }
    }
}

/// Renders decoded frames. Implementations must not block the caller.
pub trait DisplaySink {
    fn present(&mut self, frame: DisplayFrame);
}

impl<F: FnMut(DisplayFrame)> DisplaySink for F {
    fn present(&mut self, frame: DisplayFrame) {
        self(frame)
    }
}

/// Keeps only the newest frame.
#[derive(Debug, Default)]
pub struct LatestFrameSink {
    latest: Option<DisplayFrame>,
    presented: u64,
}

impl LatestFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<&DisplayFrame> {
        self.latest.as_ref()
    }

    pub fn take(&mut self) -> Option<DisplayFrame> {
        self.latest.take()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl DisplaySink for LatestFrameSink {
    fn present(&mut self, frame: DisplayFrame) {
        self.presented += 1;
        self.latest = Some(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> DisplayFrame {
        DisplayFrame {
            width,
            height,
            stride: width as usize * 3,
            data: vec![0; width as usize * height as usize * 3],
            ts: None,
        }
    }

    #[test]
    fn test_fit_within_keeps_aspect() {
        // 4:3 into a 640x480 viewport
        assert_eq!(frame(1920, 1440).fit_within(640, 480), (640, 480));
        // Wide frame is width-limited
        assert_eq!(frame(1920, 1080).fit_within(640, 480), (640, 360));
        // Tall frame is height-limited
        assert_eq!(frame(1000, 2000).fit_within(640, 480), (240, 480));
    }

    #[test]
    fn test_fit_within_empty_frame() {
        assert_eq!(frame(0, 0).fit_within(640, 480), (0, 0));
    }

    #[test]
    fn test_pixel_bounds() {
        let mut f = frame(2, 2);
        f.data[9..12].copy_from_slice(&[1, 2, 3]);
        assert_eq!(f.pixel(1, 1), Some([1, 2, 3]));
        assert_eq!(f.pixel(2, 0), None);
    }

    #[test]
    fn test_latest_sink_replaces() {
        let mut sink = LatestFrameSink::new();
        sink.present(frame(1, 1));
        sink.present(frame(2, 2));
        assert_eq!(sink.presented(), 2);
        assert_eq!(sink.latest().map(|f| f.width), Some(2));
        assert!(sink.take().is_some());
        assert!(sink.latest().is_none());
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |f: DisplayFrame| seen.push(f.width);
            sink.present(frame(3, 1));
        }
        assert_eq!(seen, vec![3]);
    }
}
