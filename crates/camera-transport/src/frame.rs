use crate::PixelFormat;
use core::fmt;
use time::OffsetDateTime;

/// Driver-owned pixel storage lent out for the duration of one retrieval.
pub trait FrameBuffer {
    fn bytes(&self) -> &[u8];

    /// Hand the buffer back to the driver.
    fn release(self: Box<Self>);
}

/// Heap buffer with no driver pool behind it; releasing simply frees it.
pub struct VecBuffer(pub Vec<u8>);

impl FrameBuffer for VecBuffer {
    fn bytes(&self) -> &[u8] {
        &self.0
    }

    fn release(self: Box<Self>) {}
}

/// One frame as delivered by a device.
///
/// The underlying buffer is returned to its driver exactly once: either by
/// [`RawFrame::release`] or, if the frame is dropped first, on drop.
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixel_format: PixelFormat,
    /// Bytes per row; at least `width * channels`.
    pub stride: usize,
    pub ts: Option<OffsetDateTime>,
    buffer: Option<Box<dyn FrameBuffer>>,
}

impl RawFrame {
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        stride: usize,
        buffer: Box<dyn FrameBuffer>,
    ) -> Self {
        Self {
            width,
            height,
            channels: pixel_format.channels(),
            pixel_format,
            stride,
            ts: None,
            buffer: Some(buffer),
        }
    }

    /// Tightly packed frame backed by a plain vector.
    pub fn from_vec(width: u32, height: u32, pixel_format: PixelFormat, data: Vec<u8>) -> Self {
        let stride = width as usize * pixel_format.channels() as usize;
        Self::new(width, height, pixel_format, stride, Box::new(VecBuffer(data)))
    }

    pub fn with_timestamp(mut self, ts: OffsetDateTime) -> Self {
        self.ts = Some(ts);
        self
    }

    pub fn data(&self) -> &[u8] {
        match &self.buffer {
            Some(buf) => buf.bytes(),
            None => &[],
        }
    }

    pub fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        if let Some(buf) = self.buffer.take() {
            buf.release();
        }
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.give_back();
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("pixel_format", &self.pixel_format)
            .field("stride", &self.stride)
            .field("len", &self.data().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingBuffer {
        data: Vec<u8>,
        released: Rc<Cell<u32>>,
    }

    impl FrameBuffer for CountingBuffer {
        fn bytes(&self) -> &[u8] {
            &self.data
        }

        fn release(self: Box<Self>) {
            self.released.set(self.released.get() + 1);
        }
    }

    fn counted_frame(released: &Rc<Cell<u32>>) -> RawFrame {
        let buf = CountingBuffer {
            data: vec![7u8; 4],
            released: Rc::clone(released),
        };
        RawFrame::new(2, 2, PixelFormat::Mono8, 2, Box::new(buf))
    }

    #[test]
    fn test_explicit_release_happens_once() {
        let released = Rc::new(Cell::new(0));
        let frame = counted_frame(&released);
        assert_eq!(frame.data(), &[7, 7, 7, 7]);
        frame.release();
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn test_drop_releases_unreleased_frame() {
        let released = Rc::new(Cell::new(0));
        {
            let _frame = counted_frame(&released);
        }
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn test_from_vec_is_tightly_packed() {
        let frame = RawFrame::from_vec(4, 2, PixelFormat::Bgra8, vec![0u8; 32]);
        assert_eq!(frame.channels, 4);
        assert_eq!(frame.stride, 16);
        assert!(frame.ts.is_none());
    }
}
