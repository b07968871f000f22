//! Conversion of raw sensor buffers into [`DisplayFrame`]s.
//!
//! Supported layouts: `Mono8`, `RGB8`, `BGR8` and `BGRa8`. Input rows may be
//! padded (stride larger than `width * channels`); output is always tightly
//! packed RGB8.

use crate::{DisplayFrame, Result, StreamError};
use camera_transport::{PixelFormat, RawFrame};

type RowConverter = fn(&[u8], &mut [u8]);

fn gray_to_rgb(src: &[u8], dst: &mut [u8]) {
    for (d, &v) in dst.chunks_exact_mut(3).zip(src) {
        d.copy_from_slice(&[v, v, v]);
    }
}

fn bgr_to_rgb(src: &[u8], dst: &mut [u8]) {
    for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
        d.copy_from_slice(&[s[2], s[1], s[0]]);
    }
}

fn bgra_to_rgb(src: &[u8], dst: &mut [u8]) {
    for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
        d.copy_from_slice(&[s[2], s[1], s[0]]);
    }
}

fn rgb_copy(src: &[u8], dst: &mut [u8]) {
    dst.copy_from_slice(src);
}

fn converter(raw: &RawFrame) -> Result<RowConverter> {
    if raw.channels != raw.pixel_format.channels() {
        return Err(StreamError::UnsupportedFormat(format!(
            "{} frame with {} channels",
            raw.pixel_format, raw.channels
        )));
    }
    match raw.pixel_format {
        PixelFormat::Mono8 => Ok(gray_to_rgb),
        PixelFormat::Bgr8 => Ok(bgr_to_rgb),
        PixelFormat::Rgb8 => Ok(rgb_copy),
        PixelFormat::Bgra8 => Ok(bgra_to_rgb),
        other => Err(StreamError::UnsupportedFormat(format!(
            "no RGB conversion for {other} ({} channels)",
            other.channels()
        ))),
    }
}

/// Convert one raw frame to RGB8. The result owns its pixels and does not
/// borrow from `raw`, so the raw frame may be released right after.
pub fn normalize(raw: &RawFrame) -> Result<DisplayFrame> {
    let convert = converter(raw)?;
    let width = raw.width as usize;
    let height = raw.height as usize;
    let row_bytes = width * raw.channels as usize;

    if raw.stride < row_bytes {
        return Err(StreamError::UnsupportedFormat(format!(
            "stride {} shorter than a {row_bytes}-byte row",
            raw.stride
        )));
    }
    let needed = match height {
        0 => Some(0),
        h => raw
            .stride
            .checked_mul(h - 1)
            .and_then(|n| n.checked_add(row_bytes)),
    };
    let Some(needed) = needed else {
        return Err(StreamError::UnsupportedFormat(format!(
            "stride {} overflows a {height}-row frame",
            raw.stride
        )));
    };
    let src = raw.data();
    if src.len() < needed {
        return Err(StreamError::UnsupportedFormat(format!(
            "truncated buffer: {} of {needed} bytes",
            src.len()
        )));
    }

    let out_stride = width * DisplayFrame::CHANNELS;
    let mut data = vec![0u8; out_stride * height];
    if out_stride > 0 {
        for (y, dst) in data.chunks_exact_mut(out_stride).enumerate() {
            let start = y * raw.stride;
            convert(&src[start..start + row_bytes], dst);
        }
    }

    Ok(DisplayFrame {
        width: raw.width,
        height: raw.height,
        stride: out_stride,
        data,
        ts: raw.ts,
    })
}
