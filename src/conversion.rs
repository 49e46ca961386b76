//! FFmpeg frame and timestamp conversion helpers.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};
use image::{DynamicImage, RgbImage};

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer,
/// dropping any row padding.
///
/// `bytes_per_pixel` is 3 for RGB24.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_length = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_length {
        data[..row_length * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_length * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_length]);
        }
        buffer
    }
}

/// Build an image from a scaled RGB24 frame. `None` if the frame is smaller
/// than its declared size.
pub(crate) fn rgb_frame_to_image(rgb_frame: &VideoFrame) -> Option<DynamicImage> {
    let (width, height) = (rgb_frame.width(), rgb_frame.height());
    let buffer = frame_to_buffer(rgb_frame, width, height, 3);
    RgbImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgb8)
}

/// Rescale a PTS value from the stream time base to milliseconds.
pub(crate) fn pts_to_milliseconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator()) * 1000.0
}
