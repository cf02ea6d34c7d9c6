//! Internal conversion helpers.
//!
//! Pixel-data copying and timestamp rescaling shared by the grabber.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
///
/// `bytes_per_pixel` is the number of bytes per pixel for the output format
/// (3 for RGB24, 1 for GRAY8).
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Rescale a PTS value from the stream time base to microseconds.
pub(crate) fn pts_to_microseconds(pts: i64, time_base: Rational) -> i64 {
    let denominator = i128::from(time_base.denominator());
    if denominator == 0 {
        return 0;
    }
    let scaled = i128::from(pts) * i128::from(time_base.numerator()) * 1_000_000 / denominator;
    scaled.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescales_90khz_clock() {
        let time_base = Rational::new(1, 90_000);
        assert_eq!(pts_to_microseconds(90_000, time_base), 1_000_000);
        assert_eq!(pts_to_microseconds(3_600, time_base), 40_000);
    }

    #[test]
    fn rescales_millisecond_clock() {
        assert_eq!(pts_to_microseconds(1_500, Rational::new(1, 1_000)), 1_500_000);
    }

    #[test]
    fn zero_denominator_yields_zero() {
        assert_eq!(pts_to_microseconds(42, Rational::new(1, 0)), 0);
    }
}
