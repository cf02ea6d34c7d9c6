//! Error types for the `rtsp-timeout-probe` crate.
//!
//! This module defines [`ProbeError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry the URL or option that was
//! involved together with FFmpeg's own error text, so the experiment runners
//! can print them verbatim.

use std::io::Error as IoError;

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all probe operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProbeError {
    /// The input could not be opened (`avformat_open_input` or
    /// `avformat_find_stream_info` failed).
    #[error("Failed to open input {url}: {reason}")]
    Open {
        /// URL or path that was passed to [`crate::FrameGrabber::start`].
        url: String,
        /// FFmpeg's description of the failure.
        reason: String,
    },

    /// The requested demuxer name is not registered with FFmpeg.
    #[error("Unknown input format: {0}")]
    UnknownInputFormat(String),

    /// An argument could not be handed to FFmpeg (for example a URL with an
    /// interior NUL byte).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A textual option value could not be parsed.
    #[error("Invalid option value: {0}")]
    InvalidOption(String),

    /// The input does not contain a video stream.
    #[error("No video stream found in input")]
    NoVideoStream,

    /// A video frame could not be decoded or converted.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while writing output.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for ProbeError {
    fn from(error: FfmpegError) -> Self {
        ProbeError::FfmpegError(error.to_string())
    }
}
