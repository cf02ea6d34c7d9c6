//! Grabber configuration.
//!
//! [`GrabberOptions`] is a builder that collects everything handed to
//! `avformat_open_input`: an optional demuxer name, the protocol option
//! dictionary (timeouts, RTSP transport, arbitrary key/value pairs), and an
//! interrupt flag to install before the connection is attempted.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use rtsp_timeout_probe::{GrabberOptions, RtspTransport, TimeoutOption};
//!
//! let options = GrabberOptions::new()
//!     .with_timeout(TimeoutOption::Timeout, Duration::from_secs(10))
//!     .with_rtsp_transport(RtspTransport::Tcp);
//!
//! assert_eq!(
//!     options.option_pairs(),
//!     vec![
//!         ("timeout".to_string(), "10000000".to_string()),
//!         ("rtsp_transport".to_string(), "tcp".to_string()),
//!     ],
//! );
//! ```

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    str::FromStr,
    time::Duration,
};

use ffmpeg_next::{Dictionary, format::Pixel};

use crate::{error::ProbeError, interrupt::InterruptFlag, timeout::TimeoutOption};

/// Output pixel format for grabbed images.
///
/// Both variants can be written as JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bpp). This is the default.
    #[default]
    Rgb8,
    /// 8-bit grayscale (8 bpp).
    Gray8,
}

impl PixelFormat {
    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Rgb8 => Pixel::RGB24,
            PixelFormat::Gray8 => Pixel::GRAY8,
        }
    }

    pub(crate) fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

impl FromStr for PixelFormat {
    type Err = ProbeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "rgb8" | "rgb" => Ok(PixelFormat::Rgb8),
            "gray8" | "gray" | "greyscale" | "grayscale" => Ok(PixelFormat::Gray8),
            other => Err(ProbeError::InvalidOption(format!(
                "unsupported pixel format '{other}'"
            ))),
        }
    }
}

/// Lower transport used by the RTSP demuxer (`rtsp_transport` option).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtspTransport {
    /// Interleave RTP over the RTSP TCP connection.
    Tcp,
    /// Plain UDP unicast.
    Udp,
}

impl RtspTransport {
    /// The option value FFmpeg expects.
    pub fn as_str(self) -> &'static str {
        match self {
            RtspTransport::Tcp => "tcp",
            RtspTransport::Udp => "udp",
        }
    }
}

impl Display for RtspTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for RtspTransport {
    type Err = ProbeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "tcp" => Ok(RtspTransport::Tcp),
            "udp" => Ok(RtspTransport::Udp),
            other => Err(ProbeError::InvalidOption(format!(
                "unsupported RTSP transport '{other}' (expected tcp or udp)"
            ))),
        }
    }
}

/// Options applied when a [`FrameGrabber`](crate::FrameGrabber) opens its
/// input.
///
/// Option pairs are passed to FFmpeg in this order: pairs added with
/// [`with_option`](GrabberOptions::with_option), then the timeout, then the
/// RTSP transport. A later pair with the same key overrides an earlier one.
#[derive(Clone, Default)]
pub struct GrabberOptions {
    pub(crate) format: Option<String>,
    pub(crate) options: Vec<(String, String)>,
    pub(crate) timeout: Option<(TimeoutOption, Duration)>,
    pub(crate) rtsp_transport: Option<RtspTransport>,
    pub(crate) interrupt: Option<InterruptFlag>,
    pub(crate) pixel_format: PixelFormat,
}

impl GrabberOptions {
    /// Create options that open the input with FFmpeg's defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a demuxer by name (e.g. `rtsp`, `lavfi`) instead of probing.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Add an arbitrary protocol/demuxer option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Set a protocol timeout option.
    pub fn with_timeout(mut self, option: TimeoutOption, duration: Duration) -> Self {
        self.timeout = Some((option, duration));
        self
    }

    /// Select the RTSP lower transport.
    pub fn with_rtsp_transport(mut self, transport: RtspTransport) -> Self {
        self.rtsp_transport = Some(transport);
        self
    }

    /// Install `flag` as the interrupt callback before the input is opened,
    /// so that it can also abort the connect phase.
    pub fn with_interrupt_before_open(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Set the pixel format of images returned by the grabber.
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// The forced demuxer name, if any.
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// The option pairs in the order they are handed to FFmpeg.
    pub fn option_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = self.options.clone();
        if let Some((option, duration)) = self.timeout {
            pairs.push((option.key().to_string(), option.format_value(duration)));
        }
        if let Some(transport) = self.rtsp_transport {
            pairs.push(("rtsp_transport".to_string(), transport.as_str().to_string()));
        }
        pairs
    }

    pub(crate) fn to_dictionary(&self) -> Dictionary<'static> {
        let mut dictionary = Dictionary::new();
        for (key, value) in self.option_pairs() {
            dictionary.set(&key, &value);
        }
        dictionary
    }
}

impl Debug for GrabberOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GrabberOptions")
            .field("format", &self.format)
            .field("options", &self.option_pairs())
            .field("interrupt_before_open", &self.interrupt.is_some())
            .field("pixel_format", &self.pixel_format)
            .finish()
    }
}
