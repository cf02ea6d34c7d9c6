//! Protocol-level timeout options.
//!
//! FFmpeg has no universal streaming timeout. Every protocol (FTP, HTTP,
//! RTMP, RTSP, SMB, SSH, TCP, UDP, UNIX) declares its own set of options, and
//! the same option name can mean different things depending on which
//! protocol consumes it. [`TimeoutOption`] names the two options that matter
//! when reading an RTSP stream.
//!
//! Observed behavior against RTSP cameras:
//!
//! - `timeout` works both when the network is unavailable before the
//!   connection is made and when the connection drops mid-stream.
//! - `rw_timeout` is ignored when the network is down before connecting. It
//!   only takes effect after a connection has been established.

use std::{fmt, str::FromStr, time::Duration};

use crate::error::ProbeError;

/// Timeout used by the experiments when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A protocol timeout option understood by FFmpeg.
///
/// Both options take their value in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeoutOption {
    /// `timeout`: for RTSP, the socket TCP I/O timeout.
    ///
    /// See <http://ffmpeg.org/ffmpeg-all.html#rtsp>.
    #[default]
    Timeout,
    /// `rw_timeout`: maximum time to wait for a (network) read or write
    /// operation to complete.
    ///
    /// See <http://ffmpeg.org/ffmpeg-all.html#Protocols>.
    RwTimeout,
}

impl TimeoutOption {
    /// The option key as passed to `avformat_open_input`.
    pub fn key(self) -> &'static str {
        match self {
            TimeoutOption::Timeout => "timeout",
            TimeoutOption::RwTimeout => "rw_timeout",
        }
    }

    /// Format a duration as the option value (whole microseconds).
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use rtsp_timeout_probe::TimeoutOption;
    ///
    /// assert_eq!(TimeoutOption::Timeout.format_value(Duration::from_secs(10)), "10000000");
    /// ```
    pub fn format_value(self, duration: Duration) -> String {
        duration.as_micros().to_string()
    }
}

impl fmt::Display for TimeoutOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TimeoutOption {
    type Err = ProbeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "timeout" => Ok(TimeoutOption::Timeout),
            "rw_timeout" | "rw-timeout" | "rwtimeout" => Ok(TimeoutOption::RwTimeout),
            other => Err(ProbeError::InvalidOption(format!(
                "unknown timeout option '{other}' (expected timeout or rw_timeout)"
            ))),
        }
    }
}
