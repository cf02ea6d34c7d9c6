//! # rtsp-timeout-probe
//!
//! Probe how FFmpeg's cancellation mechanisms behave when grabbing frames
//! from a network video stream.
//!
//! FFmpeg offers two ways to stop a blocked read:
//!
//! - a **protocol timeout option** (`timeout`, `rw_timeout`) passed when the
//!   input is opened, and
//! - an **interrupt callback** on the format context, polled during blocking
//!   I/O.
//!
//! This crate wraps FFmpeg, via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate, in a thin
//! [`FrameGrabber`] and runs one [`Experiment`] per mechanism, printing what
//! FFmpeg does when the network is unavailable before connecting or the
//! connection drops mid-stream.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rtsp_timeout_probe::{Experiment, ExperimentOptions, TimeoutOption};
//!
//! let options = ExperimentOptions::new("rtsp://camera.local/stream")
//!     .with_timeout_option(TimeoutOption::Timeout);
//! Experiment::TimeoutOption.run(&options, &mut std::io::stdout())?;
//! # Ok::<(), rtsp_timeout_probe::ProbeError>(())
//! ```
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod configuration;
mod conversion;
pub mod error;
pub mod experiment;
pub mod ffmpeg;
pub mod grabber;
pub mod interrupt;
pub mod snapshot;
pub mod timeout;

pub use configuration::{GrabberOptions, PixelFormat, RtspTransport};
pub use error::ProbeError;
pub use experiment::{Experiment, ExperimentOptions, ExperimentReport, InterruptPlacement};
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use grabber::{FrameGrabber, GrabbedFrame, StreamEnd, StreamInfo};
pub use interrupt::{InterruptFlag, Watchdog};
pub use timeout::{DEFAULT_TIMEOUT, TimeoutOption};
