//! The two timeout experiments.
//!
//! Each experiment opens a stream with a [`FrameGrabber`], grabs frames, and
//! writes a line-oriented transcript of what happened to any [`Write`]
//! sink. Library failures never abort an experiment: they are printed as
//! `exception: ...` and recorded in the returned [`ExperimentReport`]. Only a
//! failure to write the transcript itself is returned as an error.
//!
//! What to expect from [`Experiment::TimeoutOption`] against a camera:
//!
//! - network disabled before starting: opening fails with a timeout error
//!   after the configured delay (`timeout`), or hangs (`rw_timeout`);
//! - connection lost after a few frames: `grab` reports the end of the
//!   stream instead of an error.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use rtsp_timeout_probe::{Experiment, ExperimentOptions};
//!
//! let options = ExperimentOptions::new("rtsp://camera.local/stream")
//!     .with_timeout(Duration::from_secs(5));
//! let report = Experiment::TimeoutOption.run(&options, &mut std::io::stdout())?;
//! println!("saved: {:?}", report.saved_frame);
//! # Ok::<(), rtsp_timeout_probe::ProbeError>(())
//! ```

use std::{
    fmt::{self, Display, Formatter},
    io::Write,
    path::PathBuf,
    time::{Duration, Instant},
};

use crate::{
    configuration::GrabberOptions,
    error::ProbeError,
    grabber::{FrameGrabber, GrabbedFrame, StreamEnd, StreamInfo},
    interrupt::{InterruptFlag, Watchdog},
    snapshot,
    timeout::{DEFAULT_TIMEOUT, TimeoutOption},
};

/// Which cancellation mechanism to exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Experiment {
    /// Open with a protocol timeout option, grab one frame, and save it as
    /// a JPEG.
    TimeoutOption,
    /// Open, install an interrupt callback, raise it from a watchdog thread
    /// after the timeout, and grab frames until the stream ends.
    InterruptCallback,
}

impl Experiment {
    pub fn name(self) -> &'static str {
        match self {
            Experiment::TimeoutOption => "timeout",
            Experiment::InterruptCallback => "interrupt",
        }
    }

    /// Run the experiment, writing its transcript to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::IoError`] only if writing to `out` fails.
    pub fn run<W: Write>(
        self,
        options: &ExperimentOptions,
        out: &mut W,
    ) -> Result<ExperimentReport, ProbeError> {
        log::debug!("Running {} experiment against {}", self.name(), options.url);
        match self {
            Experiment::TimeoutOption => run_timeout_option(options, out),
            Experiment::InterruptCallback => run_interrupt_callback(options, out),
        }
    }
}

impl Display for Experiment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// When the interrupt callback is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptPlacement {
    /// After the input has been opened. Cannot abort a connect attempt.
    #[default]
    AfterStart,
    /// Before `avformat_open_input`, with the watchdog armed immediately.
    BeforeOpen,
}

/// Settings shared by both experiments.
#[derive(Debug, Clone)]
pub struct ExperimentOptions {
    pub(crate) url: String,
    pub(crate) timeout: Duration,
    pub(crate) timeout_option: TimeoutOption,
    pub(crate) output_directory: PathBuf,
    pub(crate) placement: InterruptPlacement,
    pub(crate) max_frames: Option<u64>,
    pub(crate) grabber: GrabberOptions,
}

impl ExperimentOptions {
    /// Defaults: 10 second `timeout` option, frames saved to the current
    /// directory, interrupt installed after start, no frame limit.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
            timeout_option: TimeoutOption::default(),
            output_directory: PathBuf::from("."),
            placement: InterruptPlacement::default(),
            max_frames: None,
            grabber: GrabberOptions::new(),
        }
    }

    /// Protocol timeout, and the watchdog delay of the interrupt experiment.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_option(mut self, option: TimeoutOption) -> Self {
        self.timeout_option = option;
        self
    }

    /// Where the timeout experiment saves its frame.
    pub fn with_output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output_directory = directory.into();
        self
    }

    pub fn with_interrupt_placement(mut self, placement: InterruptPlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Stop the interrupt experiment after this many frames.
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Base grabber options (demuxer, extra options, transport).
    pub fn with_grabber_options(mut self, grabber: GrabberOptions) -> Self {
        self.grabber = grabber;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// What an experiment observed.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub experiment: Experiment,
    pub url: String,
    /// Frames decoded, including the one converted to an image.
    pub frames_grabbed: u64,
    /// Timestamp of the last grabbed frame in microseconds.
    pub last_timestamp: Option<i64>,
    /// JPEG written by the timeout experiment.
    pub saved_frame: Option<PathBuf>,
    pub end_reason: Option<StreamEnd>,
    /// Text of the error that ended the experiment early.
    pub error: Option<String>,
    pub stream: Option<StreamInfo>,
    /// Options FFmpeg did not consume when opening.
    pub unused_options: Vec<(String, String)>,
    /// Whether the watchdog raised the interrupt flag (interrupt experiment).
    pub interrupt_raised: Option<bool>,
    /// How often FFmpeg polled the interrupt callback.
    pub interrupt_polls: Option<u64>,
    pub elapsed: Duration,
}

impl ExperimentReport {
    fn new(experiment: Experiment, url: &str) -> Self {
        Self {
            experiment,
            url: url.to_string(),
            frames_grabbed: 0,
            last_timestamp: None,
            saved_frame: None,
            end_reason: None,
            error: None,
            stream: None,
            unused_options: Vec::new(),
            interrupt_raised: None,
            interrupt_polls: None,
            elapsed: Duration::ZERO,
        }
    }

    fn absorb(&mut self, grabber: &FrameGrabber) {
        self.frames_grabbed = grabber.frames_grabbed();
        if self.frames_grabbed > 0 {
            self.last_timestamp = Some(grabber.timestamp());
        }
        self.end_reason = grabber.end_reason().cloned();
        self.stream = Some(grabber.stream_info().clone());
        self.unused_options = grabber.unused_options().to_vec();
    }

    /// Whether the experiment finished without an error.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

fn describe(frame: Option<&GrabbedFrame>) -> String {
    frame.map_or_else(|| "none".to_string(), |frame| frame.to_string())
}

fn run_timeout_option<W: Write>(
    options: &ExperimentOptions,
    out: &mut W,
) -> Result<ExperimentReport, ProbeError> {
    let started = Instant::now();
    let mut report = ExperimentReport::new(Experiment::TimeoutOption, &options.url);

    let grabber_options = options
        .grabber
        .clone()
        .with_timeout(options.timeout_option, options.timeout);
    writeln!(
        out,
        "opening {} with {}={}",
        options.url,
        options.timeout_option.key(),
        options.timeout_option.format_value(options.timeout),
    )?;

    match FrameGrabber::start(&options.url, &grabber_options) {
        Err(error) => {
            writeln!(out, "exception: {error}")?;
            report.error = Some(error.to_string());
        }
        Ok(mut grabber) => {
            let mut last_frame = None;
            match grabber.grab() {
                Ok(Some(frame)) => {
                    writeln!(out, "frame grabbed at {}", grabber.timestamp())?;
                    match grabber.grab_image() {
                        Ok(Some(image)) => {
                            let prefix = snapshot::timestamped_prefix(&options.output_directory);
                            match snapshot::write_frame_to_file(&image, prefix) {
                                Ok(path) => {
                                    writeln!(out, "frame saved to {}", path.display())?;
                                    report.saved_frame = Some(path);
                                }
                                Err(error) => writeln!(out, "{error}")?,
                            }
                        }
                        Ok(None) => writeln!(out, "no image frame before the stream ended")?,
                        Err(error) => writeln!(out, "{error}")?,
                    }
                    last_frame = Some(frame);
                }
                Ok(None) => {}
                Err(error) => {
                    writeln!(out, "exception: {error}")?;
                    report.error = Some(error.to_string());
                }
            }
            writeln!(out, "loop end with frame: {}", describe(last_frame.as_ref()))?;
            if let Some(end) = grabber.end_reason() {
                writeln!(out, "stream ended: {end}")?;
            }
            report.absorb(&grabber);
        }
    }

    writeln!(out, "end")?;
    report.elapsed = started.elapsed();
    Ok(report)
}

fn run_interrupt_callback<W: Write>(
    options: &ExperimentOptions,
    out: &mut W,
) -> Result<ExperimentReport, ProbeError> {
    let started = Instant::now();
    let mut report = ExperimentReport::new(Experiment::InterruptCallback, &options.url);

    let flag = InterruptFlag::new();
    let mut grabber_options = options.grabber.clone();
    let mut watchdog = None;

    if options.placement == InterruptPlacement::BeforeOpen {
        grabber_options = grabber_options.with_interrupt_before_open(flag.clone());
        watchdog = Some(Watchdog::arm(flag.clone(), options.timeout));
        writeln!(
            out,
            "interrupt callback installed before open, raising in {:?}",
            options.timeout
        )?;
    }

    match FrameGrabber::start(&options.url, &grabber_options) {
        Err(error) => {
            writeln!(out, "exception: {error}")?;
            report.error = Some(error.to_string());
        }
        Ok(mut grabber) => {
            if options.placement == InterruptPlacement::AfterStart {
                grabber.install_interrupt(&flag);
                watchdog = Some(Watchdog::arm(flag.clone(), options.timeout));
                writeln!(
                    out,
                    "interrupt callback installed after start, raising in {:?}",
                    options.timeout
                )?;
            }

            let mut last_frame = None;
            loop {
                if options
                    .max_frames
                    .is_some_and(|max_frames| grabber.frames_grabbed() >= max_frames)
                {
                    break;
                }
                match grabber.grab() {
                    Ok(Some(frame)) => {
                        writeln!(out, "frame grabbed at {}", frame.timestamp())?;
                        last_frame = Some(frame);
                    }
                    Ok(None) => break,
                    Err(error) => {
                        writeln!(out, "exception: {error}")?;
                        report.error = Some(error.to_string());
                        break;
                    }
                }
            }

            writeln!(out, "loop end with frame: {}", describe(last_frame.as_ref()))?;
            if let Some(end) = grabber.end_reason() {
                writeln!(out, "stream ended: {end}")?;
            }
            report.absorb(&grabber);
        }
    }

    if let Some(watchdog) = watchdog {
        watchdog.disarm();
    }
    report.interrupt_raised = Some(flag.is_raised());
    report.interrupt_polls = Some(flag.polls());
    writeln!(
        out,
        "interrupt flag raised: {}, callback polled {} times",
        flag.is_raised(),
        flag.polls()
    )?;

    writeln!(out, "end")?;
    report.elapsed = started.elapsed();
    Ok(report)
}
