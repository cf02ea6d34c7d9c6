//! Frame grabbing over FFmpeg.
//!
//! [`FrameGrabber`] opens a stream (RTSP or anything else FFmpeg can demux),
//! decodes its best video stream, and hands out frames one at a time. It is
//! deliberately thin: connection handling, timeouts, and interruption all
//! happen inside FFmpeg, and the grabber only reports what FFmpeg did.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use rtsp_timeout_probe::{FrameGrabber, GrabberOptions, TimeoutOption};
//!
//! let options = GrabberOptions::new()
//!     .with_timeout(TimeoutOption::Timeout, Duration::from_secs(10));
//! let mut grabber = FrameGrabber::start("rtsp://camera.local/stream", &options)?;
//!
//! while let Some(frame) = grabber.grab()? {
//!     println!("frame grabbed at {}", frame.timestamp());
//! }
//! println!("stream ended: {:?}", grabber.end_reason());
//! # Ok::<(), rtsp_timeout_probe::ProbeError>(())
//! ```

use std::{
    ffi::CString,
    fmt::{self, Debug, Display, Formatter},
    io::{Error as IoError, ErrorKind},
    thread,
    time::Duration,
};

use ffmpeg_next::{
    Dictionary, Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, GrayImage, RgbImage};

use crate::{
    configuration::{GrabberOptions, PixelFormat},
    conversion::{frame_to_buffer, pts_to_microseconds},
    error::ProbeError,
    interrupt::{self, InterruptFlag},
};

const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Why a [`FrameGrabber`] stopped producing frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The demuxer reached the end of the input.
    EndOfStream,
    /// A protocol timeout fired while reading.
    TimedOut,
    /// The interrupt callback asked FFmpeg to abort (`AVERROR_EXIT`).
    Interrupted,
    /// Reading failed for another reason, typically a dropped connection.
    ReadFailed(String),
}

impl StreamEnd {
    /// Classify an `av_read_frame` error. `None` means the read should simply
    /// be retried.
    fn from_read_error(error: &FfmpegError) -> Option<Self> {
        match error {
            FfmpegError::Eof => Some(StreamEnd::EndOfStream),
            FfmpegError::Exit => Some(StreamEnd::Interrupted),
            FfmpegError::Other { errno } => match IoError::from_raw_os_error(*errno).kind() {
                ErrorKind::WouldBlock => None,
                ErrorKind::TimedOut => Some(StreamEnd::TimedOut),
                _ => Some(StreamEnd::ReadFailed(error.to_string())),
            },
            other => Some(StreamEnd::ReadFailed(other.to_string())),
        }
    }
}

impl Display for StreamEnd {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::EndOfStream => f.write_str("end of stream"),
            StreamEnd::TimedOut => f.write_str("timed out"),
            StreamEnd::Interrupted => f.write_str("interrupted"),
            StreamEnd::ReadFailed(reason) => write!(f, "read failed: {reason}"),
        }
    }
}

/// Basic facts about the opened input and its video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Demuxer name (e.g. `rtsp`, `mov,mp4,m4a,3gp,3g2,mj2`).
    pub format: String,
    /// Video codec name.
    pub codec: String,
    /// Coded width in pixels (0 until known for some live streams).
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Average frame rate, or 0.0 when the stream does not declare one.
    pub frames_per_second: f64,
}

/// A decoded video frame.
pub struct GrabbedFrame {
    frame: VideoFrame,
    number: u64,
    timestamp: i64,
    pixel_format: PixelFormat,
}

impl GrabbedFrame {
    /// Zero-based position of this frame in the grab sequence.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Presentation timestamp in microseconds, relative to the stream start.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn is_key_frame(&self) -> bool {
        self.frame.is_key()
    }

    /// Convert the frame to an image in the grabber's pixel format.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::VideoDecodeError`] if the frame has no usable
    /// pixel format or the converted buffer does not match its dimensions.
    pub fn to_image(&self) -> Result<DynamicImage, ProbeError> {
        let width = self.frame.width();
        let height = self.frame.height();
        if width == 0 || height == 0 {
            return Err(ProbeError::VideoDecodeError(format!(
                "frame {} has empty dimensions",
                self.number
            )));
        }

        let mut scaler = ScalingContext::get(
            self.frame.format(),
            width,
            height,
            self.pixel_format.to_ffmpeg_pixel(),
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;
        let mut converted = VideoFrame::empty();
        scaler.run(&self.frame, &mut converted)?;

        let buffer = frame_to_buffer(
            &converted,
            width,
            height,
            self.pixel_format.bytes_per_pixel(),
        );
        let image = match self.pixel_format {
            PixelFormat::Rgb8 => {
                RgbImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Gray8 => {
                GrayImage::from_raw(width, height, buffer).map(DynamicImage::ImageLuma8)
            }
        };
        image.ok_or_else(|| {
            ProbeError::VideoDecodeError(format!(
                "converted buffer does not match {width}x{height}"
            ))
        })
    }
}

impl Debug for GrabbedFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrabbedFrame")
            .field("number", &self.number)
            .field("timestamp", &self.timestamp)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("key_frame", &self.is_key_frame())
            .finish()
    }
}

impl Display for GrabbedFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame #{} at {} us ({}x{}{})",
            self.number,
            self.timestamp,
            self.width(),
            self.height(),
            if self.is_key_frame() { ", key" } else { "" },
        )
    }
}

/// Opens a stream and yields decoded video frames one at a time.
pub struct FrameGrabber {
    // Dropped before `interrupts`: closing the input may still poll the
    // interrupt callback.
    input: Input,
    decoder: VideoDecoder,
    stream_index: usize,
    time_base: Rational,
    start_time: Option<i64>,
    pixel_format: PixelFormat,
    url: String,
    info: StreamInfo,
    unused_options: Vec<(String, String)>,
    timestamp: i64,
    frames_grabbed: u64,
    end: Option<StreamEnd>,
    interrupts: Vec<InterruptFlag>,
}

impl FrameGrabber {
    /// Open `url` and prepare a decoder for its best video stream.
    ///
    /// When `options` carries an interrupt flag it is installed before
    /// connecting, so raising it aborts the connect phase as well.
    ///
    /// # Errors
    ///
    /// - [`ProbeError::InvalidArgument`] if the URL or an option contains a
    ///   NUL byte.
    /// - [`ProbeError::UnknownInputFormat`] if a forced demuxer is unknown.
    /// - [`ProbeError::Open`] if FFmpeg cannot open the input or read its
    ///   stream info (including timeouts and interruption while connecting).
    /// - [`ProbeError::NoVideoStream`] if the input carries no video.
    pub fn start(url: &str, options: &GrabberOptions) -> Result<Self, ProbeError> {
        log::debug!("Opening {url} with {options:?}");

        ffmpeg_next::init().map_err(|error| ProbeError::Open {
            url: url.to_string(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let (input, unused_options) = open_input(url, options)?;
        for (key, value) in &unused_options {
            log::warn!("Option {key}={value} was not consumed while opening {url}");
        }

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(ProbeError::NoVideoStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();

        let frame_rate = stream.avg_frame_rate();
        let frames_per_second = if frame_rate.denominator() != 0 {
            f64::from(frame_rate.numerator()) / f64::from(frame_rate.denominator())
        } else {
            0.0
        };

        let decoder_context = CodecContext::from_parameters(stream.parameters())?;
        let decoder = decoder_context.decoder().video()?;

        let info = StreamInfo {
            format: input.format().name().to_string(),
            codec: decoder
                .codec()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            width: decoder.width(),
            height: decoder.height(),
            frames_per_second,
        };

        // SAFETY: `input` owns a live, opened format context.
        let start_time = unsafe { (*input.as_ptr()).start_time };
        // AV_NOPTS_VALUE
        let start_time = (start_time != i64::MIN).then_some(start_time);

        log::debug!(
            "Video stream: index={stream_index}, {}x{} @ {:.2} fps, codec={}, format={}",
            info.width,
            info.height,
            info.frames_per_second,
            info.codec,
            info.format,
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            time_base,
            start_time,
            pixel_format: options.pixel_format,
            url: url.to_string(),
            info,
            unused_options,
            timestamp: 0,
            frames_grabbed: 0,
            end: None,
            interrupts: options.interrupt.iter().cloned().collect(),
        })
    }

    /// Install `flag` as the interrupt callback of the opened input.
    ///
    /// Replaces any callback installed before opening. Once `flag` is raised,
    /// [`grab`](FrameGrabber::grab) stops reading and ends the stream with
    /// [`StreamEnd::Interrupted`], even if the demuxer never polls the
    /// callback.
    pub fn install_interrupt(&mut self, flag: &InterruptFlag) {
        interrupt::install(&mut self.input, flag);
        self.interrupts.push(flag.clone());
        log::debug!("Interrupt callback installed on {}", self.url);
    }

    /// Grab the next video frame.
    ///
    /// Returns `Ok(None)` once the stream has ended, whether by reaching its
    /// end, timing out, being interrupted, or losing the connection. A lost
    /// connection is not reported as an error: check
    /// [`end_reason`](FrameGrabber::end_reason) to tell these apart.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::VideoDecodeError`] if the decoder rejects a
    /// packet for a reason other than corrupt data.
    pub fn grab(&mut self) -> Result<Option<GrabbedFrame>, ProbeError> {
        let mut decoded = VideoFrame::empty();

        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(Some(self.accept(decoded)));
            }
            if self.end.is_some() {
                return Ok(None);
            }
            if self.interrupts.iter().any(InterruptFlag::is_raised) {
                log::debug!("Interrupt raised, no more reads from {}", self.url);
                self.end = Some(StreamEnd::Interrupted);
                let _ = self.decoder.send_eof();
                continue;
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    match self.decoder.send_packet(&packet) {
                        Ok(()) => {}
                        Err(FfmpegError::InvalidData) => {
                            log::debug!("Skipping corrupt packet from {}", self.url);
                        }
                        Err(error) => {
                            return Err(ProbeError::VideoDecodeError(error.to_string()));
                        }
                    }
                }
                Err(error) => match StreamEnd::from_read_error(&error) {
                    Some(end) => {
                        log::debug!("Reading {} stopped: {end}", self.url);
                        self.end = Some(end);
                        let _ = self.decoder.send_eof();
                    }
                    None => thread::sleep(RETRY_DELAY),
                },
            }
        }
    }

    /// Grab the next video frame and convert it to an image.
    pub fn grab_image(&mut self) -> Result<Option<DynamicImage>, ProbeError> {
        self.grab()?.map(|frame| frame.to_image()).transpose()
    }

    /// Timestamp of the most recently grabbed frame, in microseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Number of frames grabbed so far.
    pub fn frames_grabbed(&self) -> u64 {
        self.frames_grabbed
    }

    /// Why the stream stopped, once [`grab`](FrameGrabber::grab) has
    /// returned `Ok(None)`.
    pub fn end_reason(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    /// Options FFmpeg did not recognise while opening the input.
    pub fn unused_options(&self) -> &[(String, String)] {
        &self.unused_options
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn accept(&mut self, decoded: VideoFrame) -> GrabbedFrame {
        if let Some(pts) = decoded.timestamp().or_else(|| decoded.pts()) {
            let microseconds = pts_to_microseconds(pts, self.time_base);
            self.timestamp = match self.start_time {
                Some(start_time) => microseconds.saturating_sub(start_time),
                None => microseconds,
            };
        }

        let frame = GrabbedFrame {
            frame: decoded,
            number: self.frames_grabbed,
            timestamp: self.timestamp,
            pixel_format: self.pixel_format,
        };
        self.frames_grabbed += 1;
        log::trace!("Grabbed {frame}");
        frame
    }
}

impl Debug for FrameGrabber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGrabber")
            .field("url", &self.url)
            .field("stream_index", &self.stream_index)
            .field("info", &self.info)
            .field("frames_grabbed", &self.frames_grabbed)
            .field("end", &self.end)
            .finish()
    }
}

/// Open `url` through the raw FFmpeg API so that an interrupt callback can
/// be in place before connecting. Returns the input together with the
/// options FFmpeg left unconsumed.
fn open_input(
    url: &str,
    options: &GrabberOptions,
) -> Result<(Input, Vec<(String, String)>), ProbeError> {
    let url_c = CString::new(url)
        .map_err(|error| ProbeError::InvalidArgument(format!("URL {url:?}: {error}")))?;
    let format_c = options
        .format
        .as_deref()
        .map(CString::new)
        .transpose()
        .map_err(|error| ProbeError::InvalidArgument(format!("input format: {error}")))?;
    if options
        .option_pairs()
        .iter()
        .any(|(key, value)| key.contains('\0') || value.contains('\0'))
    {
        return Err(ProbeError::InvalidArgument(
            "option keys and values must not contain NUL bytes".to_string(),
        ));
    }

    // SAFETY: The sequence mirrors `avformat_open_input`'s contract:
    //   1. allocate a context and set its interrupt callback
    //   2. open the input; on failure FFmpeg frees the context itself
    //   3. read stream info; on failure we close the input
    //   4. hand the context to `Input`, which closes it on drop
    // The option dictionary is disowned for the call and re-owned afterwards
    // so that FFmpeg can replace it with the unconsumed entries.
    unsafe {
        let input_format = match &format_c {
            Some(name) => {
                let found = ffmpeg_sys_next::av_find_input_format(name.as_ptr());
                if found.is_null() {
                    return Err(ProbeError::UnknownInputFormat(
                        name.to_string_lossy().into_owned(),
                    ));
                }
                found
            }
            None => std::ptr::null(),
        };

        let mut context = ffmpeg_sys_next::avformat_alloc_context();
        if context.is_null() {
            return Err(ProbeError::Open {
                url: url.to_string(),
                reason: "Failed to allocate format context".to_string(),
            });
        }
        if let Some(flag) = &options.interrupt {
            (*context).interrupt_callback = flag.callback();
        }

        let mut raw_options = options.to_dictionary().disown();
        let open_result = ffmpeg_sys_next::avformat_open_input(
            &mut context,
            url_c.as_ptr(),
            input_format,
            &mut raw_options,
        );
        let leftover = Dictionary::own(raw_options);
        let unused_options = leftover
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        if open_result < 0 {
            return Err(ProbeError::Open {
                url: url.to_string(),
                reason: FfmpegError::from(open_result).to_string(),
            });
        }

        let info_result = ffmpeg_sys_next::avformat_find_stream_info(context, std::ptr::null_mut());
        if info_result < 0 {
            ffmpeg_sys_next::avformat_close_input(&mut context);
            return Err(ProbeError::Open {
                url: url.to_string(),
                reason: format!(
                    "Failed to read stream info: {}",
                    FfmpegError::from(info_result)
                ),
            });
        }

        Ok((Input::wrap(context), unused_options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_of_file_ends_stream() {
        assert_eq!(
            StreamEnd::from_read_error(&FfmpegError::Eof),
            Some(StreamEnd::EndOfStream)
        );
    }

    #[test]
    fn exit_means_interrupted() {
        assert_eq!(
            StreamEnd::from_read_error(&FfmpegError::Exit),
            Some(StreamEnd::Interrupted)
        );
    }

    // ETIMEDOUT and EAGAIN as numbered on Linux.
    #[cfg(target_os = "linux")]
    #[test]
    fn errno_classification() {
        assert_eq!(
            StreamEnd::from_read_error(&FfmpegError::Other { errno: 110 }),
            Some(StreamEnd::TimedOut)
        );
        assert_eq!(StreamEnd::from_read_error(&FfmpegError::Other { errno: 11 }), None);
    }

    #[test]
    fn other_errors_are_read_failures() {
        let end = StreamEnd::from_read_error(&FfmpegError::InvalidData);
        assert!(matches!(end, Some(StreamEnd::ReadFailed(_))));
    }

    #[test]
    fn stream_end_display() {
        assert_eq!(StreamEnd::TimedOut.to_string(), "timed out");
        assert_eq!(
            StreamEnd::ReadFailed("Connection reset".to_string()).to_string(),
            "read failed: Connection reset"
        );
    }
}
