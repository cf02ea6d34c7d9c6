//! GrabberOptions, TimeoutOption, RtspTransport, and PixelFormat tests.

use std::time::Duration;

use rtsp_timeout_probe::{
    DEFAULT_TIMEOUT, FfmpegLogLevel, GrabberOptions, InterruptFlag, PixelFormat, RtspTransport,
    TimeoutOption,
};

// ── TimeoutOption ────────────────────────────────────────────────

#[test]
fn timeout_option_keys() {
    assert_eq!(TimeoutOption::Timeout.key(), "timeout");
    assert_eq!(TimeoutOption::RwTimeout.key(), "rw_timeout");
    assert_eq!(TimeoutOption::RwTimeout.to_string(), "rw_timeout");
}

#[test]
fn timeout_values_are_microseconds() {
    assert_eq!(TimeoutOption::Timeout.format_value(DEFAULT_TIMEOUT), "10000000");
    assert_eq!(
        TimeoutOption::RwTimeout.format_value(Duration::from_millis(1500)),
        "1500000"
    );
    assert_eq!(TimeoutOption::Timeout.format_value(Duration::ZERO), "0");
}

#[test]
fn timeout_option_parsing() {
    assert_eq!("timeout".parse::<TimeoutOption>().ok(), Some(TimeoutOption::Timeout));
    assert_eq!("RW_TIMEOUT".parse::<TimeoutOption>().ok(), Some(TimeoutOption::RwTimeout));
    assert_eq!("rw-timeout".parse::<TimeoutOption>().ok(), Some(TimeoutOption::RwTimeout));

    let error = "stimeout".parse::<TimeoutOption>().unwrap_err();
    assert!(error.to_string().contains("stimeout"));
}

// ── GrabberOptions builder ───────────────────────────────────────

#[test]
fn default_options_are_empty() {
    let options = GrabberOptions::new();
    assert!(options.option_pairs().is_empty());
    assert_eq!(options.format(), None);

    let debug = format!("{options:?}");
    assert!(debug.contains("GrabberOptions"));
    assert!(debug.contains("interrupt_before_open: false"));
    assert!(debug.contains("pixel_format: Rgb8"));
}

#[test]
fn option_pairs_keep_insertion_order() {
    let options = GrabberOptions::new()
        .with_rtsp_transport(RtspTransport::Udp)
        .with_timeout(TimeoutOption::RwTimeout, Duration::from_secs(3))
        .with_option("max_delay", "500000")
        .with_option("buffer_size", "1024000");

    assert_eq!(
        options.option_pairs(),
        vec![
            ("max_delay".to_string(), "500000".to_string()),
            ("buffer_size".to_string(), "1024000".to_string()),
            ("rw_timeout".to_string(), "3000000".to_string()),
            ("rtsp_transport".to_string(), "udp".to_string()),
        ]
    );
}

#[test]
fn later_timeout_replaces_earlier() {
    let options = GrabberOptions::new()
        .with_timeout(TimeoutOption::RwTimeout, Duration::from_secs(1))
        .with_timeout(TimeoutOption::Timeout, Duration::from_secs(2));

    assert_eq!(
        options.option_pairs(),
        vec![("timeout".to_string(), "2000000".to_string())]
    );
}

#[test]
fn interrupt_and_format_show_in_debug() {
    let options = GrabberOptions::new()
        .with_format("rtsp")
        .with_interrupt_before_open(InterruptFlag::new())
        .with_pixel_format(PixelFormat::Gray8);

    assert_eq!(options.format(), Some("rtsp"));
    let debug = format!("{options:?}");
    assert!(debug.contains("interrupt_before_open: true"));
    assert!(debug.contains("Gray8"));
}

// ── string parsing ───────────────────────────────────────────────

#[test]
fn transport_parsing() {
    assert_eq!("TCP".parse::<RtspTransport>().ok(), Some(RtspTransport::Tcp));
    assert_eq!("udp".parse::<RtspTransport>().ok(), Some(RtspTransport::Udp));
    assert!("http".parse::<RtspTransport>().is_err());
    assert_eq!(RtspTransport::Tcp.to_string(), "tcp");
}

#[test]
fn pixel_format_parsing() {
    assert_eq!("rgb".parse::<PixelFormat>().ok(), Some(PixelFormat::Rgb8));
    assert_eq!("grayscale".parse::<PixelFormat>().ok(), Some(PixelFormat::Gray8));
    assert!("rgba8".parse::<PixelFormat>().is_err());
    assert_eq!(PixelFormat::default(), PixelFormat::Rgb8);
}

#[test]
fn ffmpeg_log_level_parsing() {
    assert_eq!("warn".parse::<FfmpegLogLevel>().ok(), Some(FfmpegLogLevel::Warning));
    assert_eq!("QUIET".parse::<FfmpegLogLevel>().ok(), Some(FfmpegLogLevel::Quiet));
    assert!("loud".parse::<FfmpegLogLevel>().is_err());
}
