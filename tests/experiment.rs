//! Experiment transcript and report tests.
//!
//! Fixture-backed tests require files from `tests/fixtures/generate_fixtures.sh`.

use std::{path::Path, time::Duration};

use rtsp_timeout_probe::{
    Experiment, ExperimentOptions, ExperimentReport, InterruptPlacement, StreamEnd, TimeoutOption,
};

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

fn transcript(experiment: Experiment, options: &ExperimentOptions) -> (Vec<String>, ExperimentReport) {
    let mut out = Vec::new();
    let report = experiment
        .run(options, &mut out)
        .expect("writing to a Vec cannot fail");
    let text = String::from_utf8(out).expect("transcript is utf-8");
    (text.lines().map(str::to_string).collect(), report)
}

// ── unreachable input ────────────────────────────────────────────

#[test]
fn timeout_experiment_reports_open_failure() {
    let options = ExperimentOptions::new("this_file_does_not_exist.mp4")
        .with_timeout(Duration::from_secs(2))
        .with_timeout_option(TimeoutOption::RwTimeout);
    let (lines, report) = transcript(Experiment::TimeoutOption, &options);

    assert_eq!(
        lines.first().map(String::as_str),
        Some("opening this_file_does_not_exist.mp4 with rw_timeout=2000000")
    );
    assert!(lines.iter().any(|line| line.starts_with("exception: Failed to open input")));
    assert!(!lines.iter().any(|line| line.starts_with("loop end")));
    assert_eq!(lines.last().map(String::as_str), Some("end"));

    assert!(!report.succeeded());
    assert_eq!(report.frames_grabbed, 0);
    assert!(report.saved_frame.is_none());
    assert!(report.stream.is_none());
}

#[test]
fn interrupt_experiment_reports_open_failure() {
    let options = ExperimentOptions::new("this_file_does_not_exist.mp4")
        .with_interrupt_placement(InterruptPlacement::BeforeOpen);
    let (lines, report) = transcript(Experiment::InterruptCallback, &options);

    assert!(lines[0].starts_with("interrupt callback installed before open"));
    assert!(lines.iter().any(|line| line.starts_with("exception: ")));
    assert_eq!(lines.last().map(String::as_str), Some("end"));

    // The 10 second watchdog is disarmed, never fired.
    assert_eq!(report.interrupt_raised, Some(false));
    assert!(report.elapsed < Duration::from_secs(10));
}

// ── fixture-backed ───────────────────────────────────────────────

#[test]
fn timeout_experiment_saves_one_frame() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let output_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let options = ExperimentOptions::new(path).with_output_directory(output_directory.path());
    let (lines, report) = transcript(Experiment::TimeoutOption, &options);

    assert!(report.succeeded(), "transcript: {lines:?}");
    assert!(lines.iter().any(|line| line.starts_with("frame grabbed at ")));
    assert!(lines.iter().any(|line| line.starts_with("loop end with frame: frame #0")));
    assert_eq!(lines.last().map(String::as_str), Some("end"));

    // One frame for the grab, one for the image.
    assert_eq!(report.frames_grabbed, 2);
    let saved = report.saved_frame.expect("a frame should be saved");
    assert_eq!(saved.parent(), Some(output_directory.path()));
    assert_eq!(saved.extension().and_then(|ext| ext.to_str()), Some("jpg"));

    let image = image::open(&saved).expect("saved frame should be a readable JPEG");
    assert_eq!((image.width(), image.height()), (320, 240));
}

#[test]
fn timeout_experiment_survives_unwritable_output() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let options = ExperimentOptions::new(path).with_output_directory("/nonexistent/output/dir");
    let (lines, report) = transcript(Experiment::TimeoutOption, &options);

    assert!(report.succeeded());
    assert!(report.saved_frame.is_none());
    assert!(lines.iter().any(|line| line.starts_with("loop end with frame: ")));
    assert_eq!(lines.last().map(String::as_str), Some("end"));
}

#[test]
fn interrupt_experiment_honours_max_frames() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let options = ExperimentOptions::new(path).with_max_frames(5);
    let (lines, report) = transcript(Experiment::InterruptCallback, &options);

    assert!(report.succeeded());
    assert_eq!(report.frames_grabbed, 5);
    assert_eq!(
        lines.iter().filter(|line| line.starts_with("frame grabbed at ")).count(),
        5
    );
    assert!(lines.iter().any(|line| line.starts_with("interrupt callback installed after start")));
    assert_eq!(report.interrupt_raised, Some(false));
    assert_eq!(lines.last().map(String::as_str), Some("end"));
}

#[test]
fn interrupt_experiment_reads_to_end_of_file() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let options = ExperimentOptions::new(path);
    let (lines, report) = transcript(Experiment::InterruptCallback, &options);

    assert!(report.succeeded());
    assert_eq!(report.end_reason, Some(StreamEnd::EndOfStream));
    assert!(lines.iter().any(|line| line == "stream ended: end of stream"));
    assert!(report.last_timestamp.is_some());
}

#[test]
fn interrupt_before_open_aborts_the_open() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let options = ExperimentOptions::new(path)
        .with_timeout(Duration::ZERO)
        .with_interrupt_placement(InterruptPlacement::BeforeOpen);
    let (lines, report) = transcript(Experiment::InterruptCallback, &options);

    assert!(lines.iter().any(|line| line.starts_with("exception: ")), "transcript: {lines:?}");
    assert!(!report.succeeded());
    assert_eq!(report.frames_grabbed, 0);
    assert_eq!(report.interrupt_raised, Some(true));
    assert!(report.interrupt_polls > Some(0));
    assert_eq!(lines.last().map(String::as_str), Some("end"));
}

#[test]
fn interrupt_after_start_cuts_the_stream_short() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let options = ExperimentOptions::new(path).with_timeout(Duration::ZERO);
    let (lines, report) = transcript(Experiment::InterruptCallback, &options);

    assert!(report.succeeded());
    assert_eq!(report.end_reason, Some(StreamEnd::Interrupted));
    assert_eq!(report.interrupt_raised, Some(true));
    assert!(report.frames_grabbed < 40);
    assert!(lines.iter().any(|line| line == "stream ended: interrupted"), "transcript: {lines:?}");
    assert!(lines.iter().any(|line| line.starts_with("interrupt flag raised: true")));
}
