use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use rtsp_timeout_probe::{
    Experiment, ExperimentOptions, ExperimentReport, FfmpegLogLevel, GrabberOptions,
    InterruptPlacement, PixelFormat, RtspTransport, TimeoutOption,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  rtsp-timeout-probe timeout rtsp://192.168.1.10/stream --seconds 10\n  rtsp-timeout-probe timeout rtsp://192.168.1.10/stream --option rw_timeout --transport tcp\n  rtsp-timeout-probe interrupt rtsp://192.168.1.10/stream --seconds 5 --before-open\n  rtsp-timeout-probe completions bash > rtsp-timeout-probe.bash";

#[derive(Debug, Parser)]
#[command(
    name = "rtsp-timeout-probe",
    version,
    about = "Probe FFmpeg timeout and interrupt behavior on network video streams",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print the experiment report as JSON after the transcript.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Parser, Clone, Default)]
struct StreamOptions {
    /// Force the demuxer (e.g. rtsp, lavfi) instead of probing.
    #[arg(long)]
    format: Option<String>,

    /// RTSP lower transport (tcp, udp).
    #[arg(long)]
    transport: Option<String>,

    /// Extra FFmpeg option as key=value. Repeatable.
    #[arg(short = 'o', long = "opt", value_name = "KEY=VALUE")]
    options: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open with a protocol timeout option, grab one frame, save it as JPEG.
    #[command(
        about = "Run the timeout-option experiment",
        after_help = "Examples:\n  rtsp-timeout-probe timeout rtsp://cam/stream --seconds 10 --out frames"
    )]
    Timeout {
        /// Stream URL or path.
        url: String,
        /// Timeout option to set (timeout, rw_timeout).
        #[arg(long, default_value = "timeout")]
        option: String,
        /// Timeout in seconds.
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        /// Directory for the saved frame.
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Pixel format of the saved frame (rgb8, gray8).
        #[arg(long)]
        pixel_format: Option<String>,
        #[command(flatten)]
        stream: StreamOptions,
    },

    /// Install an interrupt callback and raise it after a delay.
    #[command(
        about = "Run the interrupt-callback experiment",
        after_help = "Examples:\n  rtsp-timeout-probe interrupt rtsp://cam/stream --seconds 10\n  rtsp-timeout-probe interrupt rtsp://cam/stream --before-open"
    )]
    Interrupt {
        /// Stream URL or path.
        url: String,
        /// Seconds before the watchdog raises the interrupt flag.
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        /// Install the callback before connecting instead of after start.
        #[arg(long)]
        before_open: bool,
        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<u64>,
        #[command(flatten)]
        stream: StreamOptions,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_key_value(value: &str) -> Result<(String, String), Box<dyn std::error::Error>> {
    let (key, value) = value
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{value}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("option key cannot be empty in '{key}={value}'").into());
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_seconds(seconds: f64) -> Result<Duration, Box<dyn std::error::Error>> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("--seconds must be a non-negative number, got {seconds}").into());
    }
    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|error| format!("--seconds {seconds}: {error}"))?;
    Ok(duration)
}

fn grabber_options(stream: &StreamOptions) -> Result<GrabberOptions, Box<dyn std::error::Error>> {
    let mut options = GrabberOptions::new();

    if let Some(format) = &stream.format {
        options = options.with_format(format);
    }
    for pair in &stream.options {
        let (key, value) = parse_key_value(pair)?;
        options = options.with_option(key, value);
    }
    if let Some(transport) = &stream.transport {
        options = options.with_rtsp_transport(transport.parse::<RtspTransport>()?);
    }

    Ok(options)
}

/// `RUST_LOG` overrides this. The interrupt experiment shows every callback
/// poll.
fn default_log_filter(global: &GlobalOptions, command: &Commands) -> String {
    let level = if global.verbose { "debug" } else { "info" };
    match command {
        Commands::Interrupt { .. } => format!("{level},rtsp_timeout_probe::interrupt=trace"),
        _ => level.to_string(),
    }
}

fn apply_global_options(
    global: &GlobalOptions,
    command: &Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = default_log_filter(global, command);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Some(level) = &global.log_level {
        let parsed = level.parse::<FfmpegLogLevel>()?;
        rtsp_timeout_probe::set_ffmpeg_log_level(parsed);
    }

    Ok(())
}

fn report_json(report: &ExperimentReport) -> serde_json::Value {
    json!({
        "experiment": report.experiment.name(),
        "url": report.url,
        "frames_grabbed": report.frames_grabbed,
        "last_timestamp_us": report.last_timestamp,
        "saved_frame": report.saved_frame.as_ref().map(|path| path.display().to_string()),
        "end_reason": report.end_reason.as_ref().map(|end| end.to_string()),
        "error": report.error,
        "stream": report.stream.as_ref().map(|stream| json!({
            "format": stream.format,
            "codec": stream.codec,
            "width": stream.width,
            "height": stream.height,
            "fps": stream.frames_per_second,
        })),
        "unused_options": report
            .unused_options
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>(),
        "interrupt_raised": report.interrupt_raised,
        "interrupt_polls": report.interrupt_polls,
        "elapsed_seconds": report.elapsed.as_secs_f64(),
    })
}

fn finish(report: &ExperimentReport, global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    for (key, value) in &report.unused_options {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("option {key}={value} was not used by FFmpeg").yellow()
        );
    }
    if global.json {
        println!("{}", serde_json::to_string_pretty(&report_json(report))?);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global, &cli.command)?;

    let stdout = io::stdout();

    match cli.command {
        Commands::Timeout {
            url,
            option,
            seconds,
            out,
            pixel_format,
            stream,
        } => {
            let mut grabber = grabber_options(&stream)?;
            if let Some(pixel_format) = &pixel_format {
                grabber = grabber.with_pixel_format(pixel_format.parse::<PixelFormat>()?);
            }
            if !out.is_dir() {
                return Err(format!("output directory does not exist: {}", out.display()).into());
            }

            let options = ExperimentOptions::new(url)
                .with_timeout(parse_seconds(seconds)?)
                .with_timeout_option(option.parse::<TimeoutOption>()?)
                .with_output_directory(out)
                .with_grabber_options(grabber);

            let report = Experiment::TimeoutOption.run(&options, &mut stdout.lock())?;
            finish(&report, &cli.global)?;
        }
        Commands::Interrupt {
            url,
            seconds,
            before_open,
            max_frames,
            stream,
        } => {
            let placement = if before_open {
                InterruptPlacement::BeforeOpen
            } else {
                InterruptPlacement::AfterStart
            };
            if placement == InterruptPlacement::AfterStart && stream.options.is_empty() {
                eprintln!(
                    "{} {}",
                    "note:".cyan().bold(),
                    "without --before-open or a timeout option, opening an unreachable stream never returns"
                );
            }

            let mut options = ExperimentOptions::new(url)
                .with_timeout(parse_seconds(seconds)?)
                .with_interrupt_placement(placement)
                .with_grabber_options(grabber_options(&stream)?);
            if let Some(max_frames) = max_frames {
                options = options.with_max_frames(max_frames);
            }

            let report = Experiment::InterruptCallback.run(&options, &mut stdout.lock())?;
            finish(&report, &cli.global)?;
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "rtsp-timeout-probe", &mut io::stdout());
        }
    }

    io::stdout().flush()?;
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
