use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use frameseek::{
    CaptureOptions, CaptureProperty, FfmpegLogLevel, FourCc, Origin, VideoCapture, VideoWriter,
    WriterOptions,
};
use image::{RgbImage, imageops};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  frameseek probe input.mp4 --json\n  frameseek extract input.mp4 --frame 250 -o frame.png\n  frameseek raw input.mp4 -o stream.h264 --count 100\n  frameseek synth pattern.avi --fourcc MJPG --frames 60 --fps 25 --size 320x240\n  frameseek completions zsh > _frameseek";

/// Index bits drawn into each synthetic pattern frame.
const PATTERN_BITS: u32 = 8;

#[derive(Debug, Parser)]
#[command(
    name = "frameseek",
    version,
    about = "Frame-accurate video access and encoding",
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
    /// Show additional output.
    #[arg(long)]
    verbose: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Extra open option as key|value (repeatable).
    #[arg(long = "option", value_name = "KEY|VALUE")]
    options: Vec<String>,

    /// Budget for each read, in milliseconds (0 disables).
    #[arg(long)]
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print stream properties.
    #[command(
        about = "Print video stream properties",
        visible_alias = "info",
        after_help = "Examples:\n  frameseek probe input.mp4\n  frameseek probe input.mp4 --json"
    )]
    Probe {
        /// Input media path or URL.
        input: String,

        /// Output properties as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Seek to one frame and save it as an image.
    #[command(
        about = "Extract a single frame",
        after_help = "Examples:\n  frameseek extract input.mp4 --frame 120 -o frame.png\n  frameseek extract input.mp4 --time 00:01:05.5 -o frame.jpg"
    )]
    Extract {
        /// Input media path or URL.
        input: String,
        /// Frame index to extract.
        #[arg(long, conflicts_with = "time")]
        frame: Option<i64>,
        /// Time position (seconds, MM:SS or HH:MM:SS).
        #[arg(long)]
        time: Option<String>,
        /// Output image path.
        #[arg(short, long)]
        out: PathBuf,
        /// Save pixels as stored, ignoring rotation metadata.
        #[arg(long)]
        no_rotate: bool,
    },

    /// Dump compressed packets of the video stream.
    #[command(
        about = "Dump the raw video bitstream",
        after_help = "Examples:\n  frameseek raw input.mp4 -o stream.h264\n  frameseek raw input.mkv -o first.hevc --count 30"
    )]
    Raw {
        /// Input media path or URL.
        input: String,
        /// Output file for the concatenated packets.
        #[arg(short, long)]
        out: PathBuf,
        /// Stop after this many packets.
        #[arg(long)]
        count: Option<u64>,
    },

    /// Encode a synthetic frame-index pattern.
    #[command(
        about = "Write a synthetic test video",
        after_help = "Examples:\n  frameseek synth out.mkv --fourcc FFV1 --frames 100\n  frameseek synth out.avi --fourcc MJPG --fps 29.97 --size 640x480 --gray"
    )]
    Synth {
        /// Output video path; the extension selects the container.
        output: PathBuf,
        /// Codec FourCC.
        #[arg(long, default_value = "MJPG")]
        fourcc: String,
        /// Number of frames to write.
        #[arg(long, default_value_t = 100)]
        frames: u32,
        /// Frames per second.
        #[arg(long, default_value_t = 25.0)]
        fps: f64,
        /// Frame size as WIDTHxHEIGHT.
        #[arg(long, default_value = "320x240")]
        size: String,
        /// Write single-channel frames.
        #[arg(long)]
        gray: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completion scripts")]
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return seconds_to_duration(seconds, trimmed);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0_u64, minutes.parse::<u64>()?, seconds.parse::<f64>()?),
        [hours, minutes, seconds] => (
            hours.parse::<u64>()?,
            minutes.parse::<u64>()?,
            seconds.parse::<f64>()?,
        ),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };

    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    seconds_to_duration(total_seconds, trimmed)
}

fn seconds_to_duration(seconds: f64, text: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    if !seconds.is_finite() {
        return Err(format!("invalid time value: {text}").into());
    }
    Ok(Duration::try_from_secs_f64(seconds.max(0.0))?)
}

fn parse_size(value: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let (width, height) = value
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("invalid size {value:?}, expected WIDTHxHEIGHT"))?;
    Ok((width.parse()?, height.parse()?))
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "panic" => Some(FfmpegLogLevel::Panic),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "verbose" => Some(FfmpegLogLevel::Verbose),
        "debug" => Some(FfmpegLogLevel::Debug),
        "trace" => Some(FfmpegLogLevel::Trace),
        _ => None,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn capture_options(global: &GlobalOptions) -> CaptureOptions {
    let mut options = CaptureOptions::from_env();
    for entry in &global.options {
        options = options.with_options_string(entry);
    }
    if let Some(timeout) = global.read_timeout_ms {
        options = options.with_read_timeout(Duration::from_millis(timeout));
    }
    options
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        frameseek::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

fn progress_bar(length: Option<u64>) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let progress = match length {
        Some(length) => {
            let bar = ProgressBar::new(length);
            let style =
                ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
            bar.set_style(style.progress_chars("##-"));
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(ProgressStyle::with_template("{spinner:.green} {pos} {msg}")?);
            bar
        }
    };
    Ok(progress)
}

/// Frame `index` drawn as `PATTERN_BITS` vertical bars, white for a set bit
/// (least significant bit leftmost).
fn pattern_frame(index: u32, width: u32, height: u32, channels: u32) -> Vec<u8> {
    let row_bytes = (width * channels) as usize;
    let bar_width = (width / PATTERN_BITS).max(1);
    let mut row = vec![0u8; row_bytes];
    for x in 0..width {
        let bit = (x / bar_width).min(PATTERN_BITS - 1);
        let value = if index >> bit & 1 == 1 { 255 } else { 0 };
        let start = (x * channels) as usize;
        row[start..start + channels as usize].fill(value);
    }
    row.repeat(height as usize)
}

/// Convert a retrieved BGR frame to an RGB image.
fn bgr_to_image(data: &[u8], step: usize, width: u32, height: u32) -> Option<RgbImage> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        let row = data.get(y * step..y * step + width as usize * 3)?;
        for pixel in row.chunks_exact(3) {
            rgb.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
        }
    }
    RgbImage::from_raw(width, height, rgb)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Probe { input, json } => {
            let capture = VideoCapture::open_with_options(&input, &capture_options(&cli.global))?;
            let fourcc = FourCc(capture.property(CaptureProperty::FourCc) as u32);
            let rotation = capture.rotation().map(|rotation| rotation.degrees).unwrap_or(0);
            if json {
                let payload = json!({
                    "format": capture.format_name(),
                    "codec": capture.codec_name(),
                    "fourcc": fourcc.to_string(),
                    "width": capture.width(),
                    "height": capture.height(),
                    "fps": capture.fps(),
                    "frame_count": capture.total_frames(),
                    "duration_seconds": capture.duration_seconds(),
                    "bitrate_kbps": capture.property(CaptureProperty::Bitrate),
                    "rotation": rotation,
                    "sar": [
                        capture.property(CaptureProperty::SarNumerator),
                        capture.property(CaptureProperty::SarDenominator),
                    ],
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Format: {}", capture.format_name().unwrap_or_default());
                println!(
                    "Video: {}x{} @ {:.3} fps [{} / {}]",
                    capture.width(),
                    capture.height(),
                    capture.fps(),
                    capture.codec_name().unwrap_or("unknown"),
                    fourcc,
                );
                println!("Frames: {}", capture.total_frames());
                println!("Duration: {:.3}s", capture.duration_seconds());
                println!("Bitrate: {:.0} kbit/s", capture.property(CaptureProperty::Bitrate));
                if rotation != 0 {
                    println!("Rotation: {rotation}°");
                }
            }
        }
        Commands::Extract {
            input,
            frame,
            time,
            out,
            no_rotate,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let mut capture = VideoCapture::open_with_options(&input, &capture_options(&cli.global))?;

            match (frame, time) {
                (Some(frame), _) => capture.seek(frame)?,
                (None, Some(time)) => capture.seek_to_time(parse_timecode(&time)?.as_secs_f64())?,
                (None, None) => {}
            }
            let position = capture.frame_number();
            let rotation = capture.rotation().map(|rotation| rotation.degrees).unwrap_or(0);

            let retrieved = capture.read()?;
            let image = bgr_to_image(retrieved.data, retrieved.step, retrieved.width, retrieved.height)
                .ok_or("retrieved frame is shorter than its dimensions")?;
            let image = match (no_rotate, rotation) {
                (false, 90) => imageops::rotate90(&image),
                (false, 180) => imageops::rotate180(&image),
                (false, 270) => imageops::rotate270(&image),
                _ => image,
            };
            image.save(&out)?;

            if cli.global.verbose {
                eprintln!("{} frame {position}", "decoded".cyan().bold());
            }
            println!("{} {}", "saved".green().bold(), out.display());
        }
        Commands::Raw { input, out, count } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let options = capture_options(&cli.global).with_raw_mode();
            let mut capture = VideoCapture::open_with_options(&input, &options)?;
            let mut file = fs::File::create(&out)?;

            let progress = progress_bar(count)?;
            let mut written = 0_u64;
            let mut bytes = 0_usize;
            while count.is_none_or(|count| written < count) {
                match capture.grab() {
                    Ok(()) => {}
                    Err(frameseek::FrameSeekError::EndOfStream) => break,
                    Err(error) => return Err(error.into()),
                }
                let packet = capture.retrieve()?;
                file.write_all(packet.data)?;
                bytes += packet.data.len();
                written += 1;
                progress.inc(1);
            }
            progress.finish_and_clear();

            println!(
                "{} {} ({written} packets, {bytes} bytes)",
                "saved".green().bold(),
                out.display()
            );
        }
        Commands::Synth {
            output,
            fourcc,
            frames,
            fps,
            size,
            gray,
        } => {
            ensure_writable_path(&output, cli.global.overwrite)?;
            let fourcc: FourCc = fourcc.parse()?;
            let (width, height) = parse_size(&size)?;
            let options = WriterOptions::new().with_color(!gray);
            let mut writer =
                VideoWriter::open_with_options(&output, fourcc, fps, width, height, &options)?;
            let channels = if gray { 1 } else { 3 };
            let (width, height) = writer
                .settings()
                .map(|settings| (settings.width, settings.height))
                .unwrap_or((width, height));

            if cli.global.verbose {
                eprintln!("{} {writer:?}", "writer".cyan().bold());
            }

            let progress = progress_bar(Some(u64::from(frames)))?;
            for index in 0..frames {
                let frame = pattern_frame(index, width, height, channels);
                writer.write(
                    &frame,
                    (width * channels) as usize,
                    width,
                    height,
                    channels,
                    Origin::TopLeft,
                )?;
                progress.inc(1);
            }
            writer.close()?;
            progress.finish_and_clear();
            println!("{} {} ({frames} frames)", "saved".green().bold(), output.display());
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "frameseek", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{parse_size, parse_timecode, pattern_frame};

    #[test]
    fn parse_timecode_formats() {
        assert_eq!(parse_timecode("75").unwrap().as_secs(), 75);
        assert_eq!(parse_timecode("01:15").unwrap().as_secs(), 75);
        assert_eq!(parse_timecode("00:01:15.5").unwrap().as_millis(), 75_500);
        assert!(parse_timecode("1:2:3:4").is_err());
    }

    #[test]
    fn parse_timecode_rejects_unbounded_values() {
        assert!(parse_timecode("inf").is_err());
        assert!(parse_timecode("-inf").is_err());
        assert!(parse_timecode("NaN").is_err());
        assert!(parse_timecode("00:00:inf").is_err());
        assert!(parse_timecode("1e300").is_err());
        assert_eq!(parse_timecode("-3").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_size_accepts_either_case() {
        assert_eq!(parse_size("320x240").unwrap(), (320, 240));
        assert_eq!(parse_size("64X48").unwrap(), (64, 48));
        assert!(parse_size("320").is_err());
    }

    #[test]
    fn pattern_encodes_index_bits() {
        let frame = pattern_frame(0b101, 16, 2, 1);
        assert_eq!(frame.len(), 32);
        assert_eq!(&frame[..6], &[255, 255, 0, 0, 255, 255]);
    }
}
