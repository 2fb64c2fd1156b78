//! Process-wide FFmpeg bootstrap and log level control.
//!
//! FFmpeg registration and network initialisation must happen once per
//! process before any session touches the library. [`initialize`] performs
//! that work lazily behind a process-wide lock, so several captures or
//! writers opened concurrently from different threads all observe a fully
//! initialised library. Calling it again is a no-op.
//!
//! FFmpeg also has its own console logger, separate from the Rust
//! [`log`](https://crates.io/crates/log) facade used by this crate. The
//! [`FfmpegLogLevel`] wrapper tunes it without importing `ffmpeg-next`.
//!
//! # Example
//!
//! ```no_run
//! use frameseek::FfmpegLogLevel;
//!
//! frameseek::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! frameseek::ffmpeg::initialize().unwrap();
//! ```

use std::sync::Mutex;

use ffmpeg_next::util::log::Level;

use crate::error::FrameSeekError;

/// Environment variable that raises FFmpeg's own log output to debug.
pub const DEBUG_ENVIRONMENT_VARIABLE: &str = "FRAMESEEK_FFMPEG_DEBUG";

static INITIALIZED: Mutex<bool> = Mutex::new(false);

/// Initialise FFmpeg for this process.
///
/// The first successful call registers codecs, formats and network
/// transports; every later call returns immediately. A failed attempt leaves
/// the flag unset so the next caller retries.
///
/// When [`DEBUG_ENVIRONMENT_VARIABLE`] is set to a truthy value, FFmpeg's log
/// level is raised to [`FfmpegLogLevel::Debug`] as part of the first call.
///
/// # Errors
///
/// Returns [`FrameSeekError::Ffmpeg`] if FFmpeg reports an initialisation
/// failure.
pub fn initialize() -> Result<(), FrameSeekError> {
    // A poisoned lock only means another thread panicked mid-init; the flag
    // itself is still meaningful.
    let mut initialized = INITIALIZED
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if *initialized {
        return Ok(());
    }

    ffmpeg_next::init()
        .map_err(|error| FrameSeekError::Ffmpeg(format!("initialisation failed: {error}")))?;

    if debug_requested(std::env::var(DEBUG_ENVIRONMENT_VARIABLE).ok().as_deref()) {
        set_ffmpeg_log_level(FfmpegLogLevel::Debug);
        log::debug!("{DEBUG_ENVIRONMENT_VARIABLE} set, FFmpeg log level raised to debug");
    }

    *initialized = true;
    log::debug!("FFmpeg initialised");
    Ok(())
}

/// Returns `true` once [`initialize`] has completed successfully.
pub fn is_initialized() -> bool {
    *INITIALIZED
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Interpret the value of [`DEBUG_ENVIRONMENT_VARIABLE`].
pub(crate) fn debug_requested(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let value = value.trim();
            !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
        }
        None => false,
    }
}

/// FFmpeg internal log verbosity level.
///
/// Ordered from quietest to most verbose; setting a level suppresses every
/// message below that severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Conditions the process cannot recover from.
    Panic,
    /// Unrecoverable errors for the current context.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

const LEVELS: [(FfmpegLogLevel, Level); 9] = [
    (FfmpegLogLevel::Quiet, Level::Quiet),
    (FfmpegLogLevel::Panic, Level::Panic),
    (FfmpegLogLevel::Fatal, Level::Fatal),
    (FfmpegLogLevel::Error, Level::Error),
    (FfmpegLogLevel::Warning, Level::Warning),
    (FfmpegLogLevel::Info, Level::Info),
    (FfmpegLogLevel::Verbose, Level::Verbose),
    (FfmpegLogLevel::Debug, Level::Debug),
    (FfmpegLogLevel::Trace, Level::Trace),
];

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        LEVELS
            .iter()
            .find(|(ours, _)| *ours == self)
            .map(|(_, theirs)| *theirs)
            .unwrap_or(Level::Warning)
    }

    fn from_ffmpeg_level(level: Level) -> Option<Self> {
        LEVELS
            .iter()
            .find(|(_, theirs)| *theirs == level)
            .map(|(ours, _)| *ours)
    }
}

/// Set FFmpeg's own log verbosity.
///
/// This controls what FFmpeg prints to stderr; it does not affect the `log`
/// records emitted by this crate.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Get FFmpeg's current log verbosity, if it maps to a known level.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .and_then(FfmpegLogLevel::from_ffmpeg_level)
}
