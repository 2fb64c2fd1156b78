//! Session configuration.
//!
//! [`CaptureOptions`] carries everything that shapes how a source is opened:
//! demuxer/decoder options, watchdog budgets, an optional frame-rate override
//! and raw passthrough. [`WriterOptions`] does the same for the encode path.
//! Both are builders so call sites only spell out what they change.
//!
//! Capture options can also come from the environment. The
//! [`CAPTURE_OPTIONS_VARIABLE`] variable holds semicolon-separated `key|value`
//! pairs that are applied to the underlying open call, e.g.
//! `rtsp_transport|udp;input_format|mjpeg`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use frameseek::{CaptureOptions, VideoCapture};
//!
//! let options = CaptureOptions::new()
//!     .with_option("avdiscard", "nonkey")
//!     .with_read_timeout(Duration::from_secs(5));
//! let capture = VideoCapture::open_with_options("input.mp4", &options)?;
//! # Ok::<(), frameseek::FrameSeekError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::interrupt::{DEFAULT_OPEN_TIMEOUT, DEFAULT_READ_TIMEOUT};

/// Environment variable holding extra `key|value;key|value` open options.
pub const CAPTURE_OPTIONS_VARIABLE: &str = "FRAMESEEK_CAPTURE_OPTIONS";

/// Option applied when no options were configured at all.
pub(crate) const DEFAULT_TRANSPORT: (&str, &str) = ("rtsp_transport", "tcp");

/// Option key selecting a demuxer by short name.
pub(crate) const INPUT_FORMAT_KEY: &str = "input_format";
/// Option key selecting a decoder by name.
pub(crate) const VIDEO_CODEC_KEY: &str = "video_codec";
/// Option key controlling which frames the decoder discards.
pub(crate) const DISCARD_KEY: &str = "avdiscard";

/// Options for opening a [`VideoCapture`](crate::VideoCapture).
#[derive(Clone, PartialEq)]
pub struct CaptureOptions {
    /// Ordered `(key, value)` pairs handed to the demuxer.
    pub(crate) entries: Vec<(String, String)>,
    pub(crate) open_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) frame_rate: Option<u32>,
    pub(crate) raw_mode: bool,
}

impl Debug for CaptureOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CaptureOptions")
            .field("entries", &self.entries)
            .field("open_timeout_ms", &self.open_timeout.as_millis())
            .field("read_timeout_ms", &self.read_timeout.as_millis())
            .field("frame_rate", &self.frame_rate)
            .field("raw_mode", &self.raw_mode)
            .finish()
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureOptions {
    /// Create options with default budgets and no extra entries.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            frame_rate: None,
            raw_mode: false,
        }
    }

    /// Build options from [`CAPTURE_OPTIONS_VARIABLE`], if set.
    pub fn from_env() -> Self {
        match std::env::var(CAPTURE_OPTIONS_VARIABLE) {
            Ok(value) => {
                log::debug!("Applying {CAPTURE_OPTIONS_VARIABLE}={value}");
                Self::new().with_options_string(&value)
            }
            Err(_) => Self::new(),
        }
    }

    /// Add (or replace) a single demuxer/decoder option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Add every pair from a `key|value;key|value` string.
    ///
    /// Empty segments are skipped. A segment without `|` is kept with an
    /// empty value, matching FFmpeg's own dictionary parser.
    #[must_use]
    pub fn with_options_string(mut self, options: &str) -> Self {
        for (key, value) in parse_options_string(options) {
            self = self.with_option(key, value);
        }
        self
    }

    /// Budget for opening the source. Zero disables the watchdog.
    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Budget for each `grab`. Zero disables the watchdog.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Request a capture frame rate (passed to the demuxer as `framerate`
    /// and used for all frame arithmetic).
    #[must_use]
    pub fn with_frame_rate(mut self, frames_per_second: u32) -> Self {
        self.frame_rate = Some(frames_per_second);
        self
    }

    /// Enable raw packet passthrough immediately after opening.
    #[must_use]
    pub fn with_raw_mode(mut self) -> Self {
        self.raw_mode = true;
        self
    }

    /// Look up an entry by key.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Budget for opening the source.
    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }

    /// Budget for each `grab`.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// The entries passed to the demuxer, including defaults.
    pub(crate) fn demuxer_entries(&self) -> Vec<(String, String)> {
        let mut entries = self.entries.clone();
        if entries.is_empty() {
            entries.push((DEFAULT_TRANSPORT.0.to_string(), DEFAULT_TRANSPORT.1.to_string()));
        }
        if let Some(fps) = self.frame_rate {
            entries.push(("framerate".to_string(), fps.to_string()));
        }
        entries
    }
}

/// Split a `key|value;key|value` string into pairs.
pub fn parse_options_string(options: &str) -> Vec<(String, String)> {
    options
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('|') {
            Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
            None => (segment.to_string(), String::new()),
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Options for a [`VideoWriter`](crate::VideoWriter).
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    pub(crate) color: bool,
    pub(crate) codec_options: Vec<(String, String)>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterOptions {
    /// Colour (BGR24) input and no extra encoder options.
    pub fn new() -> Self {
        Self {
            color: true,
            codec_options: Vec::new(),
        }
    }

    /// Choose colour (BGR24, 3 channels) or grayscale (GRAY8, 1 channel) input.
    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Forward a private option to the encoder open call.
    #[must_use]
    pub fn with_codec_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.codec_options.push((key.into(), value.into()));
        self
    }

    /// Whether the writer expects colour input.
    pub fn is_color(&self) -> bool {
        self.color
    }
}
