//! Error types for the `frameseek` crate.
//!
//! This module defines [`FrameSeekError`], the unified error type returned by
//! all fallible operations in the crate. Variants are grouped the way failures
//! surface in practice: opening a source, reading and decoding it, converting
//! pixels, and encoding frames.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `frameseek` operations.
///
/// Every public method that can fail returns `Result<T, FrameSeekError>`.
/// Open failures always leave the session closed with every native handle
/// released, so a caller can retry without cleaning up first.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameSeekError {
    /// The media source could not be opened.
    #[error("Failed to open media source {path}: {reason}")]
    FileOpen {
        /// Source that was passed to [`crate::VideoCapture::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The source does not contain a video stream.
    #[error("No video stream found in source")]
    NoVideoStream,

    /// The video decoder could not be found or opened.
    #[error("Failed to open video decoder: {0}")]
    DecoderOpen(String),

    /// The session has been closed (or was never opened).
    #[error("Session is not open")]
    NotOpen,

    /// The stream has no more frames.
    #[error("End of stream reached")]
    EndOfStream,

    /// A blocking I/O call exceeded its wall-clock budget.
    #[error("Timed out during {operation} after {budget_ms} ms")]
    Timeout {
        /// Which operation was interrupted (`"open"` or `"read"`).
        operation: &'static str,
        /// The budget that was exceeded, in milliseconds.
        budget_ms: u64,
    },

    /// Too many consecutive packets were skipped or failed to decode.
    #[error("Gave up after {attempts} packets without a decodable video frame")]
    RetryLimitExceeded {
        /// Number of packets that were consumed without success.
        attempts: u32,
    },

    /// `retrieve` was called before any frame or packet was grabbed.
    #[error("No frame available; call grab() first")]
    NoFrame,

    /// The pixel-format conversion context could not be built or run.
    #[error("Pixel format conversion failed: {0}")]
    Conversion(String),

    /// The bitstream filter needed for raw passthrough failed.
    #[error("Bitstream filter error: {0}")]
    BitstreamFilter(String),

    /// Raw passthrough cannot be switched off once enabled.
    #[error("Raw mode cannot be disabled once enabled")]
    RawModeIrreversible,

    /// An argument was outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The output container could not be inferred from the destination.
    #[error("Cannot infer an output container for {0}")]
    UnknownContainer(PathBuf),

    /// No codec is known for the requested FourCC.
    #[error("FourCC {fourcc} is not known for container '{container}'")]
    UnknownFourCc {
        /// Printable form of the requested tag.
        fourcc: String,
        /// Short name of the output container.
        container: String,
    },

    /// No encoder is available for the resolved codec.
    #[error("No encoder available for codec {0}")]
    EncoderNotFound(String),

    /// The frame's channel count does not match the writer's input format.
    #[error("Frame has {actual} channels, writer expects {expected}")]
    ChannelMismatch {
        /// Channels required by the negotiated input format.
        expected: u32,
        /// Channels passed by the caller.
        actual: u32,
    },

    /// The frame's dimensions do not match the writer's encode size.
    #[error("Frame is {actual_width}x{actual_height}, writer encodes {expected_width}x{expected_height}")]
    DimensionMismatch {
        /// Negotiated (even) encode width.
        expected_width: u32,
        /// Negotiated (even) encode height.
        expected_height: u32,
        /// Width passed by the caller.
        actual_width: u32,
        /// Height passed by the caller.
        actual_height: u32,
    },

    /// Video encoding or muxing failed.
    #[error("Video encoding error: {0}")]
    VideoEncode(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while saving a retrieved frame.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for FrameSeekError {
    fn from(error: FfmpegError) -> Self {
        FrameSeekError::Ffmpeg(error.to_string())
    }
}
