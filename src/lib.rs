//! # frameseek
//!
//! Frame-accurate random access to compressed video, and frame-accurate
//! encoding of raw frames, powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ### Read a specific frame
//!
//! ```no_run
//! use frameseek::VideoCapture;
//!
//! let mut capture = VideoCapture::open("input.mp4")?;
//! capture.seek(250)?;
//! let frame = capture.read()?;
//! println!("frame {}: {}x{} BGR", capture.frame_number() - 1, frame.width, frame.height);
//! # Ok::<(), frameseek::FrameSeekError>(())
//! ```
//!
//! ### Dump the compressed stream
//!
//! ```no_run
//! use frameseek::{CaptureOptions, VideoCapture};
//!
//! let options = CaptureOptions::new().with_raw_mode();
//! let mut capture = VideoCapture::open_with_options("input.mp4", &options)?;
//! while capture.grab().is_ok() {
//!     let packet = capture.retrieve()?;
//!     println!("{} bytes", packet.data.len());
//! }
//! # Ok::<(), frameseek::FrameSeekError>(())
//! ```
//!
//! ### Write a video
//!
//! ```no_run
//! use frameseek::{FourCc, Origin, VideoWriter};
//!
//! let mut writer = VideoWriter::open("out.mkv", FourCc::new(*b"FFV1"), 30.0, 64, 48, false)?;
//! let gray = vec![128u8; 64 * 48];
//! writer.write(&gray, 64, 64, 48, 1, Origin::TopLeft)?;
//! writer.close()?;
//! # Ok::<(), frameseek::FrameSeekError>(())
//! ```
//!
//! ## Features
//!
//! - **Frame-accurate seeking** by frame index, time or ratio, robust to
//!   keyframe-only container seeks and inexact indexes
//! - **Two-step reading**: cheap `grab` to advance, `retrieve` to convert to
//!   BGR24 only when pixels are needed
//! - **Raw passthrough** of compressed packets, with H.264/HEVC reformatted
//!   to Annex B start codes
//! - **Read timeouts** enforced through FFmpeg's interrupt callback
//! - **Writer negotiation** of codec (from a FourCC), encoder pixel format,
//!   bit rate and time base, with aligned staging of caller memory
//! - **Numeric properties** for generic tooling
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod aligned;
pub mod bitstream;
pub mod capture;
pub mod codec_tag;
pub mod configuration;
pub mod error;
pub mod ffmpeg;
pub mod interrupt;
pub mod pixel_format;
pub mod property;
pub mod seek;
pub mod utilities;
pub mod writer;

pub use aligned::AlignedBuffer;
pub use capture::{RetrievedFrame, Rotation, VideoCapture};
pub use codec_tag::{FourCc, TagResolution, TagSource};
pub use configuration::{CaptureOptions, WriterOptions};
pub use error::FrameSeekError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use ffmpeg_next::Rational;
pub use ffmpeg_next::codec::Id as CodecId;
pub use ffmpeg_next::format::Pixel;
pub use interrupt::Watchdog;
pub use pixel_format::Negotiation;
pub use property::CaptureProperty;
pub use seek::{FrameSource, seek_to_frame};
pub use writer::{Origin, VideoWriter, WriterSettings};
