//! Encode session: turn raw BGR24 or GRAY8 frames into a video file.
//!
//! [`VideoWriter`] picks the container from the destination name and the
//! codec from a FourCC, negotiates an encoder pixel format, and then accepts
//! one frame per [`write`](VideoWriter::write) call. Frames whose memory
//! layout is unsafe for FFmpeg's SIMD paths are copied into an aligned
//! staging buffer first.
//!
//! # Example
//!
//! ```no_run
//! use frameseek::{FourCc, Origin, VideoWriter};
//!
//! let (width, height) = (320, 240);
//! let mut writer = VideoWriter::open("out.avi", FourCc::new(*b"MJPG"), 25.0, width, height, true)?;
//! let frame = vec![0u8; (width * height * 3) as usize];
//! for _ in 0..50 {
//!     writer.write(&frame, width as usize * 3, width, height, 3, Origin::TopLeft)?;
//! }
//! writer.close()?;
//! # Ok::<(), frameseek::FrameSeekError>(())
//! ```

use std::ffi::{CStr, CString};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::ptr;

use ffmpeg_next::{
    Dictionary, Error as FfmpegError, Packet, Rational,
    codec::{
        Id,
        context::Context as CodecContext,
        encoder::{self, video::Encoder as VideoEncoder},
    },
    format::{Pixel, context::Output},
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::error::EAGAIN,
};
use ffmpeg_sys_next::{
    AV_CODEC_FLAG_GLOBAL_HEADER, AVFMT_GLOBALHEADER, AVOutputFormat, FF_MB_DECISION_RD,
    av_guess_format,
};

use crate::{
    aligned::{self, AlignedBuffer},
    codec_tag::{self, FourCc, TagResolution},
    configuration::WriterOptions,
    error::FrameSeekError,
    pixel_format,
};

/// Frames between forced key frames.
pub const GOP_SIZE: u32 = 12;
/// Lowest quantiser the encoder may pick.
const QMIN: c_int = 3;
/// B-frames allowed for MPEG-2.
const MPEG2_MAX_B_FRAMES: usize = 2;

/// Row order of the frames passed to [`VideoWriter::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// First row is the top of the picture.
    #[default]
    TopLeft,
    /// First row is the bottom of the picture.
    BottomLeft,
}

/// Encode settings chosen at open time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriterSettings {
    /// Codec resolved from the FourCC.
    pub codec: Id,
    /// Tag written to the stream.
    pub fourcc: FourCc,
    /// Format callers supply (BGR24 or GRAY8).
    pub input_format: Pixel,
    /// Format the encoder is opened with.
    pub encoder_format: Pixel,
    /// Encoded width (even).
    pub width: u32,
    /// Encoded height (even).
    pub height: u32,
    /// Encoder time base.
    pub time_base: Rational,
    /// Time base the muxer settled on for the stream.
    pub stream_time_base: Rational,
    /// Target bit rate in bit/s.
    pub bit_rate: usize,
}

/// Everything decided before the output file is created.
struct EncodePlan {
    codec: ffmpeg_next::Codec,
    resolution: TagResolution,
    input_format: Pixel,
    encoder_format: Pixel,
    width: u32,
    height: u32,
    time_base: Rational,
    bit_rate: usize,
    needs_global_header: bool,
}

struct WriterSession {
    encoder: VideoEncoder,
    output: Output,
    settings: WriterSettings,
    stream_index: usize,
    scaler: Option<ScalingContext>,
    input_frame: VideoFrame,
    converted: VideoFrame,
    packet: Packet,
    aligned: AlignedBuffer,
    frame_index: i64,
}

enum WriterState {
    Closed,
    Open(Box<WriterSession>),
}

/// Encode session writing one video stream to a file.
pub struct VideoWriter {
    state: WriterState,
    destination: PathBuf,
}

impl Debug for VideoWriter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut debug = f.debug_struct("VideoWriter");
        debug.field("destination", &self.destination);
        match &self.state {
            WriterState::Closed => debug.field("state", &"closed"),
            WriterState::Open(session) => debug
                .field("state", &"open")
                .field("settings", &session.settings)
                .field("frame_index", &session.frame_index),
        };
        debug.finish_non_exhaustive()
    }
}

impl VideoWriter {
    /// Open `destination` for writing.
    ///
    /// `color` selects BGR24 (3 channels) or GRAY8 (1 channel) input.
    ///
    /// # Errors
    ///
    /// See [`open_with_options`](Self::open_with_options).
    pub fn open<P: AsRef<Path>>(
        destination: P,
        fourcc: FourCc,
        frames_per_second: f64,
        width: u32,
        height: u32,
        color: bool,
    ) -> Result<Self, FrameSeekError> {
        let options = WriterOptions::new().with_color(color);
        Self::open_with_options(destination, fourcc, frames_per_second, width, height, &options)
    }

    /// Open `destination` with explicit options.
    ///
    /// # Errors
    ///
    /// - [`FrameSeekError::InvalidArgument`] for a non-positive frame rate or
    ///   a size that rounds down to zero.
    /// - [`FrameSeekError::UnknownContainer`] if no muxer matches the name.
    /// - [`FrameSeekError::UnknownFourCc`] if no codec matches the FourCC.
    /// - [`FrameSeekError::EncoderNotFound`] if FFmpeg has no encoder for it.
    /// - [`FrameSeekError::VideoEncode`] if the encoder or header fails.
    pub fn open_with_options<P: AsRef<Path>>(
        destination: P,
        fourcc: FourCc,
        frames_per_second: f64,
        width: u32,
        height: u32,
        options: &WriterOptions,
    ) -> Result<Self, FrameSeekError> {
        let destination = destination.as_ref().to_path_buf();
        crate::ffmpeg::initialize()?;

        if frames_per_second <= 0.0 || !frames_per_second.is_finite() {
            return Err(FrameSeekError::InvalidArgument(format!(
                "frame rate must be positive, got {frames_per_second}"
            )));
        }
        let (width, height) = (width & !1, height & !1);
        if width == 0 || height == 0 {
            return Err(FrameSeekError::InvalidArgument(format!(
                "frame size {width}x{height} is too small"
            )));
        }

        let session = WriterSession::open(&destination, fourcc, frames_per_second, width, height, options)
            .inspect_err(|error| log::debug!("Writer open failed for {}: {error}", destination.display()))?;

        log::debug!(
            "Opened writer {} ({:?} {} -> {:?}, {}x{}, time base {})",
            destination.display(),
            session.settings.codec,
            session.settings.fourcc,
            session.settings.encoder_format,
            width,
            height,
            session.settings.time_base,
        );

        Ok(Self {
            state: WriterState::Open(Box::new(session)),
            destination,
        })
    }

    /// Whether the writer still accepts frames.
    pub fn is_opened(&self) -> bool {
        matches!(self.state, WriterState::Open(_))
    }

    /// Settings negotiated at open time.
    pub fn settings(&self) -> Option<&WriterSettings> {
        match &self.state {
            WriterState::Open(session) => Some(&session.settings),
            WriterState::Closed => None,
        }
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> i64 {
        match &self.state {
            WriterState::Open(session) => session.frame_index,
            WriterState::Closed => 0,
        }
    }

    /// Encode one frame.
    ///
    /// `frame` holds `height` rows of `step` bytes, each row starting with
    /// `width * channels` bytes of pixels.
    ///
    /// # Errors
    ///
    /// Argument errors are reported before anything is handed to FFmpeg:
    /// [`FrameSeekError::ChannelMismatch`], [`FrameSeekError::DimensionMismatch`]
    /// and [`FrameSeekError::InvalidArgument`]. Encoder and muxer failures
    /// are [`FrameSeekError::VideoEncode`].
    pub fn write(
        &mut self,
        frame: &[u8],
        step: usize,
        width: u32,
        height: u32,
        channels: u32,
        origin: Origin,
    ) -> Result<(), FrameSeekError> {
        match &mut self.state {
            WriterState::Open(session) => session.write(frame, step, width, height, channels, origin),
            WriterState::Closed => Err(FrameSeekError::NotOpen),
        }
    }

    /// Flush the encoder, write the trailer and release everything.
    ///
    /// Closing an already closed writer does nothing.
    pub fn close(&mut self) -> Result<(), FrameSeekError> {
        let WriterState::Open(mut session) = std::mem::replace(&mut self.state, WriterState::Closed)
        else {
            return Ok(());
        };
        let frames = session.frame_index;
        session.finish()?;
        log::debug!("Closed writer {} after {frames} frames", self.destination.display());
        Ok(())
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("Failed to finalise {}: {error}", self.destination.display());
        }
    }
}

impl WriterSession {
    fn open(
        destination: &Path,
        fourcc: FourCc,
        frames_per_second: f64,
        width: u32,
        height: u32,
        options: &WriterOptions,
    ) -> Result<Self, FrameSeekError> {
        let container = guess_container(destination)?;
        // SAFETY: muxer descriptors are static.
        let (format_name, needs_global_header) = unsafe {
            (
                CStr::from_ptr((*container).name).to_string_lossy().into_owned(),
                (*container).flags & AVFMT_GLOBALHEADER as c_int != 0,
            )
        };
        let resolution = codec_tag::resolve_for_format(container, &format_name, fourcc)?;

        let input_format = if options.color { Pixel::BGR24 } else { Pixel::GRAY8 };
        let negotiation = pixel_format::negotiate(resolution.codec, input_format, resolution.tag);
        let bit_rate = pixel_format::bitrate(
            negotiation.bitrate_scale,
            frames_per_second,
            width,
            height,
        );

        let encoder_codec = encoder::find(resolution.codec)
            .ok_or_else(|| FrameSeekError::EncoderNotFound(format!("{:?}", resolution.codec)))?;
        let supported_rates: Vec<Rational> = encoder_codec
            .video()
            .ok()
            .and_then(|video| video.rates().map(|rates| rates.collect()))
            .unwrap_or_default();
        let time_base = pixel_format::time_base(frames_per_second, resolution.codec, &supported_rates);

        let output = ffmpeg_next::format::output(&destination)
            .map_err(|error| FrameSeekError::VideoEncode(format!("cannot open output: {error}")))?;

        let plan = EncodePlan {
            codec: encoder_codec,
            resolution,
            input_format,
            encoder_format: negotiation.encoder_format,
            width,
            height,
            time_base,
            bit_rate,
            needs_global_header,
        };
        Self::start(output, plan, options).inspect_err(|_| {
            if let Err(remove_error) = std::fs::remove_file(destination) {
                log::debug!("Could not remove {}: {remove_error}", destination.display());
            }
        })
    }

    /// Add the stream, open the encoder and write the header.
    fn start(
        mut output: Output,
        plan: EncodePlan,
        options: &WriterOptions,
    ) -> Result<Self, FrameSeekError> {
        let EncodePlan {
            codec: encoder_codec,
            resolution,
            input_format,
            encoder_format,
            width,
            height,
            time_base,
            bit_rate,
            needs_global_header,
        } = plan;

        let mut stream = output
            .add_stream(encoder_codec)
            .map_err(|error| FrameSeekError::VideoEncode(format!("cannot add stream: {error}")))?;
        let stream_index = stream.index();

        let mut video = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| FrameSeekError::VideoEncode(format!("cannot create codec context: {error}")))?
            .encoder()
            .video()
            .map_err(|error| FrameSeekError::VideoEncode(format!("cannot create video encoder: {error}")))?;

        video.set_width(width);
        video.set_height(height);
        video.set_format(encoder_format);
        video.set_time_base(time_base);
        video.set_frame_rate(Some(Rational::new(time_base.denominator(), time_base.numerator())));
        video.set_bit_rate(bit_rate);
        video.set_gop(GOP_SIZE);
        if resolution.codec == Id::MPEG2VIDEO {
            video.set_max_b_frames(MPEG2_MAX_B_FRAMES);
        }

        // SAFETY: configuring the context before it is opened.
        unsafe {
            let raw = video.as_mut_ptr();
            (*raw).codec_tag = resolution.tag.value();
            (*raw).qmin = QMIN;
            (*raw).bit_rate_tolerance = bit_rate.min(c_int::MAX as usize) as c_int;
            (*raw).thread_count = 1;
            if matches!(resolution.codec, Id::MPEG1VIDEO | Id::MSMPEG4V3) {
                (*raw).mb_decision = FF_MB_DECISION_RD as c_int;
            }
            if needs_global_header {
                (*raw).flags |= AV_CODEC_FLAG_GLOBAL_HEADER as c_int;
            }
        }

        let mut codec_options = Dictionary::new();
        for (key, value) in &options.codec_options {
            codec_options.set(key, value);
        }

        let encoder = video
            .open_as_with(encoder_codec, codec_options)
            .map_err(|error| FrameSeekError::VideoEncode(format!("cannot open encoder: {error}")))?;

        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
        stream.set_avg_frame_rate(Rational::new(time_base.denominator(), time_base.numerator()));
        // SAFETY: the stream parameters were just filled from the encoder.
        unsafe {
            (*stream.parameters().as_mut_ptr()).codec_tag = resolution.tag.value();
        }

        output
            .write_header()
            .map_err(|error| FrameSeekError::VideoEncode(format!("cannot write header: {error}")))?;

        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .unwrap_or(time_base);

        let scaler = if encoder_format != input_format {
            let context = ScalingContext::get(
                input_format,
                width,
                height,
                encoder_format,
                width,
                height,
                ScalingFlags::BICUBIC,
            )
            .map_err(|error| {
                FrameSeekError::Conversion(format!(
                    "cannot convert {input_format:?} to {encoder_format:?}: {error}"
                ))
            })?;
            Some(context)
        } else {
            None
        };

        let mut input_frame = VideoFrame::empty();
        input_frame.set_format(input_format);
        input_frame.set_width(width);
        input_frame.set_height(height);

        Ok(Self {
            encoder,
            output,
            settings: WriterSettings {
                codec: resolution.codec,
                fourcc: resolution.tag,
                input_format,
                encoder_format,
                width,
                height,
                time_base,
                stream_time_base,
                bit_rate,
            },
            stream_index,
            scaler,
            input_frame,
            converted: VideoFrame::empty(),
            packet: Packet::empty(),
            aligned: AlignedBuffer::new(),
            frame_index: 0,
        })
    }

    fn write(
        &mut self,
        frame: &[u8],
        step: usize,
        width: u32,
        height: u32,
        channels: u32,
        origin: Origin,
    ) -> Result<(), FrameSeekError> {
        let settings = self.settings;
        let expected_channels = pixel_format::input_channels(settings.input_format);
        if channels != expected_channels {
            return Err(FrameSeekError::ChannelMismatch {
                expected: expected_channels,
                actual: channels,
            });
        }
        if (width & !1, height & !1) != (settings.width, settings.height) {
            return Err(FrameSeekError::DimensionMismatch {
                expected_width: settings.width,
                expected_height: settings.height,
                actual_width: width,
                actual_height: height,
            });
        }
        let row_bytes = width as usize * pixel_format::bytes_per_pixel(settings.input_format);
        if step < row_bytes {
            return Err(FrameSeekError::InvalidArgument(format!(
                "step {step} is shorter than a {width} pixel row"
            )));
        }
        let required = step.checked_mul(height as usize).ok_or_else(|| {
            FrameSeekError::InvalidArgument(format!("{height} rows of {step} bytes overflow"))
        })?;
        if frame.len() < required {
            return Err(FrameSeekError::InvalidArgument(format!(
                "frame holds {} bytes, {required} needed for {height} rows of {step}",
                frame.len()
            )));
        }

        let flip = origin == Origin::BottomLeft;
        let (data, data_step) = if flip || aligned::needs_copy(frame, step, height as usize) {
            let aligned_step = self
                .aligned
                .fill(frame, step, row_bytes, height as usize, flip);
            (self.aligned.frame(), aligned_step)
        } else {
            (&frame[..required], step)
        };

        // SAFETY: the frame borrows `data` only until the pointers are
        // cleared below; the encoder copies non-refcounted input.
        unsafe {
            let raw = self.input_frame.as_mut_ptr();
            (*raw).data[0] = data.as_ptr() as *mut u8;
            (*raw).linesize[0] = data_step as c_int;
        }

        let result = self.encode_input();

        unsafe {
            let raw = self.input_frame.as_mut_ptr();
            (*raw).data[0] = ptr::null_mut();
            (*raw).linesize[0] = 0;
        }

        result?;
        self.frame_index += 1;
        Ok(())
    }

    fn encode_input(&mut self) -> Result<(), FrameSeekError> {
        let pts = Some(self.frame_index);
        match self.scaler.as_mut() {
            Some(scaler) => {
                scaler
                    .run(&self.input_frame, &mut self.converted)
                    .map_err(|error| FrameSeekError::Conversion(error.to_string()))?;
                self.converted.set_pts(pts);
                self.encoder
                    .send_frame(&self.converted)
                    .map_err(|error| FrameSeekError::VideoEncode(format!("send_frame failed: {error}")))?;
            }
            None => {
                self.input_frame.set_pts(pts);
                self.encoder
                    .send_frame(&self.input_frame)
                    .map_err(|error| FrameSeekError::VideoEncode(format!("send_frame failed: {error}")))?;
            }
        }
        self.write_packets()
    }

    /// Mux every packet the encoder has ready.
    fn write_packets(&mut self) -> Result<(), FrameSeekError> {
        loop {
            match self.encoder.receive_packet(&mut self.packet) {
                Ok(()) => {
                    self.packet.set_stream(self.stream_index);
                    self.packet
                        .rescale_ts(self.settings.time_base, self.settings.stream_time_base);
                    self.packet
                        .write_interleaved(&mut self.output)
                        .map_err(|error| {
                            FrameSeekError::VideoEncode(format!("write packet failed: {error}"))
                        })?;
                }
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => return Ok(()),
                Err(FfmpegError::Eof) => return Ok(()),
                Err(error) => {
                    return Err(FrameSeekError::VideoEncode(format!(
                        "receive_packet failed: {error}"
                    )));
                }
            }
        }
    }

    fn finish(&mut self) -> Result<(), FrameSeekError> {
        self.encoder
            .send_eof()
            .map_err(|error| FrameSeekError::VideoEncode(format!("send_eof failed: {error}")))?;
        self.write_packets()?;
        self.output
            .write_trailer()
            .map_err(|error| FrameSeekError::VideoEncode(format!("cannot write trailer: {error}")))?;
        Ok(())
    }
}

/// Muxer matching the destination name, or `UnknownContainer`.
fn guess_container(destination: &Path) -> Result<*const AVOutputFormat, FrameSeekError> {
    let unknown = || FrameSeekError::UnknownContainer(destination.to_path_buf());
    let name = CString::new(destination.to_string_lossy().as_bytes()).map_err(|_| unknown())?;
    // SAFETY: lookup in FFmpeg's static muxer list.
    let format = unsafe { av_guess_format(ptr::null(), name.as_ptr(), ptr::null()) };
    if format.is_null() {
        return Err(unknown());
    }
    Ok(format)
}
