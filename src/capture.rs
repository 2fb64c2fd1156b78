//! Decode session: open a source, grab frames, retrieve pixels.
//!
//! [`VideoCapture`] follows a two-step read protocol. [`grab`](VideoCapture::grab)
//! advances to the next picture (or, in raw mode, the next compressed
//! packet) without converting anything; [`retrieve`](VideoCapture::retrieve)
//! converts the last grabbed picture into interleaved BGR24 and lends it out.
//! Grabbing without retrieving is how the seeker walks forward cheaply.
//!
//! Only the first video stream of the container is decoded. Packets of every
//! other stream are read and dropped.

use std::ffi::CString;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::ptr;
use std::time::Duration;

use ffmpeg_next::{
    Dictionary, Error as FfmpegError, Packet, Rational,
    codec::{Id, Parameters, context::Context as CodecContext, decoder},
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::error::EAGAIN,
};
use ffmpeg_sys_next::{
    AV_NOPTS_VALUE, AV_TIME_BASE, AVDiscard, AVPacketSideDataType, AVSEEK_FLAG_BACKWARD,
    av_display_rotation_get, av_find_input_format, av_packet_side_data_get, av_seek_frame,
    avformat_alloc_context, avformat_close_input, avformat_find_stream_info, avformat_open_input,
};

use crate::{
    bitstream::RawPacketFilter,
    configuration::{CaptureOptions, DISCARD_KEY, INPUT_FORMAT_KEY, VIDEO_CODEC_KEY},
    error::FrameSeekError,
    interrupt::Watchdog,
    seek::FrameSource,
    utilities,
};

/// Packets consumed without producing a frame before `grab` gives up.
pub const MAX_READ_ATTEMPTS: u32 = 512;

/// Below this a duration or frame rate is treated as unknown.
const EPSILON: f64 = 0.000025;

/// A frame (or raw packet) lent out by [`VideoCapture::retrieve`].
///
/// The view is valid until the next call on the capture.
#[derive(Debug, Clone, Copy)]
pub struct RetrievedFrame<'a> {
    /// Interleaved pixel bytes, `step * height` long. In raw mode the
    /// compressed packet.
    pub data: &'a [u8],
    /// Bytes per row.
    pub step: usize,
    /// Pixels per row (packet length in raw mode).
    pub width: u32,
    /// Rows (1 in raw mode).
    pub height: u32,
    /// Interleaved channels: 3 for BGR24, 1 in raw mode.
    pub channels: u32,
}

impl RetrievedFrame<'_> {
    /// Bytes of row `y` without the trailing stride padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.step;
        let len = self.width as usize * self.channels as usize;
        self.data.get(start..start + len)
    }

    /// Copy into a tightly packed BGR buffer (`width * height * 3` bytes).
    pub fn to_packed(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity((self.width * self.height * self.channels) as usize);
        for y in 0..self.height {
            if let Some(row) = self.row(y) {
                packed.extend_from_slice(row);
            }
        }
        packed
    }
}

/// Rotation read from the container at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    /// Clockwise display rotation in degrees, in `[0, 360)`.
    pub degrees: i32,
    /// Whether reported dimensions account for the rotation.
    pub auto: bool,
}

impl Rotation {
    /// Dimensions as displayed: swapped for quarter turns when `auto` is set.
    pub fn display_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.auto && self.degrees % 180 != 0 {
            (height, width)
        } else {
            (width, height)
        }
    }
}

/// Normalise a display rotation to `[0, 360)` whole degrees.
pub fn normalize_rotation(degrees: f64) -> i32 {
    (degrees.round() as i32).rem_euclid(360)
}

/// Static facts about the selected video stream.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamInfo {
    pub(crate) index: usize,
    pub(crate) time_base: Rational,
    pub(crate) start_time: i64,
    pub(crate) avg_frame_rate: Rational,
    pub(crate) real_frame_rate: Rational,
    pub(crate) duration: i64,
    pub(crate) frames: i64,
    pub(crate) codec: Id,
    pub(crate) codec_tag: u32,
    pub(crate) bit_rate: i64,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

struct CachedScaler {
    context: ScalingContext,
    key: (Pixel, u32, u32),
}

/// Everything owned by an open capture.
///
/// Field order is drop order: the format context goes first because its
/// teardown may still poll the watchdog.
pub(crate) struct CaptureSession {
    pub(crate) input: Input,
    pub(crate) decoder: decoder::Video,
    pub(crate) parameters: Parameters,
    pub(crate) stream: StreamInfo,
    /// Container duration in `AV_TIME_BASE` units.
    pub(crate) container_duration: i64,
    pub(crate) container_bit_rate: i64,
    packet: Packet,
    frame: VideoFrame,
    converted: VideoFrame,
    scaler: Option<CachedScaler>,
    raw_filter: Option<RawPacketFilter>,
    /// Frames grabbed so far; the index of the next frame.
    pub(crate) frame_number: i64,
    pub(crate) first_frame_number: Option<i64>,
    pub(crate) picture_pts: Option<i64>,
    has_frame: bool,
    has_packet: bool,
    draining: bool,
    finished: bool,
    pub(crate) raw_mode: bool,
    pub(crate) rotation: Rotation,
    pub(crate) frame_rate_override: Option<f64>,
    read_timeout: Duration,
    watchdog: Box<Watchdog>,
}

/// Decode session over one media source.
///
/// # Example
///
/// ```no_run
/// use frameseek::VideoCapture;
///
/// let mut capture = VideoCapture::open("input.mp4")?;
/// capture.seek(120)?;
/// capture.grab()?;
/// let frame = capture.retrieve()?;
/// println!("{}x{} BGR, stride {}", frame.width, frame.height, frame.step);
/// # Ok::<(), frameseek::FrameSeekError>(())
/// ```
pub struct VideoCapture {
    state: CaptureState,
    source: PathBuf,
}

enum CaptureState {
    Closed,
    Open(Box<CaptureSession>),
}

impl Debug for VideoCapture {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut debug = f.debug_struct("VideoCapture");
        debug.field("source", &self.source);
        match &self.state {
            CaptureState::Closed => debug.field("state", &"closed"),
            CaptureState::Open(session) => debug
                .field("state", &"open")
                .field("stream", &session.stream)
                .field("frame_number", &session.frame_number)
                .field("raw_mode", &session.raw_mode)
                .field("rotation", &session.rotation),
        };
        debug.finish_non_exhaustive()
    }
}

impl VideoCapture {
    /// Open `source` with options from the environment (see
    /// [`CaptureOptions::from_env`]).
    ///
    /// # Errors
    ///
    /// See [`open_with_options`](Self::open_with_options).
    pub fn open<P: AsRef<Path>>(source: P) -> Result<Self, FrameSeekError> {
        Self::open_with_options(source, &CaptureOptions::from_env())
    }

    /// Open `source` with explicit options.
    ///
    /// # Errors
    ///
    /// - [`FrameSeekError::FileOpen`] if the demuxer cannot open the source.
    /// - [`FrameSeekError::Timeout`] if opening exceeds the open budget.
    /// - [`FrameSeekError::NoVideoStream`] if the source has no video.
    /// - [`FrameSeekError::DecoderOpen`] if no decoder can be opened.
    ///
    /// Every resource acquired before the failure is released.
    pub fn open_with_options<P: AsRef<Path>>(
        source: P,
        options: &CaptureOptions,
    ) -> Result<Self, FrameSeekError> {
        let source = source.as_ref().to_path_buf();
        log::debug!("Opening capture source: {}", source.display());

        crate::ffmpeg::initialize()?;

        let mut session = CaptureSession::open(&source, options)?;
        if options.raw_mode {
            session.enable_raw_mode();
        }
        log::debug!(
            "Opened {} ({:?}, {}x{}, {:.3} fps, {} frames)",
            source.display(),
            session.stream.codec,
            session.stream.width,
            session.stream.height,
            session.fps(),
            session.total_frames(),
        );

        Ok(Self {
            state: CaptureState::Open(Box::new(session)),
            source,
        })
    }

    /// Release every native handle. Calling it again does nothing.
    pub fn close(&mut self) {
        if let CaptureState::Open(_) = self.state {
            log::debug!("Closing capture {}", self.source.display());
        }
        self.state = CaptureState::Closed;
    }

    /// Whether the capture currently holds an open source.
    pub fn is_opened(&self) -> bool {
        matches!(self.state, CaptureState::Open(_))
    }

    /// The source passed to `open`.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub(crate) fn session(&self) -> Result<&CaptureSession, FrameSeekError> {
        match &self.state {
            CaptureState::Open(session) => Ok(session),
            CaptureState::Closed => Err(FrameSeekError::NotOpen),
        }
    }

    pub(crate) fn session_mut(&mut self) -> Result<&mut CaptureSession, FrameSeekError> {
        match &mut self.state {
            CaptureState::Open(session) => Ok(session),
            CaptureState::Closed => Err(FrameSeekError::NotOpen),
        }
    }

    /// Advance to the next frame (or packet in raw mode).
    ///
    /// # Errors
    ///
    /// - [`FrameSeekError::EndOfStream`] once the stream is exhausted; every
    ///   later call fails the same way until the next seek.
    /// - [`FrameSeekError::Timeout`] if the read budget is exceeded.
    /// - [`FrameSeekError::RetryLimitExceeded`] after
    ///   [`MAX_READ_ATTEMPTS`] packets without a frame.
    pub fn grab(&mut self) -> Result<(), FrameSeekError> {
        self.session_mut()?.grab()
    }

    /// Lend out the last grabbed frame as BGR24, or the last packet in raw
    /// mode.
    ///
    /// # Errors
    ///
    /// - [`FrameSeekError::NoFrame`] if nothing has been grabbed.
    /// - [`FrameSeekError::Conversion`] if the pixel converter fails.
    /// - [`FrameSeekError::BitstreamFilter`] if raw reformatting fails.
    pub fn retrieve(&mut self) -> Result<RetrievedFrame<'_>, FrameSeekError> {
        self.session_mut()?.retrieve()
    }

    /// [`grab`](Self::grab) followed by [`retrieve`](Self::retrieve).
    pub fn read(&mut self) -> Result<RetrievedFrame<'_>, FrameSeekError> {
        let session = self.session_mut()?;
        session.grab()?;
        session.retrieve()
    }

    /// Switch to raw packet passthrough. Cannot be undone.
    ///
    /// Call it before the first `grab`; enabling it later only logs a
    /// warning.
    pub fn set_raw_mode(&mut self) -> Result<(), FrameSeekError> {
        self.session_mut()?.enable_raw_mode();
        Ok(())
    }

    /// Whether raw passthrough is enabled.
    pub fn is_raw_mode(&self) -> bool {
        self.session().map(|s| s.raw_mode).unwrap_or(false)
    }

    /// Display rotation metadata.
    pub fn rotation(&self) -> Option<Rotation> {
        self.session().ok().map(|s| s.rotation)
    }

    /// Toggle whether [`width`](Self::width) and [`height`](Self::height)
    /// account for a 90° or 270° rotation.
    pub fn set_auto_rotate(&mut self, auto: bool) -> Result<(), FrameSeekError> {
        self.session_mut()?.rotation.auto = auto;
        Ok(())
    }

    /// Frame width, swapped with the height for quarter-turn rotations when
    /// auto-rotation is enabled. Zero when closed.
    pub fn width(&self) -> u32 {
        self.session().map(|s| s.display_size().0).unwrap_or(0)
    }

    /// Frame height; see [`width`](Self::width).
    pub fn height(&self) -> u32 {
        self.session().map(|s| s.display_size().1).unwrap_or(0)
    }

    /// Frames per second used for frame arithmetic. Zero when closed.
    pub fn fps(&self) -> f64 {
        self.session().map(CaptureSession::fps).unwrap_or(0.0)
    }

    /// Declared or estimated frame count. Zero when closed.
    pub fn total_frames(&self) -> i64 {
        self.session().map(CaptureSession::total_frames).unwrap_or(0)
    }

    /// Duration in seconds. Zero when closed.
    pub fn duration_seconds(&self) -> f64 {
        self.session().map(CaptureSession::duration_seconds).unwrap_or(0.0)
    }

    /// Index of the frame the next `grab` returns.
    pub fn frame_number(&self) -> i64 {
        self.session().map(|s| s.frame_number).unwrap_or(0)
    }

    /// Presentation timestamp of the last grabbed frame, in stream units.
    pub fn picture_pts(&self) -> Option<i64> {
        self.session().ok().and_then(|s| s.picture_pts)
    }

    /// Short name of the video codec.
    pub fn codec_name(&self) -> Option<&'static str> {
        self.session().ok().map(|s| s.stream.codec.name())
    }

    /// Short name of the container format.
    pub fn format_name(&self) -> Option<String> {
        self.session()
            .ok()
            .map(|s| s.input.format().name().to_string())
    }
}

impl CaptureSession {
    fn open(source: &Path, options: &CaptureOptions) -> Result<Self, FrameSeekError> {
        let watchdog = Box::new(Watchdog::new());
        let input = open_input(source, options, &watchdog)?;

        let stream = input
            .streams()
            .find(|stream| stream.parameters().medium() == Type::Video)
            .ok_or(FrameSeekError::NoVideoStream)?;

        let index = stream.index();
        let parameters = stream.parameters();
        // SAFETY: `parameters` wraps the stream's live codecpar.
        let (codec_tag, bit_rate, declared_width, declared_height) = unsafe {
            let raw = &*parameters.as_ptr();
            (raw.codec_tag, raw.bit_rate, raw.width, raw.height)
        };
        let rotation = Rotation {
            degrees: read_rotation(&stream),
            auto: true,
        };

        let mut info = StreamInfo {
            index,
            time_base: stream.time_base(),
            start_time: stream.start_time(),
            avg_frame_rate: stream.avg_frame_rate(),
            real_frame_rate: stream.rate(),
            duration: stream.duration(),
            frames: stream.frames(),
            codec: parameters.id(),
            codec_tag,
            bit_rate,
            width: declared_width.max(0) as u32,
            height: declared_height.max(0) as u32,
        };
        let parameters = parameters.clone();

        let decoder = open_decoder(&parameters, options, declared_width, declared_height)?;
        if info.width == 0 || info.height == 0 {
            info.width = decoder.width();
            info.height = decoder.height();
        }

        let container_duration = input.duration();
        let container_bit_rate = input.bit_rate();
        let frame_rate_override = options.frame_rate.map(f64::from);

        Ok(Self {
            input,
            decoder,
            parameters,
            stream: info,
            container_duration,
            container_bit_rate,
            packet: Packet::empty(),
            frame: VideoFrame::empty(),
            converted: VideoFrame::empty(),
            scaler: None,
            raw_filter: None,
            frame_number: 0,
            first_frame_number: None,
            picture_pts: None,
            has_frame: false,
            has_packet: false,
            draining: false,
            finished: false,
            raw_mode: false,
            rotation,
            frame_rate_override,
            read_timeout: options.read_timeout,
            watchdog,
        })
    }

    pub(crate) fn enable_raw_mode(&mut self) {
        if self.raw_mode {
            return;
        }
        if self.frame_number != 0 {
            log::warn!("Raw mode enabled after {} grabs; do not grab frames before enabling raw mode", self.frame_number);
        }
        self.raw_mode = true;
        self.has_frame = false;
    }

    pub(crate) fn display_size(&self) -> (u32, u32) {
        self.rotation
            .display_size(self.stream.width, self.stream.height)
    }

    pub(crate) fn fps(&self) -> f64 {
        if let Some(fps) = self.frame_rate_override {
            return fps;
        }
        let avg = utilities::rational_to_f64(self.stream.avg_frame_rate);
        if avg >= EPSILON {
            return avg;
        }
        let real = utilities::rational_to_f64(self.stream.real_frame_rate);
        if real >= EPSILON {
            return real;
        }
        let tick = utilities::rational_to_f64(self.stream.time_base);
        if tick >= EPSILON { 1.0 / tick } else { 0.0 }
    }

    pub(crate) fn duration_seconds(&self) -> f64 {
        let container = self.container_duration as f64 / AV_TIME_BASE as f64;
        if self.container_duration != AV_NOPTS_VALUE && container >= EPSILON {
            return container;
        }
        if self.stream.duration == AV_NOPTS_VALUE {
            return 0.0;
        }
        self.stream.duration as f64 * utilities::rational_to_f64(self.stream.time_base)
    }

    pub(crate) fn total_frames(&self) -> i64 {
        if self.stream.frames > 0 {
            return self.stream.frames;
        }
        (self.duration_seconds() * self.fps() + 0.5).floor() as i64
    }

    fn timestamp_to_frame_number(&self, timestamp: i64) -> i64 {
        utilities::timestamp_to_frame_number(
            timestamp,
            self.stream.start_time,
            self.stream.time_base,
            self.fps(),
        )
    }

    fn grab(&mut self) -> Result<(), FrameSeekError> {
        self.has_frame = false;
        self.has_packet = false;
        if let Some(filter) = self.raw_filter.as_mut() {
            filter.invalidate();
        }

        if self.finished {
            return Err(FrameSeekError::EndOfStream);
        }
        if self.stream.frames > 0 && self.frame_number > self.stream.frames {
            return Err(FrameSeekError::EndOfStream);
        }

        self.watchdog.arm(self.read_timeout);
        let result = self.read_next();
        self.watchdog.disarm();

        match result {
            Ok(pts) => {
                self.picture_pts = pts;
                self.frame_number += 1;
                if self.first_frame_number.is_none() {
                    let baseline =
                        self.timestamp_to_frame_number(pts.unwrap_or(self.stream.start_time));
                    log::debug!("First frame number established at {baseline}");
                    self.first_frame_number = Some(baseline);
                }
                Ok(())
            }
            Err(FrameSeekError::EndOfStream) => {
                self.finished = true;
                Err(FrameSeekError::EndOfStream)
            }
            Err(error) => Err(error),
        }
    }

    /// Read until a frame (or raw packet) is available and return its
    /// timestamp.
    fn read_next(&mut self) -> Result<Option<i64>, FrameSeekError> {
        let mut attempts = 0u32;
        loop {
            if self.watchdog.has_fired() || self.watchdog.check() {
                return Err(self.read_timeout_error());
            }

            if !self.raw_mode {
                match self.decoder.receive_frame(&mut self.frame) {
                    Ok(()) => {
                        self.has_frame = true;
                        return Ok(self.decoded_pts());
                    }
                    Err(FfmpegError::Eof) => return Err(FrameSeekError::EndOfStream),
                    Err(FfmpegError::Other { errno }) if errno == EAGAIN => {}
                    Err(error) => log::debug!("Decoder produced no frame: {error}"),
                }
                if self.draining {
                    return Err(FrameSeekError::EndOfStream);
                }
            }

            if attempts > MAX_READ_ATTEMPTS {
                log::warn!("No video frame after {attempts} packets");
                return Err(FrameSeekError::RetryLimitExceeded { attempts });
            }

            self.packet = Packet::empty();
            match self.packet.read(&mut self.input) {
                Ok(()) => {}
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => continue,
                Err(FfmpegError::Eof) => {
                    if self.raw_mode {
                        return Err(FrameSeekError::EndOfStream);
                    }
                    self.decoder.send_eof()?;
                    self.draining = true;
                    continue;
                }
                Err(error) => {
                    if self.watchdog.has_fired() {
                        return Err(self.read_timeout_error());
                    }
                    log::debug!("Packet read failed: {error}");
                    attempts += 1;
                    continue;
                }
            }

            if self.packet.stream() != self.stream.index {
                attempts += 1;
                continue;
            }

            if self.raw_mode {
                self.has_packet = true;
                return Ok(self.packet.pts().or(self.packet.dts()));
            }

            if let Err(error) = self.decoder.send_packet(&self.packet) {
                log::debug!("Decoder rejected packet: {error}");
            }
            attempts += 1;
        }
    }

    fn read_timeout_error(&self) -> FrameSeekError {
        FrameSeekError::Timeout {
            operation: "read",
            budget_ms: self.read_timeout.as_millis() as u64,
        }
    }

    /// `pts` when present and non-zero, otherwise the packet dts.
    fn decoded_pts(&self) -> Option<i64> {
        match self.frame.pts() {
            Some(pts) if pts != 0 && pts != AV_NOPTS_VALUE => Some(pts),
            _ => {
                // SAFETY: the frame was just filled by the decoder.
                let dts = unsafe { (*self.frame.as_ptr()).pkt_dts };
                if dts == AV_NOPTS_VALUE { self.frame.pts() } else { Some(dts) }
            }
        }
    }

    fn retrieve(&mut self) -> Result<RetrievedFrame<'_>, FrameSeekError> {
        if self.raw_mode {
            if !self.has_packet {
                return Err(FrameSeekError::NoFrame);
            }
            let codec = self.stream.codec;
            let filter = self
                .raw_filter
                .get_or_insert_with(|| RawPacketFilter::new(codec));
            let data = filter.process(&self.packet, &self.parameters, self.stream.time_base)?;
            return Ok(RetrievedFrame {
                data,
                step: data.len(),
                width: data.len() as u32,
                height: 1,
                channels: 1,
            });
        }

        if !self.has_frame {
            return Err(FrameSeekError::NoFrame);
        }

        let key = (self.frame.format(), self.frame.width(), self.frame.height());
        if self.scaler.as_ref().map(|cached| cached.key) != Some(key) {
            let (format, width, height) = key;
            let context = ScalingContext::get(
                format,
                width,
                height,
                Pixel::BGR24,
                width,
                height,
                ScalingFlags::BICUBIC,
            )
            .map_err(|error| {
                FrameSeekError::Conversion(format!(
                    "cannot convert {format:?} {width}x{height} to BGR24: {error}"
                ))
            })?;
            log::debug!("Built BGR24 converter for {format:?} {width}x{height}");
            self.scaler = Some(CachedScaler { context, key });
            self.converted = VideoFrame::empty();
        }

        let Some(scaler) = self.scaler.as_mut() else {
            return Err(FrameSeekError::NoFrame);
        };
        scaler
            .context
            .run(&self.frame, &mut self.converted)
            .map_err(|error| FrameSeekError::Conversion(error.to_string()))?;

        let (_, width, height) = key;
        Ok(RetrievedFrame {
            data: self.converted.data(0),
            step: self.converted.stride(0),
            width,
            height,
            channels: 3,
        })
    }

    /// Backward container seek (when `container_seek`) plus decoder flush.
    fn reposition(&mut self, timestamp: i64, container_seek: bool) {
        if container_seek {
            // SAFETY: the format context is open and owned by this session.
            let ret = unsafe {
                av_seek_frame(
                    self.input.as_mut_ptr(),
                    self.stream.index as c_int,
                    timestamp,
                    AVSEEK_FLAG_BACKWARD as c_int,
                )
            };
            if ret < 0 {
                log::debug!(
                    "Container seek to {timestamp} failed: {}",
                    FfmpegError::from(ret)
                );
            }
        }
        self.decoder.flush();
        self.packet = Packet::empty();
        self.picture_pts = None;
        self.has_frame = false;
        self.has_packet = false;
        self.draining = false;
        self.finished = false;
    }
}

impl FrameSource for CaptureSession {
    fn total_frames(&self) -> i64 {
        CaptureSession::total_frames(self)
    }

    fn fps(&self) -> f64 {
        CaptureSession::fps(self)
    }

    fn time_base(&self) -> Rational {
        self.stream.time_base
    }

    fn start_time(&self) -> i64 {
        self.stream.start_time
    }

    fn first_frame_number(&self) -> Option<i64> {
        self.first_frame_number
    }

    fn frame_number(&self) -> i64 {
        self.frame_number
    }

    fn set_frame_number(&mut self, frame_number: i64) {
        self.frame_number = frame_number;
    }

    fn picture_pts(&self) -> Option<i64> {
        self.picture_pts
    }

    fn grab(&mut self) -> Result<(), FrameSeekError> {
        CaptureSession::grab(self)
    }

    fn reposition(&mut self, timestamp: i64, container_seek: bool) {
        CaptureSession::reposition(self, timestamp, container_seek);
    }
}

/// Open the demuxer with the watchdog installed and probe stream info.
fn open_input(
    source: &Path,
    options: &CaptureOptions,
    watchdog: &Watchdog,
) -> Result<Input, FrameSeekError> {
    let open_error = |reason: String| FrameSeekError::FileOpen {
        path: source.to_path_buf(),
        reason,
    };

    let c_source = CString::new(source.to_string_lossy().as_bytes())
        .map_err(|_| open_error("source contains an interior NUL byte".to_string()))?;

    let forced_format = match options.option(INPUT_FORMAT_KEY) {
        Some(name) => {
            let c_name = CString::new(name)
                .map_err(|_| open_error(format!("invalid input format name {name:?}")))?;
            // SAFETY: lookup in FFmpeg's static demuxer list.
            let format = unsafe { av_find_input_format(c_name.as_ptr()) };
            if format.is_null() {
                log::warn!("Unknown input format '{name}', letting FFmpeg probe");
            } else {
                log::debug!("Forcing input format '{name}'");
            }
            format
        }
        None => ptr::null(),
    };

    let mut dictionary = Dictionary::new();
    for (key, value) in options.demuxer_entries() {
        if key == INPUT_FORMAT_KEY || key == VIDEO_CODEC_KEY || key == DISCARD_KEY {
            continue;
        }
        dictionary.set(&key, &value);
    }

    // SAFETY: allocation only; ownership passes to `avformat_open_input`.
    let mut context = unsafe { avformat_alloc_context() };
    if context.is_null() {
        return Err(open_error("could not allocate a format context".to_string()));
    }
    unsafe {
        (*context).interrupt_callback = watchdog.callback();
    }

    watchdog.arm(options.open_timeout);
    // SAFETY: `context` is freshly allocated; FFmpeg frees it on failure.
    // The dictionary is handed over and whatever FFmpeg leaves in it is
    // reclaimed right after.
    let ret = unsafe {
        let mut raw_dictionary = dictionary.disown();
        let ret = avformat_open_input(
            &mut context,
            c_source.as_ptr(),
            forced_format,
            &mut raw_dictionary,
        );
        let leftover = Dictionary::own(raw_dictionary);
        for (key, _) in leftover.iter() {
            log::debug!("Demuxer ignored option '{key}'");
        }
        ret
    };
    if ret < 0 {
        let timed_out = watchdog.has_fired();
        watchdog.disarm();
        if timed_out {
            return Err(FrameSeekError::Timeout {
                operation: "open",
                budget_ms: options.open_timeout.as_millis() as u64,
            });
        }
        return Err(open_error(FfmpegError::from(ret).to_string()));
    }

    // SAFETY: `context` was opened above.
    let ret = unsafe { avformat_find_stream_info(context, ptr::null_mut()) };
    let timed_out = watchdog.has_fired();
    watchdog.disarm();
    if ret < 0 || timed_out {
        // SAFETY: closes and frees the context opened above.
        unsafe { avformat_close_input(&mut context) };
        if timed_out {
            return Err(FrameSeekError::Timeout {
                operation: "open",
                budget_ms: options.open_timeout.as_millis() as u64,
            });
        }
        return Err(open_error(format!(
            "could not read stream info: {}",
            FfmpegError::from(ret)
        )));
    }

    // SAFETY: the context is open; `Input` takes over closing it.
    Ok(unsafe { Input::wrap(context) })
}

/// Open the video decoder for the selected stream.
fn open_decoder(
    parameters: &Parameters,
    options: &CaptureOptions,
    declared_width: i32,
    declared_height: i32,
) -> Result<decoder::Video, FrameSeekError> {
    let mut context = CodecContext::from_parameters(parameters.clone())
        .map_err(|error| FrameSeekError::DecoderOpen(error.to_string()))?;

    let discard = options.option(DISCARD_KEY).and_then(parse_discard);
    // SAFETY: configuring the context before it is opened.
    unsafe {
        let raw = context.as_mut_ptr();
        (*raw).thread_count = 1;
        if let Some(discard) = discard {
            (*raw).skip_frame = discard;
        }
    }

    let opened = match options.option(VIDEO_CODEC_KEY) {
        Some(name) => {
            let codec = decoder::find_by_name(name).ok_or_else(|| {
                FrameSeekError::DecoderOpen(format!("decoder '{name}' is not available"))
            })?;
            log::debug!("Using decoder '{name}'");
            context.decoder().open_as(codec)
        }
        None => context.decoder().open(),
    }
    .map_err(|error| FrameSeekError::DecoderOpen(error.to_string()))?;

    let mut decoder = opened
        .video()
        .map_err(|error| FrameSeekError::DecoderOpen(error.to_string()))?;

    // Some decoders reset the declared size while opening.
    if declared_width > 0 && declared_height > 0 {
        // SAFETY: the decoder is open and exclusively owned here.
        unsafe {
            let raw = decoder.as_mut_ptr();
            if (*raw).width != declared_width || (*raw).height != declared_height {
                (*raw).width = declared_width;
                (*raw).height = declared_height;
            }
        }
    }

    Ok(decoder)
}

/// Map an `avdiscard` option value to the decoder's skip mode.
pub(crate) fn parse_discard(value: &str) -> Option<AVDiscard> {
    let discard = match value.trim().to_ascii_lowercase().as_str() {
        "all" => AVDiscard::AVDISCARD_ALL,
        "bidir" => AVDiscard::AVDISCARD_BIDIR,
        "default" => AVDiscard::AVDISCARD_DEFAULT,
        "none" => AVDiscard::AVDISCARD_NONE,
        "nonintra" => AVDiscard::AVDISCARD_NONINTRA,
        "nonkey" => AVDiscard::AVDISCARD_NONKEY,
        "nonref" => AVDiscard::AVDISCARD_NONREF,
        other => {
            log::warn!("Ignoring unknown {DISCARD_KEY} value '{other}'");
            return None;
        }
    };
    Some(discard)
}

/// Rotation from the `rotate` tag, else from the display matrix side data.
fn read_rotation(stream: &ffmpeg_next::format::stream::Stream<'_>) -> i32 {
    if let Some(tag) = stream.metadata().get("rotate") {
        if let Ok(degrees) = tag.trim().parse::<f64>() {
            return normalize_rotation(degrees);
        }
    }

    // SAFETY: read-only access to the stream's codec parameters; the side
    // data entry, when present, holds a 3x3 display matrix.
    unsafe {
        let parameters = (*stream.as_ptr()).codecpar;
        if parameters.is_null() {
            return 0;
        }
        let side_data = av_packet_side_data_get(
            (*parameters).coded_side_data,
            (*parameters).nb_coded_side_data,
            AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if side_data.is_null() || (*side_data).size < 9 * 4 {
            return 0;
        }
        let matrix = (*side_data).data as *const i32;
        normalize_rotation(-av_display_rotation_get(matrix))
    }
}
