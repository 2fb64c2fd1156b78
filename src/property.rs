//! Numeric property access for captures.
//!
//! Tools that treat a capture generically (probes, config-driven pipelines)
//! read and write properties by identifier instead of calling typed
//! accessors. Every value is an `f64`; unsupported or unknown properties read
//! as `0.0` and refuse writes.

use ffmpeg_next::format::Pixel;
use ffmpeg_sys_next::{
    AVPixelFormat, av_guess_sample_aspect_ratio, avcodec_pix_fmt_to_codec_tag,
};

use crate::{capture::VideoCapture, codec_tag::FourCc, error::FrameSeekError, utilities};

/// Identifiers accepted by [`VideoCapture::property`] and
/// [`VideoCapture::set_property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureProperty {
    /// Timestamp of the last grabbed frame in milliseconds.
    PositionMsec,
    /// Index of the next frame.
    PositionFrames,
    /// Position relative to the duration, in `[0, 1]`.
    PositionRatio,
    /// Declared or estimated frame count.
    FrameCount,
    /// Frame width (rotation adjusted).
    FrameWidth,
    /// Frame height (rotation adjusted).
    FrameHeight,
    /// Frames per second.
    Fps,
    /// Codec FourCC packed into an integer.
    FourCc,
    /// Numerator of the sample aspect ratio.
    SarNumerator,
    /// Denominator of the sample aspect ratio.
    SarDenominator,
    /// FourCC of the decoded pixel format, or `-1`.
    CodecPixelFormat,
    /// `-1` in raw mode, `0` when decoding to BGR24.
    Format,
    /// Stream bit rate in kbit/s.
    Bitrate,
    /// Rotation from the container metadata, in degrees.
    OrientationMeta,
    /// `1` when reported dimensions follow the rotation.
    OrientationAuto,
}

impl VideoCapture {
    /// Read a property. Closed captures report `0.0` for everything.
    pub fn property(&self, property: CaptureProperty) -> f64 {
        let Ok(session) = self.session() else {
            return 0.0;
        };

        match property {
            CaptureProperty::PositionMsec => self.position_msec(),
            CaptureProperty::PositionFrames => session.frame_number as f64,
            CaptureProperty::PositionRatio => {
                let duration = session.duration_seconds();
                if duration > 0.0 {
                    (self.position_msec() / 1000.0 / duration).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
            CaptureProperty::FrameCount => session.total_frames() as f64,
            CaptureProperty::FrameWidth => session.display_size().0 as f64,
            CaptureProperty::FrameHeight => session.display_size().1 as f64,
            CaptureProperty::Fps => session.fps(),
            CaptureProperty::FourCc => {
                let tag = if session.stream.codec_tag != 0 {
                    FourCc(session.stream.codec_tag)
                } else {
                    name_fourcc(session.stream.codec.name())
                };
                tag.value() as f64
            }
            CaptureProperty::SarNumerator => self.sample_aspect_ratio().0 as f64,
            CaptureProperty::SarDenominator => self.sample_aspect_ratio().1 as f64,
            CaptureProperty::CodecPixelFormat => {
                if session.raw_mode {
                    return -1.0;
                }
                pixel_format_tag(session.decoder.format()).map_or(-1.0, |tag| tag as f64)
            }
            CaptureProperty::Format => {
                if session.raw_mode {
                    -1.0
                } else {
                    0.0
                }
            }
            CaptureProperty::Bitrate => {
                let bit_rate = if session.stream.bit_rate > 0 {
                    session.stream.bit_rate
                } else {
                    session.container_bit_rate
                };
                bit_rate.max(0) as f64 / 1000.0
            }
            CaptureProperty::OrientationMeta => session.rotation.degrees as f64,
            CaptureProperty::OrientationAuto => {
                if session.rotation.auto {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Write a property.
    ///
    /// Position properties seek; `Format = -1` enables raw mode; `Fps` sets
    /// the frame-rate override; `OrientationAuto` toggles rotation-adjusted
    /// dimensions. Returns `Ok(false)` for read-only properties and for any
    /// other `Format` value in decode mode.
    ///
    /// # Errors
    ///
    /// - [`FrameSeekError::NotOpen`] on a closed capture.
    /// - [`FrameSeekError::RawModeIrreversible`] when switching the format
    ///   back from raw mode.
    /// - [`FrameSeekError::InvalidArgument`] for a non-finite value.
    /// - Any error from the underlying seek.
    pub fn set_property(
        &mut self,
        property: CaptureProperty,
        value: f64,
    ) -> Result<bool, FrameSeekError> {
        self.session()?;
        if !value.is_finite() {
            return Err(FrameSeekError::InvalidArgument(format!(
                "{property:?} cannot be set to {value}"
            )));
        }

        match property {
            CaptureProperty::PositionFrames => {
                self.seek(value as i64)?;
                Ok(true)
            }
            CaptureProperty::PositionMsec => {
                self.seek_to_time(value / 1000.0)?;
                Ok(true)
            }
            CaptureProperty::PositionRatio => {
                self.seek_to_ratio(value)?;
                Ok(true)
            }
            CaptureProperty::Format => {
                if value == -1.0 {
                    self.set_raw_mode()?;
                    Ok(true)
                } else if self.is_raw_mode() {
                    Err(FrameSeekError::RawModeIrreversible)
                } else {
                    Ok(false)
                }
            }
            CaptureProperty::Fps => {
                if value <= 0.0 {
                    return Err(FrameSeekError::InvalidArgument(format!(
                        "frame rate must be positive, got {value}"
                    )));
                }
                self.session_mut()?.frame_rate_override = Some(value);
                Ok(true)
            }
            CaptureProperty::OrientationAuto => {
                self.set_auto_rotate(value != 0.0)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn position_msec(&self) -> f64 {
        let Ok(session) = self.session() else {
            return 0.0;
        };
        match session.picture_pts {
            Some(pts) => {
                utilities::timestamp_to_seconds(pts, session.stream.start_time, session.stream.time_base)
                    * 1000.0
            }
            None => 0.0,
        }
    }

    /// Sample aspect ratio guessed from the stream and the last frame.
    fn sample_aspect_ratio(&self) -> (i32, i32) {
        let Ok(session) = self.session() else {
            return (0, 1);
        };
        // SAFETY: both pointers belong to the open session; a null frame is
        // accepted by FFmpeg.
        let ratio = unsafe {
            let context = session.input.as_ptr() as *mut _;
            let stream = *(*session.input.as_ptr()).streams.add(session.stream.index);
            av_guess_sample_aspect_ratio(context, stream, std::ptr::null_mut())
        };
        (ratio.num, ratio.den)
    }
}

/// Pack the first four characters of a codec name as a tag.
pub(crate) fn name_fourcc(name: &str) -> FourCc {
    let mut code = [b' '; 4];
    for (slot, byte) in code.iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
    FourCc::new(code)
}

fn pixel_format_tag(format: Pixel) -> Option<u32> {
    if format == Pixel::None {
        return None;
    }
    // SAFETY: pure table lookup.
    let tag = unsafe { avcodec_pix_fmt_to_codec_tag(AVPixelFormat::from(format)) };
    if tag == 0 { None } else { Some(tag) }
}
