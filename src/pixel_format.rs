//! Encoder pixel-format, bit-rate and time-base negotiation.
//!
//! The writer accepts BGR24 or GRAY8 frames. Most encoders want something
//! else, so [`negotiate`] picks the encoder-side format per codec; when it
//! differs from the input the writer converts through libswscale.

use ffmpeg_next::Rational;
use ffmpeg_next::codec::Id;
use ffmpeg_next::format::Pixel;

use crate::codec_tag::FourCc;

/// Bit rate budget per pixel per frame, before codec specific scaling.
const BASE_BITRATE_SCALE: f64 = 1.0;
/// Largest bit rate handed to an encoder.
const MAX_BITRATE: f64 = (i32::MAX / 2) as f64;
/// Time base denominator ceiling for MPEG-4 part 2.
const MPEG4_MAX_TIME_BASE_DEN: i32 = 65535;

/// Result of pixel-format negotiation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Negotiation {
    /// Format the encoder is opened with.
    pub encoder_format: Pixel,
    /// Multiplier applied to `fps * width * height` for the bit rate.
    pub bitrate_scale: f64,
}

impl Negotiation {
    fn keep(format: Pixel) -> Self {
        Self {
            encoder_format: format,
            bitrate_scale: BASE_BITRATE_SCALE,
        }
    }

    /// Whether frames must go through a conversion step.
    pub fn needs_conversion(&self, input: Pixel) -> bool {
        self.encoder_format != input
    }
}

/// Choose the encoder pixel format for `codec` given the caller's `input`.
pub fn negotiate(codec: Id, input: Pixel, fourcc: FourCc) -> Negotiation {
    let format = match codec {
        Id::JPEGLS => input,
        Id::HUFFYUV => match input {
            Pixel::RGB24 | Pixel::BGRA => input,
            Pixel::BGR24 => Pixel::RGB24,
            _ => Pixel::YUV422P,
        },
        Id::PNG => match input {
            Pixel::GRAY8 | Pixel::GRAY16BE | Pixel::RGB24 | Pixel::BGRA => input,
            Pixel::GRAY16LE => Pixel::GRAY16BE,
            Pixel::BGR24 => Pixel::RGB24,
            _ => Pixel::YUV422P,
        },
        Id::FFV1 => match input {
            Pixel::GRAY8 | Pixel::GRAY16LE | Pixel::BGRZ | Pixel::BGRA => input,
            Pixel::GRAY16BE => Pixel::GRAY16LE,
            Pixel::BGR24 | Pixel::RGB24 => Pixel::BGRZ,
            _ => Pixel::YUV422P,
        },
        Id::MJPEG | Id::LJPEG => {
            return Negotiation {
                encoder_format: Pixel::YUVJ420P,
                bitrate_scale: 3.0,
            };
        }
        Id::RAWVIDEO => {
            if fourcc == FourCc::new(*b"RGBA") {
                Pixel::RGBA
            } else if matches!(input, Pixel::GRAY8 | Pixel::GRAY16LE | Pixel::GRAY16BE) {
                input
            } else {
                Pixel::YUV420P
            }
        }
        _ => Pixel::YUV420P,
    };
    Negotiation::keep(format)
}

/// Encoder bit rate: `scale * fps * width * height`, clamped to
/// `[1, i32::MAX / 2]`.
pub fn bitrate(scale: f64, frames_per_second: f64, width: u32, height: u32) -> usize {
    let raw = scale * frames_per_second * width as f64 * height as f64;
    let clamped = raw.min(MAX_BITRATE).round();
    if clamped < 1.0 { 1 } else { clamped as usize }
}

/// Encoder time base for `frames_per_second`.
///
/// The frame rate is first expressed as `frame_rate / frame_rate_base`.
/// When the encoder only supports a fixed list of rates, the nearest listed
/// rate is used instead. MPEG-4 part 2 additionally caps the denominator.
pub fn time_base(frames_per_second: f64, codec: Id, supported: &[Rational]) -> Rational {
    let (frame_rate, frame_rate_base) = crate::utilities::frame_rate_fraction(frames_per_second);
    let mut rate = Rational::new(frame_rate, frame_rate_base);

    if let Some(nearest) = nearest_rate(rate, supported) {
        if nearest != rate {
            log::debug!("Snapping frame rate {rate} to supported {nearest}");
        }
        rate = nearest;
    }

    let mut base = Rational::new(rate.denominator(), rate.numerator());
    if codec == Id::MPEG4 && base.denominator() > MPEG4_MAX_TIME_BASE_DEN {
        base = limit_denominator(base, MPEG4_MAX_TIME_BASE_DEN);
    }
    base
}

fn nearest_rate(rate: Rational, supported: &[Rational]) -> Option<Rational> {
    let target = crate::utilities::rational_to_f64(rate);
    supported
        .iter()
        .copied()
        .filter(|candidate| candidate.denominator() != 0)
        .min_by(|a, b| {
            let da = (crate::utilities::rational_to_f64(*a) - target).abs();
            let db = (crate::utilities::rational_to_f64(*b) - target).abs();
            da.total_cmp(&db)
        })
}

/// Closest fraction to `value` whose numerator and denominator stay within
/// `max` (continued fraction expansion).
fn limit_denominator(value: Rational, max: i32) -> Rational {
    let target = crate::utilities::rational_to_f64(value);
    let (mut p0, mut q0, mut p1, mut q1) = (0i64, 1i64, 1i64, 0i64);
    let mut x = target;
    loop {
        let a = x.floor() as i64;
        let p2 = a * p1 + p0;
        let q2 = a * q1 + q0;
        if p2 > max as i64 || q2 > max as i64 {
            break;
        }
        (p0, q0, p1, q1) = (p1, q1, p2, q2);
        let fraction = x - a as f64;
        if fraction < 1e-12 {
            break;
        }
        x = 1.0 / fraction;
    }
    if q1 == 0 || p1 == 0 {
        return Rational::new(1, max);
    }
    Rational::new(p1 as i32, q1 as i32)
}

/// Number of interleaved channels a caller supplies for `format`.
pub fn input_channels(format: Pixel) -> u32 {
    match format {
        Pixel::GRAY8 => 1,
        Pixel::GRAY16LE | Pixel::GRAY16BE => 1,
        Pixel::BGRA | Pixel::RGBA | Pixel::BGRZ => 4,
        _ => 3,
    }
}

/// Bytes per pixel of a caller-supplied packed format.
pub fn bytes_per_pixel(format: Pixel) -> usize {
    match format {
        Pixel::GRAY8 => 1,
        Pixel::GRAY16LE | Pixel::GRAY16BE => 2,
        Pixel::BGRA | Pixel::RGBA | Pixel::BGRZ => 4,
        _ => 3,
    }
}
