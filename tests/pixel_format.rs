//! Encoder pixel-format, bit-rate and time-base negotiation tests.

use frameseek::pixel_format::{bitrate, bytes_per_pixel, input_channels, negotiate, time_base};
use frameseek::{CodecId, FourCc, Pixel, Rational};

const ANY: FourCc = FourCc::new(*b"    ");

fn encoder_format(codec: CodecId, input: Pixel) -> Pixel {
    negotiate(codec, input, ANY).encoder_format
}

// ── Pixel formats ────────────────────────────────────────────────

#[test]
fn lossless_codecs_keep_or_repack_input() {
    assert_eq!(encoder_format(CodecId::JPEGLS, Pixel::BGR24), Pixel::BGR24);
    assert_eq!(encoder_format(CodecId::FFV1, Pixel::GRAY8), Pixel::GRAY8);
    assert_eq!(encoder_format(CodecId::FFV1, Pixel::BGR24), Pixel::BGRZ);
    assert_eq!(encoder_format(CodecId::PNG, Pixel::BGR24), Pixel::RGB24);
    assert_eq!(encoder_format(CodecId::PNG, Pixel::GRAY8), Pixel::GRAY8);
    assert_eq!(encoder_format(CodecId::PNG, Pixel::GRAY16LE), Pixel::GRAY16BE);
    assert_eq!(encoder_format(CodecId::HUFFYUV, Pixel::BGR24), Pixel::RGB24);
    assert_eq!(encoder_format(CodecId::HUFFYUV, Pixel::GRAY8), Pixel::YUV422P);
}

#[test]
fn motion_jpeg_uses_full_range_yuv_and_more_bits() {
    for codec in [CodecId::MJPEG, CodecId::LJPEG] {
        let negotiation = negotiate(codec, Pixel::BGR24, FourCc::new(*b"MJPG"));
        assert_eq!(negotiation.encoder_format, Pixel::YUVJ420P);
        assert_eq!(negotiation.bitrate_scale, 3.0);
    }
}

#[test]
fn rawvideo_follows_the_tag() {
    assert_eq!(
        negotiate(CodecId::RAWVIDEO, Pixel::BGR24, FourCc::new(*b"RGBA")).encoder_format,
        Pixel::RGBA
    );
    assert_eq!(encoder_format(CodecId::RAWVIDEO, Pixel::GRAY8), Pixel::GRAY8);
    assert_eq!(encoder_format(CodecId::RAWVIDEO, Pixel::BGR24), Pixel::YUV420P);
}

#[test]
fn everything_else_is_yuv420() {
    let negotiation = negotiate(CodecId::MPEG4, Pixel::BGR24, FourCc::new(*b"FMP4"));
    assert_eq!(negotiation.encoder_format, Pixel::YUV420P);
    assert_eq!(negotiation.bitrate_scale, 1.0);
    assert!(negotiation.needs_conversion(Pixel::BGR24));
    assert!(!negotiate(CodecId::FFV1, Pixel::GRAY8, ANY).needs_conversion(Pixel::GRAY8));
}

#[test]
fn caller_layouts() {
    assert_eq!(input_channels(Pixel::BGR24), 3);
    assert_eq!(input_channels(Pixel::GRAY8), 1);
    assert_eq!(input_channels(Pixel::BGRA), 4);
    assert_eq!(bytes_per_pixel(Pixel::GRAY16LE), 2);
    assert_eq!(bytes_per_pixel(Pixel::BGR24), 3);
}

// ── Bit rate ─────────────────────────────────────────────────────

#[test]
fn bitrate_scales_with_frame_area() {
    assert_eq!(bitrate(1.0, 25.0, 320, 240), 1_920_000);
    assert_eq!(bitrate(3.0, 25.0, 320, 240), 5_760_000);
}

#[test]
fn bitrate_is_clamped() {
    assert_eq!(bitrate(3.0, 240.0, 7680, 4320), (i32::MAX / 2) as usize);
    assert_eq!(bitrate(1.0, 0.001, 1, 1), 1);
}

// ── Time base ────────────────────────────────────────────────────

fn parts(rational: Rational) -> (i32, i32) {
    (rational.numerator(), rational.denominator())
}

#[test]
fn integral_rates() {
    assert_eq!(parts(time_base(25.0, CodecId::H264, &[])), (1, 25));
    assert_eq!(parts(time_base(30.0, CodecId::MPEG4, &[])), (1, 30));
}

#[test]
fn fractional_rates_use_a_power_of_ten_base() {
    assert_eq!(parts(time_base(29.97, CodecId::H264, &[])), (100, 2997));
    assert_eq!(parts(time_base(23.976, CodecId::H264, &[])), (1000, 23976));
}

#[test]
fn rate_snaps_to_supported_list() {
    let supported = [Rational::new(24, 1), Rational::new(25, 1), Rational::new(30, 1)];
    assert_eq!(parts(time_base(29.97, CodecId::MPEG2VIDEO, &supported)), (1, 30));
    assert_eq!(parts(time_base(24.5, CodecId::MPEG2VIDEO, &supported[..2])), (1, 24));
}

#[test]
fn mpeg4_denominator_is_limited() {
    let fps = 1234.5678;
    let base = time_base(fps, CodecId::MPEG4, &[]);
    assert!(base.denominator() <= 65535, "denominator {}", base.denominator());
    assert!(base.numerator() > 0);
    let value = base.numerator() as f64 / base.denominator() as f64;
    assert!((value - 1.0 / fps).abs() < 1e-6, "time base {value}");

    let unlimited = time_base(fps, CodecId::H264, &[]);
    assert!(unlimited.denominator() > 65535);
}
