//! FourCC parsing and tag resolution tests.

use frameseek::codec_tag::builtin_codec_for;
use frameseek::codec_tag::resolve_with;
use frameseek::{CodecId, FourCc, TagSource};

#[test]
fn fourcc_packs_little_endian() {
    let tag = FourCc::new(*b"MJPG");
    assert_eq!(tag.value(), 0x4750_4A4D);
    assert_eq!(tag.bytes(), *b"MJPG");
    assert_eq!(FourCc::from(*b"MJPG"), tag);
}

#[test]
fn fourcc_display_shows_characters_and_value() {
    assert_eq!(FourCc::new(*b"MJPG").to_string(), "MJPG (0x47504a4d)");
    assert_eq!(FourCc(0x21).to_string(), "!??? (0x00000021)");
}

#[test]
fn fourcc_parse() {
    assert_eq!("avc1".parse::<FourCc>().unwrap(), FourCc::new(*b"avc1"));
    assert_eq!("png".parse::<FourCc>().unwrap(), FourCc::new(*b"png "));
    assert!("".parse::<FourCc>().is_err());
    assert!("H2645".parse::<FourCc>().is_err());
    assert!("é".parse::<FourCc>().is_err());
}

#[test]
fn builtin_table_covers_common_tags() {
    assert_eq!(builtin_codec_for(FourCc::new(*b"FMP4")), Some(CodecId::MPEG4));
    assert_eq!(builtin_codec_for(FourCc::new(*b"avc1")), Some(CodecId::H264));
    assert_eq!(builtin_codec_for(FourCc::new(*b"FFV1")), Some(CodecId::FFV1));
    assert_eq!(builtin_codec_for(FourCc::new(*b"MJPG")), Some(CodecId::MJPEG));
    assert_eq!(builtin_codec_for(FourCc::new(*b"ZZZZ")), None);
}

// ── Resolution chain ─────────────────────────────────────────────

#[test]
fn container_table_wins_and_keeps_the_tag() {
    let requested = FourCc::new(*b"DIVX");
    let resolution = resolve_with(
        requested,
        |_| Some(CodecId::MPEG4),
        |_| Some(CodecId::H264),
        |_| Some(FourCc::new(*b"FMP4")),
    )
    .unwrap();
    assert_eq!(resolution.codec, CodecId::MPEG4);
    assert_eq!(resolution.source, TagSource::Container);
    assert_eq!(resolution.tag, requested);
    assert!(!resolution.substituted);
}

#[test]
fn generic_match_takes_the_container_tag() {
    let resolution = resolve_with(
        FourCc::new(*b"H264"),
        |_| None,
        |_| Some(CodecId::H264),
        |codec| (codec == CodecId::H264).then(|| FourCc::new(*b"avc1")),
    )
    .unwrap();
    assert_eq!(resolution.codec, CodecId::H264);
    assert_eq!(resolution.source, TagSource::Generic);
    assert_eq!(resolution.tag, FourCc::new(*b"avc1"));
    assert!(resolution.substituted);
}

#[test]
fn requested_tag_is_kept_without_a_canonical_one() {
    let requested = FourCc::new(*b"XVID");
    let resolution = resolve_with(requested, |_| None, |_| Some(CodecId::MPEG4), |_| None).unwrap();
    assert_eq!(resolution.tag, requested);
    assert!(!resolution.substituted);

    let zero = resolve_with(requested, |_| None, |_| Some(CodecId::MPEG4), |_| Some(FourCc(0)))
        .unwrap();
    assert_eq!(zero.tag, requested);
}

#[test]
fn builtin_table_is_the_last_resort() {
    let resolution = resolve_with(FourCc::new(*b"FFV1"), |_| None, |_| None, |_| None).unwrap();
    assert_eq!(resolution.codec, CodecId::FFV1);
    assert_eq!(resolution.source, TagSource::Builtin);
}

#[test]
fn unknown_tag_does_not_resolve() {
    assert!(resolve_with(FourCc::new(*b"ZZZZ"), |_| None, |_| None, |_| None).is_none());
}
