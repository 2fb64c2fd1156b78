//! FourCC codec tags and their resolution against container tag tables.
//!
//! Callers name the codec they want with a four-character code. Resolving
//! that code is a three step chain:
//!
//! 1. the output container's own tag table,
//! 2. FFmpeg's generic RIFF and MOV video tables,
//! 3. a small built-in table of widely used tags.
//!
//! When the container's table does not list the requested tag for the
//! resolved codec, the container's canonical tag for that codec is used
//! instead so the muxer accepts the stream.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::os::raw::c_uint;
use std::ptr;
use std::str::FromStr;

use ffmpeg_next::codec::Id;
use ffmpeg_sys_next::{
    AVCodecID, AVCodecTag, AVOutputFormat, av_codec_get_id, av_codec_get_tag,
    avformat_get_mov_video_tags, avformat_get_riff_video_tags,
};

use crate::error::FrameSeekError;

/// A four-character codec tag packed little-endian into a `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    /// Pack four bytes, first byte in the lowest bits.
    pub const fn new(code: [u8; 4]) -> Self {
        FourCc(u32::from_le_bytes(code))
    }

    /// The four bytes of the tag in stream order.
    pub fn bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// The packed tag value.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl Display for FourCc {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for byte in self.bytes() {
            let c = if byte < 32 { '?' } else { byte as char };
            write!(f, "{c}")?;
        }
        write!(f, " (0x{:08x})", self.0)
    }
}

impl FromStr for FourCc {
    type Err = FrameSeekError;

    /// Parse exactly four ASCII characters; shorter codes are space padded.
    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let bytes = code.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 || !code.is_ascii() {
            return Err(FrameSeekError::InvalidArgument(format!(
                "FourCC must be 1 to 4 ASCII characters, got {code:?}"
            )));
        }
        let mut packed = [b' '; 4];
        packed[..bytes.len()].copy_from_slice(bytes);
        Ok(FourCc::new(packed))
    }
}

impl From<[u8; 4]> for FourCc {
    fn from(code: [u8; 4]) -> Self {
        FourCc::new(code)
    }
}

/// Which table produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSource {
    /// The output container's own table.
    Container,
    /// FFmpeg's generic RIFF / MOV tables.
    Generic,
    /// The crate's built-in table.
    Builtin,
}

/// Outcome of resolving a FourCC for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagResolution {
    /// Codec the tag maps to.
    pub codec: Id,
    /// Tag to store in the stream (possibly substituted).
    pub tag: FourCc,
    /// Table the codec came from.
    pub source: TagSource,
    /// `true` when the requested tag was replaced by the container's tag.
    pub substituted: bool,
}

const BUILTIN_TAGS: &[([u8; 4], Id)] = &[
    (*b"H264", Id::H264),
    (*b"h264", Id::H264),
    (*b"X264", Id::H264),
    (*b"x264", Id::H264),
    (*b"avc1", Id::H264),
    (*b"AVC1", Id::H264),
    (*b"DAVC", Id::H264),
    (*b"HEVC", Id::HEVC),
    (*b"hevc", Id::HEVC),
    (*b"H265", Id::HEVC),
    (*b"hvc1", Id::HEVC),
    (*b"hev1", Id::HEVC),
    (*b"FMP4", Id::MPEG4),
    (*b"DIVX", Id::MPEG4),
    (*b"DX50", Id::MPEG4),
    (*b"XVID", Id::MPEG4),
    (*b"MP4V", Id::MPEG4),
    (*b"mp4v", Id::MPEG4),
    (*b"M4S2", Id::MPEG4),
    (*b"DIV3", Id::MSMPEG4V3),
    (*b"MP43", Id::MSMPEG4V3),
    (*b"MP42", Id::MSMPEG4V2),
    (*b"PIM1", Id::MPEG1VIDEO),
    (*b"mpg1", Id::MPEG1VIDEO),
    (*b"MPG2", Id::MPEG2VIDEO),
    (*b"mpg2", Id::MPEG2VIDEO),
    (*b"mp2v", Id::MPEG2VIDEO),
    (*b"MJPG", Id::MJPEG),
    (*b"mjpg", Id::MJPEG),
    (*b"AVRn", Id::MJPEG),
    (*b"LJPG", Id::LJPEG),
    (*b"MJLS", Id::JPEGLS),
    (*b"HFYU", Id::HUFFYUV),
    (*b"FFVH", Id::FFVHUFF),
    (*b"FFV1", Id::FFV1),
    (*b"MPNG", Id::PNG),
    (*b"PNG1", Id::PNG),
    (*b"png ", Id::PNG),
    (*b"I420", Id::RAWVIDEO),
    (*b"IYUV", Id::RAWVIDEO),
    (*b"Y800", Id::RAWVIDEO),
    (*b"RGBA", Id::RAWVIDEO),
    (*b"BGRA", Id::RAWVIDEO),
    (*b"VP80", Id::VP8),
    (*b"VP90", Id::VP9),
    (*b"AV01", Id::AV1),
    (*b"theo", Id::THEORA),
    (*b"dvsd", Id::DVVIDEO),
    (*b"FLV1", Id::FLV1),
    (*b"H263", Id::H263),
];

/// Look a tag up in the built-in fallback table.
pub fn builtin_codec_for(fourcc: FourCc) -> Option<Id> {
    BUILTIN_TAGS
        .iter()
        .find(|(code, _)| FourCc::new(*code) == fourcc)
        .map(|(_, id)| *id)
}

/// Run the resolution chain with caller-supplied table lookups.
///
/// `container` and `generic` map a tag to a codec, `canonical` maps a codec
/// to the container's preferred tag. Separating the chain from FFmpeg's
/// tables keeps it usable with any tag source.
pub fn resolve_with<C, G, K>(
    fourcc: FourCc,
    container: C,
    generic: G,
    canonical: K,
) -> Option<TagResolution>
where
    C: Fn(FourCc) -> Option<Id>,
    G: Fn(FourCc) -> Option<Id>,
    K: Fn(Id) -> Option<FourCc>,
{
    let container_codec = container(fourcc);
    let (codec, source) = match container_codec {
        Some(codec) => (codec, TagSource::Container),
        None => match generic(fourcc) {
            Some(codec) => (codec, TagSource::Generic),
            None => (builtin_codec_for(fourcc)?, TagSource::Builtin),
        },
    };

    let mut resolution = TagResolution {
        codec,
        tag: fourcc,
        source,
        substituted: false,
    };

    if container_codec != Some(codec) {
        if let Some(tag) = canonical(codec).filter(|tag| tag.value() != 0) {
            resolution.tag = tag;
            resolution.substituted = tag != fourcc;
        }
    }

    Some(resolution)
}

/// Resolve `fourcc` against an output format's tag tables.
///
/// `format` must point to a live `AVOutputFormat` (FFmpeg's muxer
/// descriptors are static for the lifetime of the process).
pub(crate) fn resolve_for_format(
    format: *const AVOutputFormat,
    format_name: &str,
    fourcc: FourCc,
) -> Result<TagResolution, FrameSeekError> {
    // SAFETY: muxer descriptors are static; a null table list is handled by
    // the lookup helpers.
    let container_tags = if format.is_null() {
        ptr::null()
    } else {
        unsafe { (*format).codec_tag }
    };

    let generic_tags: [*const AVCodecTag; 3] = unsafe {
        [
            avformat_get_riff_video_tags(),
            avformat_get_mov_video_tags(),
            ptr::null(),
        ]
    };

    let resolution = resolve_with(
        fourcc,
        |tag| lookup_codec(container_tags, tag),
        |tag| lookup_codec(generic_tags.as_ptr(), tag),
        |codec| lookup_tag(container_tags, codec),
    )
    .ok_or_else(|| FrameSeekError::UnknownFourCc {
        fourcc: fourcc.to_string(),
        container: format_name.to_string(),
    })?;

    if resolution.substituted {
        log::warn!(
            "Tag {fourcc} is not supported with codec {:?} and format '{format_name}', falling back to {}",
            resolution.codec,
            resolution.tag,
        );
    }
    log::debug!(
        "Resolved {fourcc} to {:?} via {:?} table",
        resolution.codec,
        resolution.source
    );
    Ok(resolution)
}

fn lookup_codec(tables: *const *const AVCodecTag, fourcc: FourCc) -> Option<Id> {
    if tables.is_null() {
        return None;
    }
    // SAFETY: `tables` is a null-terminated list of FFmpeg's static tables.
    let id = unsafe { av_codec_get_id(tables, fourcc.value() as c_uint) };
    if id == AVCodecID::AV_CODEC_ID_NONE {
        None
    } else {
        Some(Id::from(id))
    }
}

fn lookup_tag(tables: *const *const AVCodecTag, codec: Id) -> Option<FourCc> {
    if tables.is_null() {
        return None;
    }
    // SAFETY: as in `lookup_codec`.
    let tag = unsafe { av_codec_get_tag(tables, AVCodecID::from(codec)) };
    if tag == 0 { None } else { Some(FourCc(tag)) }
}
