//! Raw packet passthrough and Annex B reformatting.
//!
//! In raw mode a capture hands out compressed packets instead of decoded
//! pictures. MP4 and MKV store H.264/HEVC with length-prefixed NAL units,
//! while most consumers of a raw elementary stream expect start codes. The
//! [`RawPacketFilter`] inspects the first packet it sees and, when the stream
//! is length-prefixed, runs every packet through FFmpeg's `*_mp4toannexb`
//! bitstream filter.

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;

use ffmpeg_next::codec::{Id, Parameters};
use ffmpeg_next::packet::Mut;
use ffmpeg_next::{Packet, Rational};
use ffmpeg_sys_next::{AVCodecParameters, AVPacket, AVRational, avcodec_parameters_copy};

use crate::error::FrameSeekError;

// ── Bitstream filter FFI ───────────────────────────────────────────
//
// `ffmpeg-sys-next` v8 does not generate bindings for `libavcodec/bsf.h`.
// Only the subset used below is declared.

#[repr(C)]
struct AVBitStreamFilter {
    _opaque: [u8; 0],
}

/// Layout mirrors `libavcodec/bsf.h`; only the leading public fields are read.
#[allow(dead_code)]
#[repr(C)]
struct AVBSFContext {
    av_class: *const c_void,
    filter: *const AVBitStreamFilter,
    priv_data: *mut c_void,
    par_in: *mut AVCodecParameters,
    par_out: *mut AVCodecParameters,
    time_base_in: AVRational,
    time_base_out: AVRational,
}

unsafe extern "C" {
    fn av_bsf_get_by_name(name: *const c_char) -> *const AVBitStreamFilter;
    fn av_bsf_alloc(filter: *const AVBitStreamFilter, ctx: *mut *mut AVBSFContext) -> c_int;
    fn av_bsf_init(ctx: *mut AVBSFContext) -> c_int;
    fn av_bsf_send_packet(ctx: *mut AVBSFContext, pkt: *mut AVPacket) -> c_int;
    fn av_bsf_receive_packet(ctx: *mut AVBSFContext, pkt: *mut AVPacket) -> c_int;
    fn av_bsf_free(ctx: *mut *mut AVBSFContext);
}

/// Four-byte Annex B start code.
const START_CODE_LONG: [u8; 4] = [0, 0, 0, 1];
/// Three-byte Annex B start code.
const START_CODE_SHORT: [u8; 3] = [0, 0, 1];
/// Shortest packet that can carry a length prefix plus a NAL header.
const MIN_LENGTH_PREFIXED_PACKET: usize = 5;

/// Name of the reformatting filter for `codec`, if it has one.
pub fn filter_name_for(codec: Id) -> Option<&'static str> {
    match codec {
        Id::H264 => Some("h264_mp4toannexb"),
        Id::HEVC => Some("hevc_mp4toannexb"),
        _ => None,
    }
}

/// Whether a packet of a start-code capable codec is length-prefixed.
///
/// Packets shorter than five bytes and packets that already begin with a
/// start code are left alone.
pub fn needs_annexb(data: &[u8]) -> bool {
    data.len() >= MIN_LENGTH_PREFIXED_PACKET
        && !data.starts_with(&START_CODE_LONG)
        && !data.starts_with(&START_CODE_SHORT)
}

/// Owned bitstream filter instance.
struct BitstreamContext {
    ptr: *mut AVBSFContext,
}

// SAFETY: the context is only touched through `&mut self` by the session
// that owns it.
unsafe impl Send for BitstreamContext {}

impl BitstreamContext {
    fn new(
        name: &str,
        parameters: &Parameters,
        time_base: Rational,
    ) -> Result<Self, FrameSeekError> {
        let c_name = CString::new(name)
            .map_err(|_| FrameSeekError::BitstreamFilter(format!("invalid filter name {name}")))?;

        // SAFETY: plain lookup in FFmpeg's static filter list.
        let filter = unsafe { av_bsf_get_by_name(c_name.as_ptr()) };
        if filter.is_null() {
            return Err(FrameSeekError::BitstreamFilter(format!(
                "filter {name} is not available in this FFmpeg build"
            )));
        }

        let mut ptr: *mut AVBSFContext = ptr::null_mut();
        // SAFETY: `filter` is non-null; `ptr` receives a new allocation.
        let ret = unsafe { av_bsf_alloc(filter, &mut ptr) };
        if ret < 0 || ptr.is_null() {
            return Err(FrameSeekError::BitstreamFilter(format!(
                "could not allocate {name}: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }
        // From here on `Drop` frees the allocation on every error path.
        let context = Self { ptr };

        // SAFETY: `par_in` is allocated by `av_bsf_alloc`; the source
        // parameters are alive for the duration of the call.
        let ret = unsafe { avcodec_parameters_copy((*context.ptr).par_in, parameters.as_ptr()) };
        if ret < 0 {
            return Err(FrameSeekError::BitstreamFilter(format!(
                "could not copy stream parameters into {name}: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }
        unsafe {
            (*context.ptr).time_base_in = time_base.into();
        }

        // SAFETY: the context is fully configured.
        let ret = unsafe { av_bsf_init(context.ptr) };
        if ret < 0 {
            return Err(FrameSeekError::BitstreamFilter(format!(
                "could not initialise {name}: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }

        log::debug!("Initialised bitstream filter {name}");
        Ok(context)
    }

    /// Push one packet through the filter, leaving the result in `output`.
    fn filter(&mut self, input: &Packet, output: &mut Packet) -> Result<(), FrameSeekError> {
        // The filter takes ownership of the references it is sent, so send a
        // new reference and keep the caller's packet intact.
        let mut reference = input.clone();
        *output = Packet::empty();

        // SAFETY: both packets are valid; `self.ptr` is an initialised filter.
        let ret = unsafe { av_bsf_send_packet(self.ptr, reference.as_mut_ptr()) };
        if ret < 0 {
            return Err(FrameSeekError::BitstreamFilter(format!(
                "send failed: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }

        let ret = unsafe { av_bsf_receive_packet(self.ptr, output.as_mut_ptr()) };
        if ret < 0 {
            return Err(FrameSeekError::BitstreamFilter(format!(
                "receive failed: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }
        Ok(())
    }
}

impl Drop for BitstreamContext {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `av_bsf_alloc` and is freed exactly once.
        unsafe { av_bsf_free(&mut self.ptr) };
    }
}

enum FilterState {
    /// No packet seen yet.
    Pending,
    /// Packets are returned untouched.
    Passthrough,
    /// Packets are reformatted.
    Active(BitstreamContext),
}

/// Lazily configured packet filter for raw mode.
pub(crate) struct RawPacketFilter {
    codec: Id,
    state: FilterState,
    output: Packet,
    /// Whether `output` holds the filtered form of the current packet.
    ready: bool,
}

impl RawPacketFilter {
    pub(crate) fn new(codec: Id) -> Self {
        Self {
            codec,
            state: FilterState::Pending,
            output: Packet::empty(),
            ready: false,
        }
    }

    /// Forget the filtered copy of the previous packet.
    pub(crate) fn invalidate(&mut self) {
        self.ready = false;
    }

    /// Return the bytes of `packet`, reformatted when the stream needs it.
    ///
    /// The first call decides whether a filter is needed. A failure leaves
    /// the filter in its pending state so a later packet can retry.
    pub(crate) fn process<'a>(
        &'a mut self,
        packet: &'a Packet,
        parameters: &Parameters,
        time_base: Rational,
    ) -> Result<&'a [u8], FrameSeekError> {
        let data = packet.data().unwrap_or(&[]);

        if matches!(self.state, FilterState::Pending) {
            self.state = match filter_name_for(self.codec) {
                Some(name) if needs_annexb(data) => {
                    FilterState::Active(BitstreamContext::new(name, parameters, time_base)?)
                }
                _ => {
                    log::debug!("Raw packets pass through unfiltered");
                    FilterState::Passthrough
                }
            };
        }

        match &mut self.state {
            FilterState::Active(context) => {
                if !self.ready {
                    context.filter(packet, &mut self.output)?;
                    self.ready = true;
                }
                Ok(self.output.data().unwrap_or(&[]))
            }
            _ => Ok(data),
        }
    }
}
