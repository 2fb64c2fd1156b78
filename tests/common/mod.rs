//! Helpers shared by the integration tests.
//!
//! Test clips are generated on the fly. Every frame carries its own index as
//! eight vertical bars in the top half of the picture (white for a set bit,
//! least significant bit on the left); the bottom half is black so a
//! vertically flipped frame is easy to tell apart.

#![allow(dead_code)]

use std::path::PathBuf;

use frameseek::{FourCc, FrameSeekError, Origin, RetrievedFrame, VideoWriter, WriterOptions};
use tempfile::TempDir;

pub const INDEX_BITS: u32 = 8;
pub const CLIP_WIDTH: u32 = 256;
pub const CLIP_HEIGHT: u32 = 128;
pub const CLIP_FPS: f64 = 25.0;

/// A generated clip inside its own temporary directory.
pub struct Clip {
    pub path: PathBuf,
    pub frames: u32,
    _directory: TempDir,
}

/// Interleaved frame showing `index`, `width * channels` bytes per row.
pub fn pattern_frame(index: u32, width: u32, height: u32, channels: u32) -> Vec<u8> {
    let bar_width = width / INDEX_BITS;
    let row_bytes = (width * channels) as usize;
    let mut frame = vec![0u8; row_bytes * height as usize];
    for y in 0..height / 2 {
        for x in 0..width {
            let bit = (x / bar_width).min(INDEX_BITS - 1);
            if index & (1 << bit) != 0 {
                let start = y as usize * row_bytes + (x * channels) as usize;
                frame[start..start + channels as usize].fill(255);
            }
        }
    }
    frame
}

/// Read the index back from a retrieved BGR24 frame.
pub fn decode_index(frame: &RetrievedFrame<'_>) -> u32 {
    let bar_width = frame.width / INDEX_BITS;
    let row = frame
        .row(frame.height / 4)
        .expect("Retrieved frame is missing rows");
    let mut index = 0;
    for bit in 0..INDEX_BITS {
        let x = (bit * bar_width + bar_width / 2) as usize;
        let pixel = &row[x * 3..x * 3 + 3];
        let brightness = pixel.iter().map(|&value| value as u32).sum::<u32>() / 3;
        if brightness > 128 {
            index |= 1 << bit;
        }
    }
    index
}

/// Whether the bottom half of a retrieved frame is dark.
pub fn bottom_half_is_dark(frame: &RetrievedFrame<'_>) -> bool {
    let row = frame
        .row(frame.height * 3 / 4)
        .expect("Retrieved frame is missing rows");
    row.iter().all(|&value| value < 64)
}

/// Encode `frames` pattern frames with `fourcc` into `file_name` inside a new
/// temporary directory.
///
/// Returns `None` (after logging why) when this FFmpeg build cannot encode
/// the requested codec, so callers can skip.
pub fn write_clip(file_name: &str, fourcc: &[u8; 4], frames: u32, color: bool) -> Option<Clip> {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join(file_name);
    let options = WriterOptions::new().with_color(color);
    let channels = if color { 3 } else { 1 };

    let mut writer = match VideoWriter::open_with_options(
        &path,
        FourCc::new(*fourcc),
        CLIP_FPS,
        CLIP_WIDTH,
        CLIP_HEIGHT,
        &options,
    ) {
        Ok(writer) => writer,
        Err(error) => {
            eprintln!("Skipping: cannot encode {}: {error}", FourCc::new(*fourcc));
            return None;
        }
    };

    let step = (CLIP_WIDTH * channels) as usize;
    for index in 0..frames {
        let frame = pattern_frame(index, CLIP_WIDTH, CLIP_HEIGHT, channels);
        writer
            .write(&frame, step, CLIP_WIDTH, CLIP_HEIGHT, channels, Origin::TopLeft)
            .expect("Failed to write frame");
    }
    writer.close().expect("Failed to close writer");

    Some(Clip {
        path,
        frames,
        _directory: directory,
    })
}

/// Read the next frame and decode its index.
pub fn next_index(capture: &mut frameseek::VideoCapture) -> Result<u32, FrameSeekError> {
    let frame = capture.read()?;
    Ok(decode_index(&frame))
}
