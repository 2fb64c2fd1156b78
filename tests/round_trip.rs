//! Encode-then-decode tests with lossless FFV1.
//!
//! Every frame's index is recoverable bit for bit, so these tests check
//! sequential decoding, seeking and properties exactly. They are skipped when
//! this FFmpeg build cannot encode FFV1.

mod common;

use common::{CLIP_HEIGHT, CLIP_WIDTH, bottom_half_is_dark, decode_index, next_index, write_clip};
use frameseek::{
    CaptureProperty, FourCc, FrameSeekError, Origin, VideoCapture, VideoWriter, WriterOptions,
};

// ── Sequential decoding ──────────────────────────────────────────

#[test]
fn gray_clip_decodes_every_frame_in_order() {
    let Some(clip) = write_clip("gray.avi", b"FFV1", 40, false) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");

    assert!(capture.is_opened());
    assert_eq!(capture.width(), CLIP_WIDTH);
    assert_eq!(capture.height(), CLIP_HEIGHT);
    assert!((capture.fps() - 25.0).abs() < 1e-6, "fps {}", capture.fps());
    assert_eq!(capture.total_frames(), 40);
    assert!((capture.duration_seconds() - 1.6).abs() < 0.05);
    assert_eq!(capture.codec_name(), Some("ffv1"));
    assert_eq!(capture.format_name().as_deref(), Some("avi"));

    for expected in 0..40 {
        let frame = capture.read().expect("Failed to read frame");
        assert_eq!((frame.width, frame.height, frame.channels), (CLIP_WIDTH, CLIP_HEIGHT, 3));
        assert!(frame.step >= CLIP_WIDTH as usize * 3);
        assert_eq!(decode_index(&frame), expected);
        assert!(bottom_half_is_dark(&frame));
        assert_eq!(capture.frame_number(), i64::from(expected) + 1);
    }

    assert!(matches!(capture.grab(), Err(FrameSeekError::EndOfStream)));
}

#[test]
fn color_clip_round_trips_exactly() {
    let Some(clip) = write_clip("color.mkv", b"FFV1", 20, true) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");
    assert!((capture.total_frames() - 20).abs() <= 1, "{}", capture.total_frames());

    let expected = common::pattern_frame(3, CLIP_WIDTH, CLIP_HEIGHT, 3);
    capture.seek(3).expect("seek");
    let frame = capture.read().expect("read");
    assert_eq!(frame.to_packed(), expected);
}

#[test]
fn retrieve_can_be_repeated() {
    let Some(clip) = write_clip("repeat.avi", b"FFV1", 5, false) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");
    capture.grab().expect("grab");
    capture.grab().expect("grab");
    let first = decode_index(&capture.retrieve().expect("retrieve"));
    let second = decode_index(&capture.retrieve().expect("retrieve again"));
    assert_eq!((first, second), (1, 1));
}

// ── Seeking ──────────────────────────────────────────────────────

#[test]
fn seek_by_frame_is_exact() {
    let Some(clip) = write_clip("seek.avi", b"FFV1", 40, false) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");

    for target in [17, 0, 39, 1, 5, 5, 30, 2] {
        capture.seek(target).expect("seek");
        assert_eq!(capture.frame_number(), target);
        assert_eq!(next_index(&mut capture).expect("read"), target as u32);
    }
}

#[test]
fn seek_by_time_and_ratio() {
    let Some(clip) = write_clip("time.avi", b"FFV1", 40, false) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");

    capture.seek_to_time(1.0).expect("seek to 1s");
    assert_eq!(next_index(&mut capture).unwrap(), 25);

    capture.seek_to_ratio(0.5).expect("seek to half");
    assert_eq!(next_index(&mut capture).unwrap(), 20);

    capture.seek_to_time(0.0).expect("seek to start");
    assert_eq!(next_index(&mut capture).unwrap(), 0);
}

#[test]
fn end_of_stream_recovers_after_seek() {
    let Some(clip) = write_clip("eos.avi", b"FFV1", 10, false) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");
    while capture.grab().is_ok() {}
    assert!(matches!(capture.grab(), Err(FrameSeekError::EndOfStream)));
    assert!(matches!(capture.read(), Err(FrameSeekError::EndOfStream)));

    capture.seek(4).expect("seek");
    assert_eq!(next_index(&mut capture).unwrap(), 4);
}

#[test]
fn seek_past_the_end_is_clamped() {
    let Some(clip) = write_clip("clamp.avi", b"FFV1", 10, false) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");
    capture.seek(1_000).expect("seek");
    assert_eq!(capture.frame_number(), 10);
    assert!(matches!(capture.grab(), Err(FrameSeekError::EndOfStream)));
}

// ── Properties ───────────────────────────────────────────────────

#[test]
fn properties_follow_position() {
    let Some(clip) = write_clip("props.avi", b"FFV1", 40, false) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");

    assert_eq!(capture.property(CaptureProperty::FrameWidth), CLIP_WIDTH as f64);
    assert_eq!(capture.property(CaptureProperty::FrameHeight), CLIP_HEIGHT as f64);
    assert_eq!(capture.property(CaptureProperty::FrameCount), 40.0);
    assert_eq!(capture.property(CaptureProperty::Format), 0.0);
    assert_eq!(
        capture.property(CaptureProperty::FourCc),
        FourCc::new(*b"FFV1").value() as f64
    );
    assert_eq!(capture.property(CaptureProperty::OrientationMeta), 0.0);
    assert_eq!(capture.property(CaptureProperty::OrientationAuto), 1.0);

    assert!(capture.set_property(CaptureProperty::PositionFrames, 12.0).unwrap());
    assert_eq!(capture.property(CaptureProperty::PositionFrames), 12.0);
    assert_eq!(next_index(&mut capture).unwrap(), 12);
    assert!((capture.property(CaptureProperty::PositionMsec) - 480.0).abs() < 1e-6);
    let ratio = capture.property(CaptureProperty::PositionRatio);
    assert!((ratio - 0.3).abs() < 0.01, "ratio {ratio}");

    assert!(!capture.set_property(CaptureProperty::FrameCount, 3.0).unwrap());
    assert!(capture.set_property(CaptureProperty::Fps, 50.0).unwrap());
    assert_eq!(capture.fps(), 50.0);
    assert!(matches!(
        capture.set_property(CaptureProperty::Fps, 0.0),
        Err(FrameSeekError::InvalidArgument(_))
    ));
    assert!(matches!(
        capture.set_property(CaptureProperty::PositionFrames, f64::NAN),
        Err(FrameSeekError::InvalidArgument(_))
    ));

    assert!(capture.set_property(CaptureProperty::OrientationAuto, 0.0).unwrap());
    assert_eq!(capture.rotation().map(|rotation| rotation.auto), Some(false));
}

// ── Writer layouts ───────────────────────────────────────────────

fn write_gray(path: &std::path::Path, frames: &[Vec<u8>], step: usize, origin: Origin) -> bool {
    let options = WriterOptions::new().with_color(false);
    let mut writer = match VideoWriter::open_with_options(
        path,
        FourCc::new(*b"FFV1"),
        25.0,
        CLIP_WIDTH,
        CLIP_HEIGHT,
        &options,
    ) {
        Ok(writer) => writer,
        Err(error) => {
            eprintln!("Skipping: cannot encode FFV1: {error}");
            return false;
        }
    };
    for frame in frames {
        writer
            .write(frame, step, CLIP_WIDTH, CLIP_HEIGHT, 1, origin)
            .expect("Failed to write frame");
    }
    writer.close().expect("Failed to close writer");
    true
}

#[test]
fn bottom_up_frames_are_flipped() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join("flipped.avi");
    let row = CLIP_WIDTH as usize;
    let frames: Vec<Vec<u8>> = (0..4)
        .map(|index| {
            let top_down = common::pattern_frame(index, CLIP_WIDTH, CLIP_HEIGHT, 1);
            top_down.chunks(row).rev().flatten().copied().collect()
        })
        .collect();
    if !write_gray(&path, &frames, row, Origin::BottomLeft) {
        return;
    }

    let mut capture = VideoCapture::open(&path).expect("Failed to open clip");
    for expected in 0..4 {
        let frame = capture.read().expect("read");
        assert_eq!(decode_index(&frame), expected);
        assert!(bottom_half_is_dark(&frame));
    }
}

#[test]
fn padded_rows_are_stripped() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join("padded.avi");
    let row = CLIP_WIDTH as usize;
    let step = row + 13;
    let frames: Vec<Vec<u8>> = (0..3)
        .map(|index| {
            let packed = common::pattern_frame(index, CLIP_WIDTH, CLIP_HEIGHT, 1);
            let mut padded = vec![0xAAu8; step * CLIP_HEIGHT as usize];
            for (y, source) in packed.chunks(row).enumerate() {
                padded[y * step..y * step + row].copy_from_slice(source);
            }
            padded
        })
        .collect();
    if !write_gray(&path, &frames, step, Origin::TopLeft) {
        return;
    }

    let mut capture = VideoCapture::open(&path).expect("Failed to open clip");
    for index in 0..3 {
        let frame = capture.read().expect("read");
        let expected: Vec<u8> = common::pattern_frame(index, CLIP_WIDTH, CLIP_HEIGHT, 1)
            .iter()
            .flat_map(|&value| [value; 3])
            .collect();
        assert_eq!(frame.to_packed(), expected);
    }
}
