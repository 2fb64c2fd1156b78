//! Error handling integration tests.
//!
//! These tests verify that meaningful errors are returned for various
//! failure conditions, and that a failed or closed session stays inert.

mod common;

use std::time::Duration;

use common::write_clip;
use frameseek::{CaptureOptions, CaptureProperty, FrameSeekError, VideoCapture};

#[test]
fn open_nonexistent_file() {
    let result = VideoCapture::open("this_file_does_not_exist.mp4");
    let error = result.expect_err("opening a missing file should fail");
    assert!(matches!(error, FrameSeekError::FileOpen { .. }), "{error:?}");

    let error_message = error.to_string();
    assert!(
        error_message.contains("Failed to open media source"),
        "Error message should mention the open failure: {error_message}",
    );
    assert!(error_message.contains("this_file_does_not_exist.mp4"));
}

#[test]
fn open_invalid_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let result = VideoCapture::open(&invalid_file_path);
    assert!(result.is_err(), "Expected error for invalid media file");
}

#[test]
fn unknown_decoder_fails_open() {
    let Some(clip) = write_clip("decoder.avi", b"MJPG", 2, true) else {
        return;
    };
    let options = CaptureOptions::new().with_option("video_codec", "no_such_decoder");
    let result = VideoCapture::open_with_options(&clip.path, &options);
    assert!(
        matches!(result, Err(FrameSeekError::DecoderOpen(_))),
        "{result:?}"
    );
}

#[test]
fn unrecognised_options_are_ignored() {
    let Some(clip) = write_clip("options.avi", b"MJPG", 2, true) else {
        return;
    };
    let options = CaptureOptions::new()
        .with_option("not_a_real_option", "1")
        .with_option("avdiscard", "bogus")
        .with_read_timeout(Duration::from_secs(5));
    let mut capture =
        VideoCapture::open_with_options(&clip.path, &options).expect("options should not fail open");
    capture.read().expect("read");
}

#[test]
fn retrieve_before_grab() {
    let Some(clip) = write_clip("nograb.avi", b"MJPG", 2, true) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");
    assert!(matches!(capture.retrieve(), Err(FrameSeekError::NoFrame)));
    assert_eq!(capture.picture_pts(), None);
}

#[test]
fn closed_capture_is_inert() {
    let Some(clip) = write_clip("closed.avi", b"MJPG", 2, true) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");
    capture.close();
    capture.close();

    assert!(!capture.is_opened());
    assert_eq!(capture.source(), clip.path.as_path());
    assert!(matches!(capture.grab(), Err(FrameSeekError::NotOpen)));
    assert!(matches!(capture.retrieve(), Err(FrameSeekError::NotOpen)));
    assert!(matches!(capture.seek(0), Err(FrameSeekError::NotOpen)));
    assert!(matches!(capture.set_raw_mode(), Err(FrameSeekError::NotOpen)));
    assert!(matches!(
        capture.set_property(CaptureProperty::PositionFrames, 0.0),
        Err(FrameSeekError::NotOpen)
    ));

    assert_eq!(capture.width(), 0);
    assert_eq!(capture.total_frames(), 0);
    assert_eq!(capture.fps(), 0.0);
    assert_eq!(capture.property(CaptureProperty::FrameCount), 0.0);
    assert_eq!(capture.property(CaptureProperty::Format), 0.0);
    assert!(capture.rotation().is_none());
    assert!(!capture.is_raw_mode());
}

#[test]
fn error_messages_are_descriptive() {
    let timeout = FrameSeekError::Timeout {
        operation: "read",
        budget_ms: 250,
    };
    assert_eq!(timeout.to_string(), "Timed out during read after 250 ms");

    let retry = FrameSeekError::RetryLimitExceeded { attempts: 513 };
    assert!(retry.to_string().contains("513"));

    let mismatch = FrameSeekError::DimensionMismatch {
        expected_width: 64,
        expected_height: 48,
        actual_width: 65,
        actual_height: 40,
    };
    assert_eq!(mismatch.to_string(), "Frame is 65x40, writer encodes 64x48");
}
