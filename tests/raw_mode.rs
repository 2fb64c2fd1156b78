//! Raw packet passthrough tests.

mod common;

use common::write_clip;
use frameseek::{CaptureOptions, CaptureProperty, FrameSeekError, VideoCapture};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

fn starts_with_start_code(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 0, 1]) || data.starts_with(&[0, 0, 1])
}

#[test]
fn mjpeg_packets_pass_through_untouched() {
    let Some(clip) = write_clip("raw.avi", b"MJPG", 12, true) else {
        return;
    };
    let options = CaptureOptions::new().with_raw_mode();
    let mut capture =
        VideoCapture::open_with_options(&clip.path, &options).expect("Failed to open clip");
    assert!(capture.is_raw_mode());
    assert_eq!(capture.property(CaptureProperty::Format), -1.0);
    assert_eq!(capture.property(CaptureProperty::CodecPixelFormat), -1.0);

    assert!(matches!(capture.retrieve(), Err(FrameSeekError::NoFrame)));

    let mut packets = 0;
    while capture.grab().is_ok() {
        let packet = capture.retrieve().expect("retrieve packet");
        assert_eq!(packet.height, 1);
        assert_eq!(packet.channels, 1);
        assert_eq!(packet.width as usize, packet.data.len());
        assert!(packet.data.starts_with(&JPEG_SOI), "packet {packets} is not a JPEG");
        packets += 1;
    }
    assert_eq!(packets, 12);
    assert!(matches!(capture.grab(), Err(FrameSeekError::EndOfStream)));
}

#[test]
fn raw_mode_cannot_be_undone() {
    let Some(clip) = write_clip("irreversible.avi", b"MJPG", 4, true) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");
    assert!(!capture.is_raw_mode());
    assert_eq!(capture.property(CaptureProperty::Format), 0.0);

    assert!(!capture.set_property(CaptureProperty::Format, 0.0).unwrap());
    assert!(!capture.set_property(CaptureProperty::Format, 16.0).unwrap());
    assert!(!capture.is_raw_mode(), "decode format is unchanged");
    assert!(capture.set_property(CaptureProperty::Format, -1.0).unwrap());
    assert!(capture.is_raw_mode());
    assert!(capture.set_property(CaptureProperty::Format, -1.0).unwrap());
    assert!(matches!(
        capture.set_property(CaptureProperty::Format, 0.0),
        Err(FrameSeekError::RawModeIrreversible)
    ));
    assert!(capture.is_raw_mode());
}

#[test]
fn late_raw_mode_still_hands_out_packets() {
    let Some(clip) = write_clip("late.avi", b"MJPG", 6, true) else {
        return;
    };
    let mut capture = VideoCapture::open(&clip.path).expect("Failed to open clip");
    capture.read().expect("decoded read");
    capture.set_raw_mode().expect("enable raw mode");

    capture.grab().expect("grab packet");
    let packet = capture.retrieve().expect("retrieve packet");
    assert!(packet.data.starts_with(&JPEG_SOI));
}

#[test]
fn raw_mode_seeks_by_packet() {
    let Some(clip) = write_clip("rawseek.avi", b"MJPG", 20, true) else {
        return;
    };
    let options = CaptureOptions::new().with_raw_mode();
    let mut capture =
        VideoCapture::open_with_options(&clip.path, &options).expect("Failed to open clip");
    capture.seek(10).expect("seek");
    assert_eq!(capture.frame_number(), 10);
    capture.grab().expect("grab packet");
    assert_eq!(capture.picture_pts(), Some(10));
}

#[test]
fn h264_in_mp4_is_reformatted_to_annex_b() {
    let Some(clip) = write_clip("raw.mp4", b"avc1", 30, true) else {
        return;
    };
    let options = CaptureOptions::new().with_raw_mode();
    let mut capture =
        VideoCapture::open_with_options(&clip.path, &options).expect("Failed to open clip");
    assert_eq!(capture.codec_name(), Some("h264"));

    let mut packets = 0;
    while capture.grab().is_ok() {
        let packet = capture.retrieve().expect("retrieve packet");
        assert!(
            starts_with_start_code(packet.data),
            "packet {packets} starts with {:02x?}",
            &packet.data[..packet.data.len().min(4)]
        );
        packets += 1;
    }
    assert_eq!(packets, 30);
}
