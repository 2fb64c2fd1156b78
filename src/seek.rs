//! Frame-accurate seeking.
//!
//! Containers can only reposition to sync points, and their indexes are not
//! always exact. [`seek_to_frame`] therefore seeks backward to a window that
//! starts `delta` frames before the target, decodes one frame to learn where
//! it actually landed, and then grabs forward to the frame just before the
//! target. If the landing point is already past the target (or cannot be
//! placed), the window is widened and the attempt repeated.
//!
//! The algorithm only needs the handful of operations in [`FrameSource`],
//! which [`VideoCapture`] implements on its open session.

use ffmpeg_next::Rational;

use crate::{capture::VideoCapture, error::FrameSeekError, utilities};

/// Initial distance, in frames, between the seek window and the target.
pub const INITIAL_SEEK_DELTA: i64 = 16;

/// Upper bound on the window distance before the seek settles for the
/// current position.
pub const MAX_SEEK_DELTA: i64 = (i32::MAX / 4) as i64;

/// A decodable frame sequence the seeker can drive.
pub trait FrameSource {
    /// Declared or estimated number of frames.
    fn total_frames(&self) -> i64;
    /// Frames per second used for frame/timestamp conversion.
    fn fps(&self) -> f64;
    /// Time base of the stream's timestamps.
    fn time_base(&self) -> Rational;
    /// Timestamp of the first frame (may be `AV_NOPTS_VALUE`).
    fn start_time(&self) -> i64;
    /// Frame number of the first decoded frame, once known.
    fn first_frame_number(&self) -> Option<i64>;
    /// Index of the frame the next grab returns.
    fn frame_number(&self) -> i64;
    /// Overwrite the position counter.
    fn set_frame_number(&mut self, frame_number: i64);
    /// Timestamp of the last grabbed frame.
    fn picture_pts(&self) -> Option<i64>;
    /// Decode the next frame.
    fn grab(&mut self) -> Result<(), FrameSeekError>;
    /// Seek backward to the sync point at or before `timestamp` when
    /// `container_seek` is set, and drop all decoder state either way.
    fn reposition(&mut self, timestamp: i64, container_seek: bool);
}

/// Grow the seek window after an overshoot.
pub fn next_delta(delta: i64) -> i64 {
    if delta < INITIAL_SEEK_DELTA {
        delta * 2
    } else {
        delta * 3 / 2
    }
}

/// Position `source` so that its next grab returns frame `target`.
///
/// `target` is clamped to `[0, total_frames]`. The position is best effort:
/// when the window reaches frame zero or the delta bound without landing
/// before the target, the current position is accepted.
///
/// # Errors
///
/// Only [`FrameSeekError::Timeout`] from a grab is propagated; other grab
/// failures end the seek at the position reached.
pub fn seek_to_frame<S: FrameSource + ?Sized>(
    source: &mut S,
    target: i64,
) -> Result<(), FrameSeekError> {
    let total_frames = source.total_frames();
    let target = target.clamp(0, total_frames.max(0));
    log::trace!("Seeking to frame {target} of {total_frames}");

    if source.first_frame_number().is_none() && total_frames > 1 {
        tolerate(source.grab())?;
    }

    let fps = source.fps();
    let start_time = source.start_time();
    let time_base = source.time_base();
    let mut delta = INITIAL_SEEK_DELTA;

    loop {
        let window_start = (target - delta).max(0);
        let timestamp =
            utilities::frame_number_to_timestamp(window_start, fps, start_time, time_base);
        source.reposition(timestamp, total_frames > 1);

        if target == 0 {
            source.set_frame_number(0);
            return Ok(());
        }

        tolerate(source.grab())?;

        if target == 1 {
            source.set_frame_number(1);
            return Ok(());
        }

        let first = source.first_frame_number().unwrap_or(0);
        let landed = match source.picture_pts() {
            Some(pts) => utilities::timestamp_to_frame_number(pts, start_time, time_base, fps) - first,
            None => -1,
        };
        source.set_frame_number(landed);
        log::trace!("Window {window_start} (delta {delta}) landed on frame {landed}");

        if landed < 0 || landed > target - 1 {
            if window_start == 0 || delta >= MAX_SEEK_DELTA {
                log::debug!("Seek to {target} settled on frame {landed}");
                return Ok(());
            }
            delta = next_delta(delta);
            continue;
        }

        while source.frame_number() < target - 1 {
            match source.grab() {
                Ok(()) => {}
                Err(error @ FrameSeekError::Timeout { .. }) => return Err(error),
                Err(error) => {
                    log::trace!("Stopping forward scan at frame {}: {error}", source.frame_number());
                    break;
                }
            }
        }
        source.set_frame_number(source.frame_number() + 1);
        return Ok(());
    }
}

fn tolerate(result: Result<(), FrameSeekError>) -> Result<(), FrameSeekError> {
    match result {
        Err(error @ FrameSeekError::Timeout { .. }) => Err(error),
        Err(error) => {
            log::trace!("Ignoring grab failure during seek: {error}");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

impl VideoCapture {
    /// Position the capture so the next [`grab`](Self::grab) returns frame
    /// `frame_number`.
    ///
    /// # Errors
    ///
    /// [`FrameSeekError::NotOpen`] on a closed capture, or a
    /// [`FrameSeekError::Timeout`] from one of the internal grabs.
    pub fn seek(&mut self, frame_number: i64) -> Result<(), FrameSeekError> {
        let session = self.session_mut()?;
        seek_to_frame(session, frame_number)
    }

    /// Seek to the frame nearest to `seconds`.
    pub fn seek_to_time(&mut self, seconds: f64) -> Result<(), FrameSeekError> {
        let fps = self.session()?.fps();
        self.seek(utilities::seconds_to_frame_number(seconds, fps))
    }

    /// Seek to a fraction of the stream, `0.0` being the first frame and
    /// `1.0` the end.
    pub fn seek_to_ratio(&mut self, ratio: f64) -> Result<(), FrameSeekError> {
        let total_frames = self.session()?.total_frames();
        self.seek((ratio * total_frames as f64 + 0.5) as i64)
    }
}
