//! Timestamp arithmetic shared by the capture, seeker and writer.
//!
//! All conversions round the way the seek algorithm expects: a value is
//! shifted by one half and truncated toward zero, so identical inputs always
//! map to identical frame numbers regardless of which path computed them.

use ffmpeg_next::Rational;
use ffmpeg_sys_next::AV_NOPTS_VALUE;

/// Convert a rational to `f64`, treating a zero numerator or denominator as 0.
pub fn rational_to_f64(value: Rational) -> f64 {
    if value.numerator() == 0 || value.denominator() == 0 {
        0.0
    } else {
        value.numerator() as f64 / value.denominator() as f64
    }
}

/// A stream start time with the "unset" sentinel mapped to zero.
pub fn normalize_start_time(start_time: i64) -> i64 {
    if start_time == AV_NOPTS_VALUE { 0 } else { start_time }
}

/// Seconds between `start_time` and `timestamp` in the stream's time base.
pub fn timestamp_to_seconds(timestamp: i64, start_time: i64, time_base: Rational) -> f64 {
    (timestamp - normalize_start_time(start_time)) as f64 * rational_to_f64(time_base)
}

/// Frame number of a timestamp, rounded to the nearest frame.
pub fn timestamp_to_frame_number(
    timestamp: i64,
    start_time: i64,
    time_base: Rational,
    frames_per_second: f64,
) -> i64 {
    let seconds = timestamp_to_seconds(timestamp, start_time, time_base);
    (frames_per_second * seconds + 0.5) as i64
}

/// Stream timestamp at which `frame_number` starts.
pub fn frame_number_to_timestamp(
    frame_number: i64,
    frames_per_second: f64,
    start_time: i64,
    time_base: Rational,
) -> i64 {
    let base = normalize_start_time(start_time);
    let ticks_per_second = rational_to_f64(time_base);
    if frames_per_second <= 0.0 || ticks_per_second <= 0.0 {
        return base;
    }
    let seconds = frame_number as f64 / frames_per_second;
    base + (seconds / ticks_per_second + 0.5) as i64
}

/// Frame number nearest to a position in seconds.
pub fn seconds_to_frame_number(seconds: f64, frames_per_second: f64) -> i64 {
    (seconds * frames_per_second + 0.5) as i64
}

/// Express a frame rate as `frame_rate / frame_rate_base` with a power-of-ten
/// base, accurate to 0.001 frames per second.
///
/// `29.97` becomes `(2997, 100)`, `25.0` becomes `(25, 1)`.
pub fn frame_rate_fraction(frames_per_second: f64) -> (i32, i32) {
    let mut frame_rate = (frames_per_second + 0.5) as i32;
    let mut frame_rate_base = 1i32;
    while ((frame_rate as f64 / frame_rate_base as f64) - frames_per_second).abs() > 0.001 {
        match frame_rate_base.checked_mul(10) {
            Some(base) if (frames_per_second * base as f64) < i32::MAX as f64 => {
                frame_rate_base = base;
                frame_rate = (frames_per_second * frame_rate_base as f64 + 0.5) as i32;
            }
            _ => break,
        }
    }
    (frame_rate, frame_rate_base)
}
