//! Timestamp helpers
//!
//! Decoders report positions as signed microseconds; the player works in
//! `Duration`. Display uses `M:SS.mmm` below one hour and `H:MM:SS.mmm` above.

use std::time::Duration;

/// Convert a signed microsecond count, `None` when negative
pub fn duration_from_micros(micros: i64) -> Option<Duration> {
    u64::try_from(micros).ok().map(Duration::from_micros)
}

/// Microseconds of `duration`, saturating at `u64::MAX - 1`
///
/// `u64::MAX` is reserved as an "unknown" sentinel by atomic clocks.
pub fn duration_to_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros())
        .unwrap_or(u64::MAX)
        .min(u64::MAX - 1)
}

/// Divide a media-time span by a playback speed factor
pub fn scale_by_speed(span: Duration, speed: f32) -> Duration {
    if speed > 0.0 && speed.is_finite() {
        span.div_f64(speed as f64)
    } else {
        span
    }
}

/// Format a playback position for logs and reports
pub fn format_timestamp(position: Duration) -> String {
    let total_millis = position.as_millis();
    let millis = total_millis % 1000;
    let total_secs = total_millis / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, mins, secs, millis)
    } else {
        format!("{}:{:02}.{:03}", mins, secs, millis)
    }
}
