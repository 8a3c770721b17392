//! Countdown Timer Math
//!
//! Pure functions over an anchor epoch timestamp and a duration.
//! Every caller passes `now` explicitly, so these are safe to use from
//! any component that needs to render or evaluate a countdown, and
//! trivially testable without a clock.

use chrono::Utc;

/// Current wall clock as epoch milliseconds.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Milliseconds elapsed since `started_at`.
#[inline]
pub fn elapsed_ms(started_at: i64, now: i64) -> i64 {
    now - started_at
}

/// Milliseconds remaining on the countdown, clamped at zero.
#[inline]
pub fn remaining_ms(started_at: i64, time_limit_ms: i64, now: i64) -> i64 {
    (time_limit_ms - elapsed_ms(started_at, now)).max(0)
}

/// Whether the countdown has expired.
#[inline]
pub fn is_time_up(started_at: i64, time_limit_ms: i64, now: i64) -> bool {
    remaining_ms(started_at, time_limit_ms, now) <= 0
}

/// Absolute epoch deadline of the countdown.
#[inline]
pub fn deadline_ms(started_at: i64, time_limit_ms: i64) -> i64 {
    started_at + time_limit_ms
}

/// Render seconds as zero-padded `MM:SS`.
pub fn format_seconds(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Render milliseconds as zero-padded `MM:SS`, truncating sub-second time.
pub fn format_millis(milliseconds: i64) -> String {
    format_seconds((milliseconds.max(0) / 1000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_counts_down() {
        let started = 1_000_000;
        assert_eq!(remaining_ms(started, 15_000, started), 15_000);
        assert_eq!(remaining_ms(started, 15_000, started + 5_000), 10_000);
        assert_eq!(remaining_ms(started, 15_000, started + 15_000), 0);
    }

    #[test]
    fn test_remaining_clamps_at_zero() {
        assert_eq!(remaining_ms(1_000, 500, 10_000), 0);
    }

    #[test]
    fn test_is_time_up() {
        let started = 42_000;
        assert!(!is_time_up(started, 10_000, started + 9_999));
        assert!(is_time_up(started, 10_000, started + 10_000));
        assert!(is_time_up(started, 10_000, started + 60_000));
    }

    #[test]
    fn test_deadline() {
        assert_eq!(deadline_ms(1_000, 15_000), 16_000);
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0), "00:00");
        assert_eq!(format_seconds(9), "00:09");
        assert_eq!(format_seconds(75), "01:15");
        assert_eq!(format_seconds(600), "10:00");
    }

    #[test]
    fn test_format_millis_truncates() {
        assert_eq!(format_millis(75_999), "01:15");
        assert_eq!(format_millis(-5), "00:00");
    }

    #[test]
    fn test_pause_resume_round_trip() {
        // Anchor at T0, pause at T0+delta, resume at T0+delta+p.
        // Re-anchoring startedAt := resume_now - delta must leave the
        // remaining time at duration - delta regardless of p.
        let t0 = 1_000_000;
        let duration = 15_000;
        let delta = 5_000;

        for pause_len in [0, 1_000, 60_000, 3_600_000] {
            let resume_now = t0 + delta + pause_len;
            let reanchored = resume_now - delta;
            assert_eq!(remaining_ms(reanchored, duration, resume_now), duration - delta);
        }
    }
}
