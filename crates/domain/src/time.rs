//! Time and timestamp helpers.

use chrono::{DateTime, NaiveTime, Timelike, Utc};

/// UTC timestamp used for reading times, fire times, outcome times, etc.
pub type Timestamp = DateTime<Utc>;

/// Minutes in a day; time-of-day arithmetic is done modulo this.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Fractional minutes elapsed since midnight for a time of day.
#[must_use]
pub fn minute_of_day(time: NaiveTime) -> f64 {
    f64::from(time.num_seconds_from_midnight()) / 60.0
        + f64::from(time.nanosecond()) / 60_000_000_000.0
}

/// Minutes from `from` forward to `to`, wrapping past midnight.
///
/// The result is always in `[0, 1440)`.
#[must_use]
pub fn minutes_since(from: f64, to: f64) -> f64 {
    (to - from).rem_euclid(f64::from(MINUTES_PER_DAY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_compute_minute_of_day() {
        let t = NaiveTime::from_hms_opt(6, 15, 30).unwrap();
        assert!((minute_of_day(t) - 375.5).abs() < f64::EPSILON);
    }

    #[test]
    fn should_wrap_minutes_since_past_midnight() {
        assert!((minutes_since(23.0 * 60.0, 30.0) - 90.0).abs() < f64::EPSILON);
        assert!((minutes_since(60.0, 120.0) - 60.0).abs() < f64::EPSILON);
        assert!(minutes_since(60.0, 60.0).abs() < f64::EPSILON);
    }
}
