/**
 * ASTERIX timestamps come as "time of day": seconds since UTC midnight
 * with a 1/128 s LSB. Records carry no date, so the day is taken from the
 * wall clock of the receiver.
 */
use chrono::{DateTime, Duration, Utc};

/// Midnight UTC of the day containing `now`.
pub fn midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::nanoseconds(
        (now.timestamp_subsec_nanos() as i64)
            + (now.timestamp() % 86_400) * 1_000_000_000,
    )
}

/// Resolve a time-of-day value (seconds since UTC midnight) against the
/// receive time. A report stamped just before midnight but received just
/// after is attributed to the previous day.
pub fn resolve_time_of_day(received: DateTime<Utc>, seconds_since_midnight: f64) -> DateTime<Utc> {
    let midnight = midnight_utc(received);
    let stamped = midnight + Duration::microseconds((seconds_since_midnight * 1e6) as i64);
    // Half a day of forward slack marks a report from yesterday.
    if stamped - received > Duration::hours(12) {
        stamped - Duration::days(1)
    } else {
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn time_of_day_resolves_same_day() {
        let received = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let stamped = resolve_time_of_day(received, 3600.0);
        assert_eq!(stamped, Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap());
    }

    #[test]
    fn midnight_wraparound_goes_to_yesterday() {
        let received = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 5).unwrap();
        let stamped = resolve_time_of_day(received, 86_399.0);
        assert_eq!(
            stamped,
            Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()
        );
    }
}
