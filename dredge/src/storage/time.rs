//! Timestamp helpers for the storage layer.

use chrono::{DateTime, TimeZone, Utc};

/// Convert a `DateTime<Utc>` to Unix epoch milliseconds.
#[inline]
pub fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert Unix epoch milliseconds to `DateTime<Utc>`.
///
/// Values outside chrono's supported range fall back to the epoch.
#[inline]
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(ms) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => DateTime::<Utc>::UNIX_EPOCH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_millis() {
        let dt = ms_to_datetime(1_700_000_000_123);
        assert_eq!(datetime_to_ms(dt), 1_700_000_000_123);
    }

    #[test]
    fn test_out_of_range_falls_back_to_epoch() {
        assert_eq!(ms_to_datetime(i64::MAX), DateTime::<Utc>::UNIX_EPOCH);
    }
}
