//! Expiry windows and timestamp helpers
//!
//! Access tokens issued by the remote service are valid for two hours. Entries
//! are treated as stale one minute before that so a token is never used right
//! at the edge of its lifetime.

use chrono::{DateTime, Duration, Utc};
use serde::{de, Deserialize, Deserializer};

/// Refresh interval for access tokens: 1 hour 59 minutes
pub const REFRESH_INTERVAL_MINUTES: i64 = 119;

/// The default expiry window applied to cached access tokens
pub fn refresh_interval() -> Duration {
    Duration::minutes(REFRESH_INTERVAL_MINUTES)
}

/// Builds an expiry window from a millisecond count
pub fn window_from_millis(millis: i64) -> Duration {
    Duration::milliseconds(millis)
}

/// Returns true when more than `window` has elapsed between `modified_at` and `now`
///
/// An entry modified exactly `window` ago is still fresh. Timestamps in the
/// future (clock skew) count as fresh.
pub fn is_expired(modified_at: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(modified_at) > window
}

/// The instant at which an entry modified at `modified_at` becomes stale
///
/// Returns `None` when that instant is outside the representable date range.
pub fn expires_at(modified_at: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    modified_at.checked_add_signed(window)
}

/// Deserializes a timestamp written either as RFC 3339 text or as Unix epoch milliseconds
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(DateTime<Utc>),
        Millis(i64),
    }

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Text(timestamp) => Ok(timestamp),
        RawTimestamp::Millis(millis) => DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", millis))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Deserialize)]
    struct Stamped {
        #[serde(deserialize_with = "deserialize_timestamp")]
        at: DateTime<Utc>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_refresh_interval_is_119_minutes() {
        assert_eq!(refresh_interval(), window_from_millis(1000 * 119 * 60));
    }

    #[test]
    fn test_fresh_within_window() {
        let window = refresh_interval();
        assert!(!is_expired(t0(), window, t0() + Duration::milliseconds(1000)));
        assert!(!is_expired(t0(), window, t0() + window / 2));
    }

    #[test]
    fn test_boundary_is_not_expired() {
        let window = refresh_interval();
        assert!(!is_expired(t0(), window, t0() + window));
    }

    #[test]
    fn test_expired_one_millisecond_past_window() {
        let window = refresh_interval();
        assert!(is_expired(t0(), window, t0() + window + Duration::milliseconds(1)));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let window = window_from_millis(10);
        assert!(!is_expired(t0() + Duration::hours(1), window, t0()));
    }

    #[test]
    fn test_expires_at_adds_window() {
        let window = Duration::minutes(5);
        assert_eq!(expires_at(t0(), window), Some(t0() + Duration::minutes(5)));
    }

    #[test]
    fn test_expires_at_out_of_range_is_none() {
        assert_eq!(expires_at(t0(), Duration::MAX), None);
        assert_eq!(expires_at(DateTime::<Utc>::MIN_UTC, Duration::minutes(-1)), None);
    }

    #[test]
    fn test_deserialize_timestamp_accepts_rfc3339() {
        let stamped: Stamped =
            serde_json::from_str(r#"{"at": "2024-07-15T12:00:00Z"}"#).expect("Should parse");
        assert_eq!(stamped.at, t0());
    }

    #[test]
    fn test_deserialize_timestamp_accepts_epoch_millis() {
        let millis = t0().timestamp_millis();
        let stamped: Stamped =
            serde_json::from_str(&format!(r#"{{"at": {}}}"#, millis)).expect("Should parse");
        assert_eq!(stamped.at, t0());
    }

    #[test]
    fn test_deserialize_timestamp_rejects_garbage() {
        let result: Result<Stamped, _> = serde_json::from_str(r#"{"at": "yesterday"}"#);
        assert!(result.is_err());
    }
}
