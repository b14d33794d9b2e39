//! Timestamp utilities
//!
//! Timestamps are stored as RFC 3339 text.

use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a stored timestamp
pub fn from_db(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", s, e)))
}

/// Parse an optional stored timestamp
pub fn from_db_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(from_db).transpose()
}

/// Milliseconds from `earlier` to `later`, clamped at zero
pub fn millis_between(earlier: &DateTime<Utc>, later: &DateTime<Utc>) -> u64 {
    (*later - *earlier).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_db_roundtrip_preserves_instant() {
        let ts = now();
        let parsed = from_db(&to_db(&ts)).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_from_db_rejects_garbage() {
        assert!(from_db("yesterday").is_err());
        assert_eq!(from_db_opt(None).unwrap(), None);
    }

    #[test]
    fn test_millis_between_clamps_negative() {
        let t0 = now();
        let t1 = t0 + Duration::milliseconds(1500);
        assert_eq!(millis_between(&t0, &t1), 1500);
        assert_eq!(millis_between(&t1, &t0), 0);
    }
}
