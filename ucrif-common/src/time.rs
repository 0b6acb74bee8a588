//! Timestamp utilities
//!
//! Stored records carry RFC 3339 creation/update timestamps, but payloads
//! imported from older clients may hold bare dates or space-separated
//! datetimes. Sorting must tolerate all of them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current timestamp formatted for storage
pub fn now_rfc3339() -> String {
    now().to_rfc3339()
}

/// Parse a stored timestamp leniently. Accepts RFC 3339, a space-separated
/// datetime, or a bare date (taken as midnight UTC). Unparseable input
/// sorts as the epoch rather than failing the whole listing.
pub fn parse_timestamp_lenient(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_utc_datetime(&naive);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
    }
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_now_rfc3339_roundtrips() {
        let s = now_rfc3339();
        let parsed = DateTime::parse_from_rfc3339(&s);
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_timestamp_lenient("2024-05-01T10:30:00+00:00");
        assert_eq!(dt.timestamp(), 1_714_559_400);
    }

    #[test]
    fn test_parse_space_separated_datetime() {
        let dt = parse_timestamp_lenient("2024-05-01 10:30:00");
        assert_eq!(dt.timestamp(), 1_714_559_400);
    }

    #[test]
    fn test_parse_bare_date_is_midnight_utc() {
        let dt = parse_timestamp_lenient("2024-05-01");
        assert_eq!(dt.timestamp(), 1_714_521_600);
    }

    #[test]
    fn test_parse_garbage_falls_back_to_epoch() {
        let dt = parse_timestamp_lenient("not a date");
        assert_eq!(dt.timestamp(), 0);
    }

    #[test]
    fn test_parse_ordering_across_formats() {
        let older = parse_timestamp_lenient("2023-12-31");
        let newer = parse_timestamp_lenient("2024-01-01T08:00:00Z");
        assert!(newer > older);
    }
}
