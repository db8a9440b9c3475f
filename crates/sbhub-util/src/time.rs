//! Timestamp and duration helpers.

use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::time::Duration;

/// Format used for the sortable suffixes of renamed and archived directories.
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Second-granularity sortable timestamp for the current local time,
/// e.g. `20250114093000`.
pub fn stamp() -> String {
    stamp_at(&Local::now())
}

/// Sortable timestamp for the given instant.
pub fn stamp_at<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format(STAMP_FORMAT).to_string()
}

/// Parse a human duration such as `2h`, `30m` or `1h30m`.
pub fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s.trim())
}

/// Format a remaining TTL, rounded to whole seconds.
pub fn format_remaining(remaining: Duration) -> String {
    humantime::format_duration(Duration::from_secs(remaining.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_stamp_at_is_sortable() {
        let earlier = Utc.with_ymd_and_hms(2025, 1, 9, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(stamp_at(&earlier), "20250109235959");
        assert!(stamp_at(&earlier) < stamp_at(&later));
    }

    #[test]
    fn test_stamp_length() {
        assert_eq!(stamp().len(), 14);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(" 45s ").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_format_remaining_drops_subseconds() {
        assert_eq!(format_remaining(Duration::from_millis(90_500)), "1m 30s");
    }
}
