//! Formatting helpers for status surfaces.

use chrono::{DateTime, Local, NaiveDateTime, Utc};

const SIZE_UNITS: [&str; 5] = ["B", "kiB", "MiB", "GiB", "TiB"];

/// Renders a byte count with binary prefixes and two decimals.
///
/// # Example
/// ```rust
/// use cean_util::human_size;
///
/// assert_eq!(human_size(0), "0.00 B");
/// assert_eq!(human_size(1024), "1.00 kiB");
/// assert_eq!(human_size(1536), "1.50 kiB");
/// ```
pub fn human_size(size: u64) -> String {
    let mut exponent = 0;
    while exponent + 1 < SIZE_UNITS.len() && size >= 1024u64.pow(exponent as u32 + 1) {
        exponent += 1;
    }
    let scaled = size as f64 / 1024f64.powi(exponent as i32);
    format!("{:.2} {}", scaled, SIZE_UNITS[exponent])
}

/// Parses an ISO 8601 timestamp as sent by the backend.
///
/// Accepts RFC 3339 with an offset; a timestamp without offset is taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Renders a timestamp in the local time zone.
pub fn format_local_datetime(timestamp: &DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sizes_pick_the_largest_fitting_unit() {
        assert_eq!(human_size(1), "1.00 B");
        assert_eq!(human_size(1023), "1023.00 B");
        assert_eq!(human_size(1024), "1.00 kiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(human_size(3 * 1024u64.pow(4)), "3.00 TiB");
        // Beyond TiB the largest unit is kept.
        assert_eq!(human_size(2048 * 1024u64.pow(4)), "2048.00 TiB");
    }

    #[test]
    fn timestamps_with_and_without_offset() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T01:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn local_rendering_round_trips_through_local_zone() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rendered = format_local_datetime(&timestamp);
        let reparsed = NaiveDateTime::parse_from_str(&rendered, "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(reparsed, timestamp.with_timezone(&Local).naive_local());
    }
}
