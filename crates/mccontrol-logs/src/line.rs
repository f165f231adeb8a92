//! Timestamped log line parsing.

use chrono::{DateTime, Utc};

/// A log line with its platform timestamp split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Split an RFC 3339 timestamp prefix from `raw`.
///
/// Lines without a parseable prefix are returned whole with no timestamp.
#[must_use]
pub fn parse_log_line(raw: &str) -> ParsedLine {
    let raw = raw.trim_end_matches(['\n', '\r']);
    let (prefix, rest) = raw.split_once(' ').unwrap_or((raw, ""));
    match DateTime::parse_from_rfc3339(prefix) {
        Ok(ts) => ParsedLine {
            content: rest.to_string(),
            timestamp: Some(ts.with_timezone(&Utc)),
        },
        _ => ParsedLine {
            content: raw.to_string(),
            timestamp: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    #[test]
    fn test_strips_nanosecond_timestamp() {
        let parsed = parse_log_line("2024-05-01T12:00:00.123456789Z [Server thread/INFO]: Done (3.2s)!\n");
        assert_eq!(parsed.content, "[Server thread/INFO]: Done (3.2s)!");
        let ts = parsed.timestamp.unwrap();
        assert_eq!(ts.date_naive(), Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap().date_naive());
        assert_eq!(ts.nanosecond(), 123_456_789);
    }

    #[test]
    fn test_offset_is_normalised() {
        let parsed = parse_log_line("2024-05-01T14:00:00+02:00 hello");
        assert_eq!(parsed.timestamp, Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_line_without_timestamp_kept_whole() {
        let parsed = parse_log_line("Starting minecraft server version 1.20.4\r\n");
        assert_eq!(parsed.content, "Starting minecraft server version 1.20.4");
        assert_eq!(parsed.timestamp, None);
    }

    #[test]
    fn test_bare_timestamp_is_empty_line() {
        let parsed = parse_log_line("2024-05-01T12:00:00Z");
        assert_eq!(parsed.content, "");
        assert!(parsed.timestamp.is_some());
        assert_eq!(parse_log_line("").timestamp, None);
    }
}
