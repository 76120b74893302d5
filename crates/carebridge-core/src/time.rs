use crate::error::{CoreError, Result};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current wall-clock time in UTC.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Format a timestamp as RFC 3339.
pub fn format_rfc3339(datetime: OffsetDateTime) -> Result<String> {
    datetime
        .format(&Rfc3339)
        .map_err(|e| CoreError::invalid_timestamp(format!("failed to format timestamp: {e}")))
}

/// Parse an RFC 3339 timestamp.
pub fn parse_rfc3339(s: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| CoreError::invalid_timestamp(format!("failed to parse '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_roundtrip() {
        let now = now_utc();
        let formatted = format_rfc3339(now).unwrap();
        let parsed = parse_rfc3339(&formatted).unwrap();
        assert_eq!(parsed.unix_timestamp(), now.unix_timestamp());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_rfc3339("not a timestamp").is_err());
        assert!(parse_rfc3339("2024-13-45T99:00:00Z").is_err());
    }

    #[test]
    fn test_rfc3339_ordering_is_lexicographic() {
        // NDJSON since-filters compare formatted timestamps as strings.
        let earlier = parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let later = parse_rfc3339("2024-06-01T12:30:00Z").unwrap();
        let a = format_rfc3339(earlier).unwrap();
        let b = format_rfc3339(later).unwrap();
        assert!(a < b);
    }
}
