//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// Format: `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`
///
/// # Examples
///
/// ```
/// use toolkernel::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    to_iso(&now_utc())
}

/// Formats a timestamp the same way as [`iso_timestamp`].
#[must_use]
pub fn to_iso(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_to_iso_fixed() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).single();
        let ts = ts.map(|t| to_iso(&t));
        assert_eq!(ts.as_deref(), Some("2024-01-15T10:30:00.000000+00:00"));
    }

    #[test]
    fn test_iso_timestamp_parses_back() {
        let ts = iso_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
