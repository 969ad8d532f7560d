//! Timestamp normalization for commit times and submission records.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Normalize an RFC 3339 / ISO-8601 timestamp with offset to `YYYY-MM-DDTHH:MM:SSZ`.
///
/// `git show -s --format=%cI` yields e.g. `2024-03-01T10:15:30+01:00`.
pub fn normalize_commit_time(raw: &str) -> Result<String> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .with_context(|| format!("parse commit timestamp '{}'", raw.trim()))?;
    Ok(parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Epoch seconds with millisecond precision.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Local wall-clock rendering, e.g. `2024-03-01 10:15:30.250000`.
pub fn human_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

/// Date stamp used for log file names (`YYYYMMDD`, local time).
pub fn log_date_stamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normalizes_offset_to_utc() {
        let normalized = normalize_commit_time("2024-03-01T10:15:30+01:00\n").expect("normalize");
        assert_eq!(normalized, "2024-03-01T09:15:30Z");
    }

    #[test]
    fn keeps_utc_input_stable() {
        let normalized = normalize_commit_time("2024-12-31T23:59:59Z").expect("normalize");
        assert_eq!(normalized, "2024-12-31T23:59:59Z");
    }

    #[test]
    fn drops_fractional_seconds() {
        let normalized =
            normalize_commit_time("2024-12-31T23:59:59.987-05:00").expect("normalize");
        assert_eq!(normalized, "2025-01-01T04:59:59Z");
    }

    #[test]
    fn rejects_garbage() {
        let err = normalize_commit_time("yesterday").unwrap_err();
        assert!(err.to_string().contains("parse commit timestamp"));
    }

    #[test]
    fn epoch_seconds_keeps_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_250).unwrap();
        assert_eq!(epoch_seconds(at), 1_700_000_000.25);
    }
}
