//! Tolerant timestamp handling for wire payloads.
//!
//! Servers in the wild return dates as ISO-8601 strings, a handful of
//! fixed date-time formats, or numeric Unix timestamps. Parsing tries each
//! encoding in order and takes the first success. Exhaustion is recoverable:
//! the decoder substitutes the current time and logs a warning, since a
//! missing timestamp must not reject an otherwise valid record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use tracing::warn;

/// Offset-carrying formats tried after strict RFC 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.3f%z", "%Y-%m-%dT%H:%M:%S%z"];

/// Naive formats, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse a date-time string, trying each known encoding in order.
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    // Bare calendar date, taken as midnight UTC.
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }

    None
}

/// Convert a (possibly fractional) Unix timestamp in seconds.
pub fn from_unix_timestamp(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1_000_000_000.0).abs() as u32;
    DateTime::from_timestamp(whole, nanos)
}

/// Encode a timestamp the way it goes on the wire: ISO-8601 with a Z suffix.
pub fn to_wire(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn decode_value(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => parse(s),
        serde_json::Value::Number(n) => n.as_f64().and_then(from_unix_timestamp),
        _ => None,
    }
}

/// Decode a JSON value into a timestamp, falling back to the current time.
///
/// The fallback masks data-quality issues, so it is flagged in the logs
/// rather than silently absorbed.
pub fn decode_lossy(value: &serde_json::Value) -> DateTime<Utc> {
    decode_value(value).unwrap_or_else(|| {
        warn!(raw = %value, "unparseable timestamp in payload, substituting current time");
        Utc::now()
    })
}

/// Serde adapter for required timestamp fields.
pub mod flexible {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_wire(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(super::decode_lossy(&value))
    }
}

/// Serde adapter for optional timestamp fields (`None` = absent or null).
pub mod flexible_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => serializer.serialize_str(&super::to_wire(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(None),
            other => Ok(Some(super::decode_lossy(&other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_rfc3339() {
        let dt = parse("2026-03-01T12:30:45Z").unwrap();
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn parses_fractional_with_offset() {
        let dt = parse("2026-03-01T12:30:45.123+0000").unwrap();
        assert_eq!(dt.second(), 45);
    }

    #[test]
    fn parses_naive_datetime_as_utc() {
        let dt = parse("2026-03-01T12:30:45").unwrap();
        assert_eq!(to_wire(&dt), "2026-03-01T12:30:45Z");

        let dt = parse("2026-03-01 12:30:45").unwrap();
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn parses_bare_date_as_midnight() {
        let dt = parse("2026-03-01").unwrap();
        assert_eq!(dt.hour(), 0);
        assert_eq!(to_wire(&dt), "2026-03-01T00:00:00Z");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("not a date").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn numeric_timestamp() {
        let dt = from_unix_timestamp(1_700_000_000.0).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }

    #[test]
    fn lossy_decode_falls_back_to_now() {
        let before = Utc::now();
        let dt = decode_lossy(&serde_json::json!("nonsense"));
        assert!(dt >= before);
    }

    #[test]
    fn lossy_decode_accepts_number() {
        let dt = decode_lossy(&serde_json::json!(1_700_000_000));
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
