//! Lenient timestamp (de)serialization for backend date fields.
//!
//! The backend emits dates in several shapes depending on the field and the
//! serializer in use:
//!
//! - zoned ISO strings, optionally suffixed with a region id:
//!   `2024-11-02T10:15:30+03:00[Europe/Moscow]`
//! - naive strings (`2024-05-01 12:00:00`, `2024-05-01T12:00:00.123`),
//!   interpreted as UTC
//! - epoch seconds as a number (`1714564800.5`)
//! - component arrays (`[2024, 5, 1, 12, 0, 0, 0]`)
//!
//! Serialization always writes RFC 3339.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_value(&value).ok_or_else(|| de::Error::custom(format!("unrecognized timestamp: {}", value)))
}

/// Parse any supported timestamp shape.
pub fn parse_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_str(s),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }
        Value::Array(parts) => parse_components(parts),
        _ => None,
    }
}

/// Parse a textual timestamp.
pub fn parse_str(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = match raw.find('[') {
        Some(idx) => &raw[..idx],
        None => raw,
    }
    .trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_components(parts: &[Value]) -> Option<DateTime<Utc>> {
    let nums: Vec<i64> = parts.iter().map(Value::as_i64).collect::<Option<_>>()?;
    let get = |i: usize| nums.get(i).copied().unwrap_or(0);
    if nums.len() < 3 {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(get(0) as i32, get(1) as u32, get(2) as u32)?;
    let naive = date.and_hms_nano_opt(get(3) as u32, get(4) as u32, get(5) as u32, get(6) as u32)?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_zoned_with_region_suffix() {
        let dt = parse_str("2024-11-02T10:15:30+03:00[Europe/Moscow]").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-11-02T07:15:30+00:00");
    }

    #[test]
    fn test_parse_utc_z() {
        let dt = parse_str("2024-11-02T10:15:30Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-11-02T10:15:30+00:00");
    }

    #[test]
    fn test_parse_naive_space_separated() {
        let dt = parse_str("2024-05-01 12:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_parse_naive_iso_with_fraction() {
        let dt = parse_str("2024-05-01T12:00:00.250").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_parse_epoch_seconds() {
        let dt = parse_value(&json!(1714564800.5)).unwrap();
        assert_eq!(dt.timestamp(), 1714564800);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_parse_component_array() {
        let dt = parse_value(&json!([2024, 5, 1, 12, 30, 15])).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T12:30:15+00:00");
    }

    #[test]
    fn test_reject_garbage() {
        assert!(parse_str("yesterday").is_none());
        assert!(parse_value(&json!([2024])).is_none());
        assert!(parse_value(&json!(true)).is_none());
    }
}
