//! Result value normalization
//!
//! Drivers hand back rich types; callers get flat records. Every engine maps its
//! driver values through these helpers so that all families agree on formats:
//!
//! | Driver value          | Normalized                       |
//! |-----------------------|----------------------------------|
//! | timestamp             | `"YYYY-MM-DD HH:MM:SS"` (UTC)    |
//! | date                  | `"YYYY-MM-DD"`                   |
//! | time                  | `"HH:MM:SS"`                     |
//! | UUID                  | lowercase hyphenated string      |
//! | binary                | UTF-8 text, else Base64          |
//! | decimal               | exact decimal text               |
//! | nested object / array | compact JSON text                |
//! | NULL, NaN, infinity   | `""` (after [`fill_nulls`])      |
//!
//! Mapping NULL to `""` is lossy: a NULL and an empty string are
//! indistinguishable afterwards.

use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::engine::Record;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[must_use]
pub fn datetime(value: &NaiveDateTime) -> Value {
    Value::String(value.format(DATETIME_FORMAT).to_string())
}

/// Timezone-aware timestamps render in UTC
#[must_use]
pub fn utc_datetime(value: &DateTime<Utc>) -> Value {
    datetime(&value.naive_utc())
}

#[must_use]
pub fn date(value: &NaiveDate) -> Value {
    Value::String(value.format(DATE_FORMAT).to_string())
}

#[must_use]
pub fn time(value: &NaiveTime) -> Value {
    Value::String(value.format(TIME_FORMAT).to_string())
}

#[must_use]
pub fn uuid(value: &Uuid) -> Value {
    Value::String(value.hyphenated().to_string())
}

/// Finite floats stay numeric; NaN and infinities become null
#[must_use]
pub fn float(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// UTF-8 text when it decodes, Base64 otherwise
#[must_use]
pub fn bytes(value: &[u8]) -> Value {
    match std::str::from_utf8(value) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::String(base64::engine::general_purpose::STANDARD.encode(value)),
    }
}

/// Nested structures flatten to their compact JSON text
#[must_use]
pub fn nested(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        scalar => scalar,
    }
}

/// Replace every null with the empty string
pub fn fill_nulls(records: &mut [Record]) {
    for record in records {
        for value in record.values_mut() {
            if value.is_null() {
                *value = Value::String(String::new());
            }
        }
    }
}

/// True when every value is a string, number or boolean
#[must_use]
pub fn is_flat(record: &Record) -> bool {
    record
        .values()
        .all(|v| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_temporal_formats() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_micro_opt(7, 5, 1, 250_000).unwrap();
        assert_eq!(datetime(&dt), json!("2024-03-09 07:05:01"));
        assert_eq!(date(&dt.date()), json!("2024-03-09"));
        assert_eq!(time(&dt.time()), json!("07:05:01"));
    }

    #[test]
    fn test_aware_timestamps_render_in_utc() {
        let aware = DateTime::parse_from_rfc3339("2024-01-01T01:30:00+02:00").unwrap();
        assert_eq!(utc_datetime(&aware.with_timezone(&Utc)), json!("2023-12-31 23:30:00"));
    }

    #[test]
    fn test_uuid_is_lowercase_hyphenated() {
        let id = Uuid::parse_str("A1A2A3A4-B1B2-C1C2-D1D2-D3D4D5D6D7D8").unwrap();
        assert_eq!(uuid(&id), json!("a1a2a3a4-b1b2-c1c2-d1d2-d3d4d5d6d7d8"));
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        assert_eq!(float(1.5), json!(1.5));
        assert_eq!(float(f64::NAN), Value::Null);
        assert_eq!(float(f64::INFINITY), Value::Null);
    }

    #[test]
    fn test_bytes() {
        assert_eq!(bytes(b"plain"), json!("plain"));
        assert_eq!(bytes(&[0xff, 0x00, 0x10]), json!("/wAQ"));
    }

    #[test]
    fn test_nested_flattens_to_json_text() {
        assert_eq!(nested(json!({"a": [1, 2]})), json!(r#"{"a":[1,2]}"#));
        assert_eq!(nested(json!(3)), json!(3));
    }

    #[test]
    fn test_fill_nulls() {
        let mut records = vec![json!({"a": null, "b": 0, "c": "x"}).as_object().unwrap().clone()];
        fill_nulls(&mut records);
        assert_eq!(Value::Object(records[0].clone()), json!({"a": "", "b": 0, "c": "x"}));
        assert!(is_flat(&records[0]));
    }
}
