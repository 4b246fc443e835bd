//! Lenient conversions from JSON values into farm field types.
//!
//! The warehouse returns every column as a string in its JSON encodings, and
//! the browser client sends numbers, numeric strings, empty strings or null.
//! These helpers turn any of those into the typed value or `None`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Integer from a JSON number or a numeric string.
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Text from a string, number or boolean.
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Calendar date, truncated to the day.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps (converted to UTC first) and
/// naive `YYYY-MM-DD HH:MM:SS[.fff]` / `YYYY-MM-DDTHH:MM:SS[.fff]` strings.
pub fn date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ts| ts.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_accepts_numbers_and_numeric_strings() {
        assert_eq!(integer(&json!(5)), Some(5));
        assert_eq!(integer(&json!(7.0)), Some(7));
        assert_eq!(integer(&json!(" 12 ")), Some(12));
        assert_eq!(integer(&json!("12abc")), None);
        assert_eq!(integer(&json!("")), None);
        assert_eq!(integer(&json!(null)), None);
        assert_eq!(integer(&json!(1.5)), None);
    }

    #[test]
    fn test_text_stringifies_scalars() {
        assert_eq!(text(&json!("O'Brien")), Some("O'Brien".to_string()));
        assert_eq!(text(&json!(42)), Some("42".to_string()));
        assert_eq!(text(&json!(true)), Some("true".to_string()));
        assert_eq!(text(&json!(null)), None);
        assert_eq!(text(&json!({"a": 1})), None);
    }

    #[test]
    fn test_date_truncates_to_day() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(date(&json!("2024-01-01")), expected);
        assert_eq!(date(&json!("2024-01-01T00:00:00.000Z")), expected);
        assert_eq!(date(&json!("2024-01-01 13:45:10")), expected);
        assert_eq!(date(&json!("2024-01-01T13:45:10.250")), expected);
    }

    #[test]
    fn test_date_rejects_garbage() {
        assert_eq!(date(&json!("not a date")), None);
        assert_eq!(date(&json!("2024-13-40")), None);
        assert_eq!(date(&json!("")), None);
        assert_eq!(date(&json!(20240101)), None);
        assert_eq!(date(&json!(null)), None);
    }
}
