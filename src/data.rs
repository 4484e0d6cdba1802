use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Scalar cell value handed over by an input collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
}

/// A row as produced by the input side, positionally aligned with its columns.
pub type RawRow = Vec<Option<Value>>;

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Timestamp(dt) => format_timestamp(dt),
        }
    }

    /// True for markers that stand for a missing cell rather than data.
    /// Text is always data; missing-cell tokens are resolved by the reader.
    pub fn is_missing_marker(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_nan())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Replaces NaN-like markers with an explicit absent value.
pub fn normalize_missing(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_missing_marker())
}

pub fn is_absent(value: &Option<Value>) -> bool {
    value.as_ref().is_none_or(Value::is_missing_marker)
}

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    if value.time().nanosecond() == 0 {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

pub fn format_date(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Accepts either a full datetime or a bare date (read as midnight).
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    parse_naive_datetime(value)
        .or_else(|_| parse_naive_date(value).map(|date| date.and_time(NaiveTime::MIN)))
}

pub fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_naive_date_supports_multiple_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_naive_date("2024-05-06").unwrap(), expected);
        assert_eq!(parse_naive_date("06/05/2024").unwrap(), expected);
        assert_eq!(parse_naive_date("2024/05/06").unwrap(), expected);
    }

    #[test]
    fn parse_timestamp_reads_dates_as_midnight() {
        let parsed = parse_timestamp("2024-05-06").unwrap();
        assert_eq!(parsed.time(), NaiveTime::MIN);

        let with_time = parse_timestamp("2024-05-06T14:30:00").unwrap();
        assert_eq!(with_time.hour(), 14);
        assert_eq!(with_time.minute(), 30);

        let fractional = parse_timestamp("2024-05-06 00:00:00.250").unwrap();
        assert_eq!(fractional.nanosecond(), 250_000_000);
    }

    #[test]
    fn missing_markers_are_detected() {
        assert!(Value::Float(f64::NAN).is_missing_marker());
        assert!(!Value::Float(0.0).is_missing_marker());
        assert!(!Value::Text("Nat".into()).is_missing_marker());
        assert!(!Value::Text("NAN".into()).is_missing_marker());

        assert_eq!(normalize_missing(Some(Value::Float(f64::NAN))), None);
        assert_eq!(
            normalize_missing(Some(Value::Integer(3))),
            Some(Value::Integer(3))
        );
        assert!(is_absent(&None));
        assert!(!is_absent(&Some(Value::Boolean(false))));
    }

    #[test]
    fn display_trims_whole_floats_and_formats_timestamps() {
        assert_eq!(Value::Float(10.0).as_display(), "10");
        assert_eq!(Value::Float(10.5).as_display(), "10.5");
        let ts = parse_timestamp("2024-01-02 03:04:05").unwrap();
        assert_eq!(Value::Timestamp(ts).as_display(), "2024-01-02 03:04:05");
    }

    #[test]
    fn parse_boolean_accepts_common_tokens() {
        assert_eq!(parse_boolean("TRUE"), Some(true));
        assert_eq!(parse_boolean("no"), Some(false));
        assert_eq!(parse_boolean("1"), None);
    }
}
