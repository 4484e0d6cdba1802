//! Relational type inference for ingested columns.
//!
//! Inference trades precision for safety: any value that cannot be confirmed
//! against the column's logical kind degrades the whole column to `TEXT`.
//! Degradations are not errors; they are logged on the
//! [`DEGRADATION_LOG_TARGET`] target and surfaced through [`TypeOrigin`].

use std::{fmt, str::FromStr};

use anyhow::{anyhow, ensure};
use chrono::{NaiveTime, Timelike};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::data::{Value, is_absent};

pub const DEGRADATION_LOG_TARGET: &str = "sheet_ingest::degradation";

/// Coarse category of a column's values before relational typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalKind {
    Text,
    Integer,
    Floating,
    Boolean,
    Timestamp,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Date,
    Timestamp,
    Boolean,
    Varchar(u32),
    Text,
    Numeric,
}

impl SqlType {
    pub fn variants() -> &'static [&'static str] {
        &[
            "SMALLINT",
            "INTEGER",
            "BIGINT",
            "REAL",
            "DOUBLE PRECISION",
            "DATE",
            "TIMESTAMP",
            "BOOLEAN",
            "VARCHAR(n)",
            "TEXT",
            "NUMERIC",
        ]
    }

    /// Narrowest signed integer type covering `[min, max]`.
    pub fn integer_for_range(min: i64, max: i64) -> SqlType {
        let fits = |lo: i64, hi: i64| lo <= min && max <= hi;
        if fits(i16::MIN as i64, i16::MAX as i64) {
            SqlType::SmallInt
        } else if fits(i32::MIN as i64, i32::MAX as i64) {
            SqlType::Integer
        } else {
            SqlType::BigInt
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::SmallInt => f.write_str("SMALLINT"),
            SqlType::Integer => f.write_str("INTEGER"),
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::Real => f.write_str("REAL"),
            SqlType::DoublePrecision => f.write_str("DOUBLE PRECISION"),
            SqlType::Date => f.write_str("DATE"),
            SqlType::Timestamp => f.write_str("TIMESTAMP"),
            SqlType::Boolean => f.write_str("BOOLEAN"),
            SqlType::Varchar(len) => write!(f, "VARCHAR({len})"),
            SqlType::Text => f.write_str("TEXT"),
            SqlType::Numeric => f.write_str("NUMERIC"),
        }
    }
}

impl FromStr for SqlType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SMALLINT" => Ok(SqlType::SmallInt),
            "INTEGER" | "INT" => Ok(SqlType::Integer),
            "BIGINT" => Ok(SqlType::BigInt),
            "REAL" => Ok(SqlType::Real),
            "DOUBLE PRECISION" | "DOUBLE" => Ok(SqlType::DoublePrecision),
            "DATE" => Ok(SqlType::Date),
            "TIMESTAMP" => Ok(SqlType::Timestamp),
            "BOOLEAN" | "BOOL" => Ok(SqlType::Boolean),
            "TEXT" => Ok(SqlType::Text),
            "NUMERIC" => Ok(SqlType::Numeric),
            other if other.starts_with("VARCHAR") => parse_varchar(other),
            _ => Err(anyhow!(
                "Unknown relational type '{value}'. Supported types: {}",
                SqlType::variants().join(", ")
            )),
        }
    }
}

fn parse_varchar(value: &str) -> anyhow::Result<SqlType> {
    let inner = value
        .trim_start_matches("VARCHAR")
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| anyhow!("VARCHAR must specify a length, e.g. VARCHAR(255)"))?;
    let length: u32 = inner
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid VARCHAR length '{}'", inner.trim()))?;
    ensure!(length > 0, "VARCHAR length must be positive");
    Ok(SqlType::Varchar(length))
}

/// Explicit per-column type choice; `Auto` defers to inference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeOverride {
    #[default]
    Auto,
    Fixed(SqlType),
}

impl fmt::Display for TypeOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeOverride::Auto => f.write_str("Auto"),
            TypeOverride::Fixed(ty) => fmt::Display::fmt(ty, f),
        }
    }
}

impl FromStr for TypeOverride {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("auto") {
            Ok(TypeOverride::Auto)
        } else {
            SqlType::from_str(value).map(TypeOverride::Fixed)
        }
    }
}

impl Serialize for TypeOverride {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TypeOverride {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        TypeOverride::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum TypeOrigin {
    Override,
    Inferred,
    /// Values could not be confirmed for the logical kind; widened to TEXT.
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecision {
    pub sql_type: SqlType,
    pub origin: TypeOrigin,
}

impl TypeDecision {
    fn inferred(sql_type: SqlType) -> Self {
        Self {
            sql_type,
            origin: TypeOrigin::Inferred,
        }
    }

    fn degraded(reason: String) -> Self {
        Self {
            sql_type: SqlType::Text,
            origin: TypeOrigin::Degraded { reason },
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.origin, TypeOrigin::Degraded { .. })
    }
}

pub fn infer(kind: LogicalKind, values: &[Option<Value>], type_override: &TypeOverride) -> SqlType {
    decide(kind, values, type_override).sql_type
}

/// Picks the relational type for a column and records where it came from.
pub fn decide(
    kind: LogicalKind,
    values: &[Option<Value>],
    type_override: &TypeOverride,
) -> TypeDecision {
    if let TypeOverride::Fixed(ty) = type_override {
        return TypeDecision {
            sql_type: ty.clone(),
            origin: TypeOrigin::Override,
        };
    }

    let present = values
        .iter()
        .filter(|value| !is_absent(*value))
        .flatten();

    match kind {
        LogicalKind::Text | LogicalKind::Unknown => TypeDecision::inferred(SqlType::Text),
        LogicalKind::Integer => {
            let mut bounds: Option<(i64, i64)> = None;
            for value in present {
                let Some(number) = whole_number(value) else {
                    return TypeDecision::degraded(format!(
                        "value '{value}' is not an integer"
                    ));
                };
                bounds = Some(match bounds {
                    Some((min, max)) => (min.min(number), max.max(number)),
                    None => (number, number),
                });
            }
            let (min, max) = bounds.unwrap_or((0, 0));
            TypeDecision::inferred(SqlType::integer_for_range(min, max))
        }
        LogicalKind::Floating => {
            for value in present {
                if !matches!(value, Value::Integer(_) | Value::Float(_)) {
                    return TypeDecision::degraded(format!("value '{value}' is not numeric"));
                }
            }
            TypeDecision::inferred(SqlType::DoublePrecision)
        }
        LogicalKind::Timestamp => {
            let mut times = Vec::<NaiveTime>::new();
            for value in present {
                let Value::Timestamp(ts) = value else {
                    return TypeDecision::degraded(format!("value '{value}' is not a timestamp"));
                };
                let time = ts.time();
                if !times.contains(&time) {
                    times.push(time);
                }
            }
            let all_midnight = times.len() == 1 && is_midnight(&times[0]);
            if all_midnight {
                TypeDecision::inferred(SqlType::Date)
            } else {
                TypeDecision::inferred(SqlType::Timestamp)
            }
        }
        LogicalKind::Boolean => TypeDecision::inferred(SqlType::Boolean),
    }
}

/// Same as [`decide`], logging a degradation against the column it applies to.
pub fn decide_for_column(
    column: &str,
    kind: LogicalKind,
    values: &[Option<Value>],
    type_override: &TypeOverride,
) -> TypeDecision {
    let decision = decide(kind, values, type_override);
    if let TypeOrigin::Degraded { reason } = &decision.origin {
        warn!(
            target: DEGRADATION_LOG_TARGET,
            "Column '{column}' declared {kind:?} widened to TEXT: {reason}"
        );
    }
    decision
}

fn whole_number(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
            Some(*f as i64)
        }
        _ => None,
    }
}

fn is_midnight(time: &NaiveTime) -> bool {
    time.hour() == 0 && time.minute() == 0 && time.second() == 0 && time.nanosecond() == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_timestamp;

    fn ints(values: &[i64]) -> Vec<Option<Value>> {
        values.iter().map(|v| Some(Value::Integer(*v))).collect()
    }

    fn stamps(values: &[&str]) -> Vec<Option<Value>> {
        values
            .iter()
            .map(|v| Some(Value::Timestamp(parse_timestamp(v).unwrap())))
            .collect()
    }

    #[test]
    fn integer_columns_pick_narrowest_width() {
        let auto = TypeOverride::Auto;
        assert_eq!(infer(LogicalKind::Integer, &ints(&[-100, 32000]), &auto), SqlType::SmallInt);
        assert_eq!(infer(LogicalKind::Integer, &ints(&[-32768, 32767]), &auto), SqlType::SmallInt);
        assert_eq!(infer(LogicalKind::Integer, &ints(&[0, 50000]), &auto), SqlType::Integer);
        assert_eq!(infer(LogicalKind::Integer, &ints(&[-32769, 1]), &auto), SqlType::Integer);
        assert_eq!(
            infer(LogicalKind::Integer, &ints(&[0, 3_000_000_000]), &auto),
            SqlType::BigInt
        );
    }

    #[test]
    fn empty_integer_sample_is_smallint() {
        let values = vec![None, None];
        assert_eq!(infer(LogicalKind::Integer, &values, &TypeOverride::Auto), SqlType::SmallInt);
        assert_eq!(infer(LogicalKind::Integer, &[], &TypeOverride::Auto), SqlType::SmallInt);
    }

    #[test]
    fn integer_column_ignores_absent_and_nan_values() {
        let values = vec![
            Some(Value::Integer(5)),
            None,
            Some(Value::Float(f64::NAN)),
            Some(Value::Float(70000.0)),
        ];
        assert_eq!(infer(LogicalKind::Integer, &values, &TypeOverride::Auto), SqlType::Integer);
    }

    #[test]
    fn unconfirmed_numeric_columns_degrade_to_text() {
        let values = vec![Some(Value::Integer(1)), Some(Value::Text("n/a".into()))];
        let decision = decide(LogicalKind::Integer, &values, &TypeOverride::Auto);
        assert_eq!(decision.sql_type, SqlType::Text);
        assert!(decision.is_degraded());

        let fractional = vec![Some(Value::Float(1.5))];
        assert_eq!(infer(LogicalKind::Integer, &fractional, &TypeOverride::Auto), SqlType::Text);

        let flagged = vec![Some(Value::Float(1.5)), Some(Value::Boolean(true))];
        assert_eq!(infer(LogicalKind::Floating, &flagged, &TypeOverride::Auto), SqlType::Text);
    }

    #[test]
    fn floating_columns_are_double_precision() {
        let values = vec![Some(Value::Float(0.25)), Some(Value::Integer(3)), None];
        let decision = decide(LogicalKind::Floating, &values, &TypeOverride::Auto);
        assert_eq!(decision.sql_type, SqlType::DoublePrecision);
        assert_eq!(decision.origin, TypeOrigin::Inferred);
    }

    #[test]
    fn override_wins_without_validation() {
        let varchar = TypeOverride::from_str("VARCHAR(255)").unwrap();
        for kind in [LogicalKind::Integer, LogicalKind::Text, LogicalKind::Timestamp] {
            let ty = infer(kind, &ints(&[1, 2, 3]), &varchar);
            assert_eq!(ty.to_string(), "VARCHAR(255)");
        }
        let decision = decide(LogicalKind::Text, &[], &TypeOverride::Fixed(SqlType::BigInt));
        assert_eq!(decision.origin, TypeOrigin::Override);
    }

    #[test]
    fn midnight_timestamps_become_dates() {
        let all_midnight = stamps(&["2024-01-01", "2024-02-01 00:00:00"]);
        assert_eq!(infer(LogicalKind::Timestamp, &all_midnight, &TypeOverride::Auto), SqlType::Date);

        let mut mixed = all_midnight.clone();
        mixed.extend(stamps(&["2024-03-01 08:15:00"]));
        assert_eq!(infer(LogicalKind::Timestamp, &mixed, &TypeOverride::Auto), SqlType::Timestamp);

        let subsecond = stamps(&["2024-01-01 00:00:00.001"]);
        assert_eq!(infer(LogicalKind::Timestamp, &subsecond, &TypeOverride::Auto), SqlType::Timestamp);
    }

    #[test]
    fn uniform_non_midnight_time_stays_timestamp() {
        let values = stamps(&["2024-01-01 09:00:00", "2024-01-02 09:00:00"]);
        assert_eq!(infer(LogicalKind::Timestamp, &values, &TypeOverride::Auto), SqlType::Timestamp);
    }

    #[test]
    fn empty_timestamp_sample_stays_timestamp() {
        assert_eq!(infer(LogicalKind::Timestamp, &[None], &TypeOverride::Auto), SqlType::Timestamp);
    }

    #[test]
    fn text_unknown_and_boolean_kinds() {
        let values = ints(&[1]);
        assert_eq!(infer(LogicalKind::Text, &values, &TypeOverride::Auto), SqlType::Text);
        assert_eq!(infer(LogicalKind::Unknown, &values, &TypeOverride::Auto), SqlType::Text);
        assert_eq!(infer(LogicalKind::Boolean, &values, &TypeOverride::Auto), SqlType::Boolean);
    }

    #[test]
    fn sql_type_parsing_accepts_override_vocabulary() {
        for token in SqlType::variants().iter().filter(|t| !t.contains("(n)")) {
            let parsed = SqlType::from_str(token).unwrap();
            assert_eq!(parsed.to_string(), *token);
        }
        assert_eq!(SqlType::from_str("double   precision").unwrap(), SqlType::DoublePrecision);
        assert_eq!(SqlType::from_str("varchar( 64 )").unwrap(), SqlType::Varchar(64));
        assert!(SqlType::from_str("VARCHAR").is_err());
        assert!(SqlType::from_str("VARCHAR(0)").is_err());
        assert!(SqlType::from_str("JSONB").is_err());
        assert_eq!(TypeOverride::from_str("auto").unwrap(), TypeOverride::Auto);
    }
}
