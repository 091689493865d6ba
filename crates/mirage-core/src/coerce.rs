//! Coercion of runtime values to declared column kinds.
//!
//! Every value that enters a table cell goes through [`coerce`] first, so
//! the stored form is always canonical for its column: integers for INT,
//! floats for FLOAT, canonical text for the text-backed kinds.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{EngineError, Result};
use crate::types::ColumnKind;
use crate::value::Value;

/// Date formats accepted on input, tried in order. All canonicalize to
/// `YYYY-MM-DD`.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Timestamp formats accepted on input. All canonicalize to
/// `YYYY-MM-DD HH:MM:SS`.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

/// Coerces `value` to the canonical form for `kind`.
///
/// NULL passes through untouched; NOT NULL enforcement happens in the DML
/// executors, not here. `column` is only used for error messages.
pub fn coerce(value: &Value, kind: &ColumnKind, column: &str) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let mismatch = || EngineError::type_mismatch(column, kind.to_string(), value.describe());

    match kind {
        ColumnKind::Int => value.as_integer().map(Value::Integer).ok_or_else(mismatch),

        ColumnKind::Float => value.as_number().map(Value::Float).ok_or_else(mismatch),

        ColumnKind::Bool => coerce_bool(value).ok_or_else(mismatch),

        ColumnKind::Varchar(max_len) => {
            let text = value.to_string();
            let len = text.chars().count() as u32;
            if len > *max_len {
                return Err(EngineError::type_mismatch(
                    column,
                    kind.to_string(),
                    format!("{} ({len} chars)", value.describe()),
                ));
            }
            Ok(Value::Text(text))
        }

        ColumnKind::Text => Ok(Value::Text(value.to_string())),

        ColumnKind::Decimal(precision, scale) => {
            let n = value.as_number().ok_or_else(mismatch)?;
            let places = *scale as usize;
            let text = format!("{n:.places$}");
            let integer_digits = text
                .split('.')
                .next()
                .unwrap_or("")
                .trim_start_matches('-')
                .len() as u32;
            if integer_digits > precision.saturating_sub(*scale) {
                return Err(EngineError::type_mismatch(
                    column,
                    kind.to_string(),
                    value.describe(),
                ));
            }
            Ok(Value::Text(text))
        }

        ColumnKind::Timestamp => {
            coerce_timestamp(&value.to_string()).map(Value::Text).ok_or_else(mismatch)
        }

        ColumnKind::Date => coerce_date(&value.to_string()).map(Value::Text).ok_or_else(mismatch),

        ColumnKind::Time => coerce_time(&value.to_string()).map(Value::Text).ok_or_else(mismatch),

        ColumnKind::Year => {
            let year = value.as_integer().ok_or_else(mismatch)?;
            if !(0..=9999).contains(&year) {
                return Err(mismatch());
            }
            Ok(Value::Text(format!("{year:04}")))
        }

        ColumnKind::Enum(members) => {
            let text = value.to_string();
            members
                .iter()
                .find(|m| m.eq_ignore_ascii_case(&text))
                .map(|m| Value::Text(m.clone()))
                .ok_or_else(|| {
                    EngineError::type_mismatch(column, kind.to_string(), value.describe())
                })
        }

        ColumnKind::Set(members) => {
            let text = value.to_string();
            for element in text.split(',').filter(|e| !e.is_empty()) {
                if !members.iter().any(|m| m.eq_ignore_ascii_case(element)) {
                    return Err(mismatch());
                }
            }
            Ok(Value::Text(text))
        }
    }
}

fn coerce_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::Integer(i) => Some(Value::Bool(*i != 0)),
        Value::Float(f) => Some(Value::Bool(*f != 0.0)),
        Value::Text(s) => {
            if s.eq_ignore_ascii_case("true") {
                Some(Value::Bool(true))
            } else if s.eq_ignore_ascii_case("false") {
                Some(Value::Bool(false))
            } else {
                s.trim().parse::<f64>().ok().map(|n| Value::Bool(n != 0.0))
            }
        }
        Value::Null => None,
    }
}

/// Parses a date in any accepted format and renders it canonically.
pub fn coerce_date(text: &str) -> Option<String> {
    let text = text.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Parses a timestamp (or bare date, giving midnight) and renders it
/// canonically.
pub fn coerce_timestamp(text: &str) -> Option<String> {
    let text = text.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts.format("%Y-%m-%d %H:%M:%S").to_string());
        }
    }
    coerce_date(text).map(|d| format!("{d} 00:00:00"))
}

/// Parses a time-of-day (`HH:MM:SS` or `HH:MM`) and renders it canonically.
pub fn coerce_time(text: &str) -> Option<String> {
    let text = text.trim();
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(text, format) {
            return Some(t.format("%H:%M:%S").to_string());
        }
    }
    None
}

/// Current wall-clock timestamp in the canonical TIMESTAMP form.
pub fn now_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Current date in the canonical DATE form.
pub fn today_date() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn int_accepts_numeric_and_text_sources() {
        assert_eq!(coerce(&text("42"), &ColumnKind::Int, "c").unwrap(), Value::Integer(42));
        assert_eq!(coerce(&Value::Float(1.6), &ColumnKind::Int, "c").unwrap(), Value::Integer(2));
        assert!(coerce(&text("nope"), &ColumnKind::Int, "c").is_err());
    }

    #[test]
    fn varchar_rejects_overlong_values() {
        let kind = ColumnKind::Varchar(3);
        assert_eq!(coerce(&text("abc"), &kind, "c").unwrap(), Value::Text("abc".into()));
        let err = coerce(&text("abcd"), &kind, "c").unwrap_err();
        assert!(err.is_type(), "expected type error, got {err}");
    }

    #[test]
    fn date_canonicalizes_all_accepted_formats() {
        for input in ["2024-03-05", "2024/03/05", "03/05/2024"] {
            assert_eq!(
                coerce(&text(input), &ColumnKind::Date, "c").unwrap(),
                Value::Text("2024-03-05".into()),
                "input {input}"
            );
        }
        // Day-first only kicks in when month-first cannot parse.
        assert_eq!(
            coerce(&text("25/03/2024"), &ColumnKind::Date, "c").unwrap(),
            Value::Text("2024-03-25".into())
        );
        assert!(coerce(&text("March 5"), &ColumnKind::Date, "c").is_err());
    }

    #[test]
    fn timestamp_accepts_bare_dates() {
        assert_eq!(
            coerce(&text("2024-03-05"), &ColumnKind::Timestamp, "c").unwrap(),
            Value::Text("2024-03-05 00:00:00".into())
        );
        assert_eq!(
            coerce(&text("2024-03-05 10:20:30"), &ColumnKind::Timestamp, "c").unwrap(),
            Value::Text("2024-03-05 10:20:30".into())
        );
    }

    #[test]
    fn decimal_renders_declared_scale() {
        let kind = ColumnKind::Decimal(8, 2);
        assert_eq!(coerce(&text("3.14159"), &kind, "c").unwrap(), Value::Text("3.14".into()));
        assert_eq!(coerce(&Value::Integer(5), &kind, "c").unwrap(), Value::Text("5.00".into()));
        // 7 integer digits do not fit DECIMAL(8,2).
        assert!(coerce(&text("1234567.0"), &kind, "c").is_err());
    }

    #[test]
    fn enum_validates_membership_case_insensitively() {
        let kind = ColumnKind::Enum(vec!["red".into(), "blue".into()]);
        assert_eq!(coerce(&text("RED"), &kind, "c").unwrap(), Value::Text("red".into()));
        assert!(coerce(&text("green"), &kind, "c").is_err());
    }

    #[test]
    fn null_passes_through_every_kind() {
        for kind in [ColumnKind::Int, ColumnKind::Date, ColumnKind::Varchar(1)] {
            assert_eq!(coerce(&Value::Null, &kind, "c").unwrap(), Value::Null);
        }
    }

    #[test]
    fn year_zero_pads() {
        assert_eq!(coerce(&Value::Integer(1999), &ColumnKind::Year, "c").unwrap(), Value::Text("1999".into()));
        assert_eq!(coerce(&text("42"), &ColumnKind::Year, "c").unwrap(), Value::Text("0042".into()));
        assert!(coerce(&Value::Integer(12345), &ColumnKind::Year, "c").is_err());
    }
}
