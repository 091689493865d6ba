//! The universal runtime value.
//!
//! Every cell in every table, every literal and every expression result is a
//! [`Value`]. DECIMAL, TIMESTAMP, DATE, TIME, YEAR and SET columns carry
//! their canonical textual form as [`Value::Text`].

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically typed SQL value.
///
/// `PartialEq` is the strict structural equality used by tests and result
/// assertions; SQL comparison semantics live in [`Value::compare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Signed 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Text, including the canonical forms of the text-backed kinds.
    Text(String),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one.
    ///
    /// Text parses with a base-10 float parse; NULL has no numeric view.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Integer view of the value, if it has one. Floats round half away
    /// from zero, the way MySQL assigns them to integer columns.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(f.round() as i64),
            Value::Bool(b) => Some(if *b { 1 } else { 0 }),
            Value::Text(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .ok()
                    .or_else(|| t.parse::<f64>().ok().map(|f| f.round() as i64))
            }
        }
    }

    /// SQL truthiness: NULL, zero, the empty string and `"false"` are
    /// false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Bool(b) => *b,
            Value::Text(s) => {
                if s.is_empty() || s.eq_ignore_ascii_case("false") {
                    return false;
                }
                match s.trim().parse::<f64>() {
                    Ok(n) => n != 0.0,
                    Err(_) => true,
                }
            }
        }
    }

    /// Total ordering used by comparison operators, MIN/MAX and UNION
    /// dedup: NULL sorts first and equals only NULL; two values with
    /// numeric views compare numerically; otherwise the textual forms
    /// compare lexicographically.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => {
                if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
                    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
                } else {
                    self.to_string().cmp(&other.to_string())
                }
            }
        }
    }

    /// Equality under [`Value::compare`].
    pub fn same_as(&self, other: &Value) -> bool {
        self.compare(other) == Ordering::Equal
    }

    /// Canonical key for unique sets and GROUP BY buckets.
    ///
    /// Values with a numeric view collapse to one key per number, so an
    /// integer `1` and a float `1.0` land in the same bucket, matching
    /// [`Value::compare`].
    pub fn canonical_key(&self) -> String {
        match self {
            Value::Null => "<null>".to_string(),
            other => match other.as_number() {
                Some(n) => format!("n:{n}"),
                None => format!("s:{other}"),
            },
        }
    }

    /// Short description of the value used in type-error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Text(s) => format!("'{s}'"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn null_sorts_first_and_equals_only_null() {
        assert_eq!(Value::Null.compare(&Value::Null), Ordering::Equal);
        assert_eq!(Value::Null.compare(&Value::Integer(-5)), Ordering::Less);
        assert_eq!(Value::Text("".into()).compare(&Value::Null), Ordering::Greater);
    }

    #[test]
    fn numeric_comparison_crosses_variants() {
        assert_eq!(Value::Integer(2).compare(&Value::Float(2.0)), Ordering::Equal);
        assert_eq!(Value::Text("10".into()).compare(&Value::Integer(9)), Ordering::Greater);
        assert_eq!(Value::Bool(true).compare(&Value::Integer(1)), Ordering::Equal);
    }

    #[test]
    fn non_numeric_comparison_is_lexicographic() {
        assert_eq!(Value::Text("apple".into()).compare(&Value::Text("banana".into())), Ordering::Less);
        // "2x" has no numeric view, so "10" vs "2x" falls back to text.
        assert_eq!(Value::Text("10".into()).compare(&Value::Text("2x".into())), Ordering::Less);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Text("".into()).is_truthy());
        assert!(!Value::Text("false".into()).is_truthy());
        assert!(!Value::Text("0".into()).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(Value::Text("yes".into()).is_truthy());
    }

    #[test]
    fn canonical_keys_collapse_numeric_forms() {
        assert_eq!(Value::Integer(1).canonical_key(), Value::Float(1.0).canonical_key());
        assert_ne!(Value::Text("a".into()).canonical_key(), Value::Text("A".into()).canonical_key());
        assert_eq!(Value::Null.canonical_key(), "<null>");
    }

    #[test]
    fn integer_view_rounds_floats() {
        assert_eq!(Value::Float(1.5).as_integer(), Some(2));
        assert_eq!(Value::Text(" 7 ".into()).as_integer(), Some(7));
        assert_eq!(Value::Text("7.6".into()).as_integer(), Some(8));
        assert_eq!(Value::Text("x".into()).as_integer(), None);
    }
}
