//! Declared column kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The declared type of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Signed 64-bit integer.
    Int,
    /// Variable-length string with a maximum character count.
    Varchar(u32),
    /// Unbounded string.
    Text,
    /// Double-precision float.
    Float,
    /// Boolean.
    Bool,
    /// Fixed-point decimal with precision and scale, stored as canonical text.
    Decimal(u32, u32),
    /// `YYYY-MM-DD HH:MM:SS`, stored as canonical text.
    Timestamp,
    /// `YYYY-MM-DD`, stored as canonical text.
    Date,
    /// `HH:MM:SS`, stored as canonical text.
    Time,
    /// Four-digit year, stored as canonical text.
    Year,
    /// One value out of a declared set.
    Enum(Vec<String>),
    /// Comma-separated subset of a declared set, stored as text.
    Set(Vec<String>),
}

impl ColumnKind {
    /// Returns `true` for the integer kind (required by AUTO_INCREMENT).
    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnKind::Int)
    }

    /// Returns `true` for kinds whose canonical storage form is text.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ColumnKind::Varchar(_)
                | ColumnKind::Text
                | ColumnKind::Decimal(..)
                | ColumnKind::Timestamp
                | ColumnKind::Date
                | ColumnKind::Time
                | ColumnKind::Year
                | ColumnKind::Enum(_)
                | ColumnKind::Set(_)
        )
    }

    /// The "type zero" used when a NOT NULL column without a default must
    /// be filled.
    pub fn type_zero(&self) -> Value {
        match self {
            ColumnKind::Int => Value::Integer(0),
            ColumnKind::Float => Value::Float(0.0),
            ColumnKind::Bool => Value::Bool(false),
            ColumnKind::Varchar(_) | ColumnKind::Text | ColumnKind::Set(_) => {
                Value::Text(String::new())
            }
            ColumnKind::Decimal(_, scale) => {
                if *scale == 0 {
                    Value::Text("0".to_string())
                } else {
                    Value::Text(format!("0.{}", "0".repeat(*scale as usize)))
                }
            }
            ColumnKind::Timestamp => Value::Text("0000-00-00 00:00:00".to_string()),
            ColumnKind::Date => Value::Text("0000-00-00".to_string()),
            ColumnKind::Time => Value::Text("00:00:00".to_string()),
            ColumnKind::Year => Value::Text("0000".to_string()),
            ColumnKind::Enum(values) => {
                Value::Text(values.first().cloned().unwrap_or_default())
            }
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Int => f.write_str("INT"),
            ColumnKind::Varchar(n) => write!(f, "VARCHAR({n})"),
            ColumnKind::Text => f.write_str("TEXT"),
            ColumnKind::Float => f.write_str("FLOAT"),
            ColumnKind::Bool => f.write_str("BOOL"),
            ColumnKind::Decimal(p, s) => write!(f, "DECIMAL({p},{s})"),
            ColumnKind::Timestamp => f.write_str("TIMESTAMP"),
            ColumnKind::Date => f.write_str("DATE"),
            ColumnKind::Time => f.write_str("TIME"),
            ColumnKind::Year => f.write_str("YEAR"),
            ColumnKind::Enum(values) => {
                write!(f, "ENUM({})", quote_list(values))
            }
            ColumnKind::Set(values) => {
                write!(f, "SET({})", quote_list(values))
            }
        }
    }
}

fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(ColumnKind::Varchar(10).to_string(), "VARCHAR(10)");
        assert_eq!(ColumnKind::Decimal(8, 2).to_string(), "DECIMAL(8,2)");
        assert_eq!(
            ColumnKind::Enum(vec!["a".into(), "b".into()]).to_string(),
            "ENUM('a','b')"
        );
    }

    #[test]
    fn type_zero_matches_kind() {
        assert_eq!(ColumnKind::Int.type_zero(), Value::Integer(0));
        assert_eq!(ColumnKind::Decimal(8, 2).type_zero(), Value::Text("0.00".into()));
        assert_eq!(
            ColumnKind::Enum(vec!["red".into(), "blue".into()]).type_zero(),
            Value::Text("red".into())
        );
    }

    #[test]
    fn integer_predicate() {
        assert!(ColumnKind::Int.is_integer());
        assert!(!ColumnKind::Float.is_integer());
    }
}
