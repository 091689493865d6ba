//! Column declarations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::ColumnKind;
use crate::value::Value;

/// Action taken on child rows when a referenced parent row is deleted or
/// updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// Refuse the parent mutation while children reference it.
    Restrict,
    /// Same as RESTRICT for this engine.
    NoAction,
    /// Apply the parent mutation to the children recursively.
    Cascade,
    /// Set the referencing columns to NULL.
    SetNull,
    /// Set the referencing columns to their declared defaults.
    SetDefault,
}

impl ReferentialAction {
    /// Returns the SQL spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Returns `true` when the action forbids deleting a referenced parent.
    pub fn is_restricting(&self) -> bool {
        matches!(self, ReferentialAction::Restrict | ReferentialAction::NoAction)
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared default of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// A literal, coerced to the column kind at insert time.
    Literal(Value),
    /// The CURRENT_TIMESTAMP sentinel, resolved at insert time.
    CurrentTimestamp,
}

/// Inline `REFERENCES` clause on a single column; hoisted into the owning
/// table's foreign-key list when the table is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnReference {
    /// Referenced table name (lowercased).
    pub table: String,
    /// Referenced column name.
    pub column: String,
    /// Action on parent DELETE.
    pub on_delete: ReferentialAction,
    /// Action on parent UPDATE.
    pub on_update: ReferentialAction,
}

/// A column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as declared.
    pub name: String,

    /// Declared kind.
    pub kind: ColumnKind,

    /// NOT NULL flag. Always set for PRIMARY columns.
    pub not_null: bool,

    /// PRIMARY KEY flag.
    pub primary: bool,

    /// UNIQUE flag (PRIMARY columns are unique without it).
    pub unique: bool,

    /// AUTO_INCREMENT flag; requires integer kind and PRIMARY.
    pub auto_increment: bool,

    /// Declared default, if any.
    pub default: Option<DefaultValue>,

    /// ON UPDATE CURRENT_TIMESTAMP trigger.
    pub on_update_current_timestamp: bool,

    /// Inline foreign-key reference, if declared on the column.
    pub references: Option<ColumnReference>,
}

impl Column {
    /// Creates a plain nullable column of the given kind.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            not_null: false,
            primary: false,
            unique: false,
            auto_increment: false,
            default: None,
            on_update_current_timestamp: false,
            references: None,
        }
    }

    /// Returns `true` if values in this column must be pairwise distinct.
    pub fn requires_unique(&self) -> bool {
        self.primary || self.unique
    }

    /// Case-insensitive name match.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Enforces the declaration invariants, normalizing PRIMARY to imply
    /// NOT NULL.
    pub fn validate(&mut self) -> Result<()> {
        if self.primary {
            self.not_null = true;
        }
        if self.auto_increment {
            if !self.kind.is_integer() {
                return Err(EngineError::schema(format!(
                    "AUTO_INCREMENT column {} must be an integer",
                    self.name
                )));
            }
            if !self.primary {
                return Err(EngineError::schema(format!(
                    "AUTO_INCREMENT column {} must be the primary key",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_implies_not_null() {
        let mut col = Column::new("id", ColumnKind::Int);
        col.primary = true;
        col.validate().unwrap();
        assert!(col.not_null);
        assert!(col.requires_unique());
    }

    #[test]
    fn auto_increment_requires_integer_primary() {
        let mut col = Column::new("id", ColumnKind::Text);
        col.auto_increment = true;
        col.primary = true;
        assert!(col.validate().is_err());

        let mut col = Column::new("id", ColumnKind::Int);
        col.auto_increment = true;
        assert!(col.validate().is_err());

        let mut col = Column::new("id", ColumnKind::Int);
        col.auto_increment = true;
        col.primary = true;
        assert!(col.validate().is_ok());
    }

    #[test]
    fn referential_action_spelling() {
        assert_eq!(ReferentialAction::SetNull.to_string(), "SET NULL");
        assert!(ReferentialAction::NoAction.is_restricting());
        assert!(!ReferentialAction::Cascade.is_restricting());
    }
}
