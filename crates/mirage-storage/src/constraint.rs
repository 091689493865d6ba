//! Declared foreign keys.

use serde::{Deserialize, Serialize};

use mirage_core::ReferentialAction;

/// A foreign-key declaration on a table: local columns referencing columns
/// of another table, with the actions to take when the parent side changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing columns on the declaring table.
    pub columns: Vec<String>,

    /// Referenced table name (lowercased).
    pub ref_table: String,

    /// Referenced columns, positionally paired with `columns`.
    pub ref_columns: Vec<String>,

    /// Action on parent DELETE.
    pub on_delete: ReferentialAction,

    /// Action on parent UPDATE.
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    /// Returns `true` if this key references the given table.
    pub fn references(&self, table: &str) -> bool {
        self.ref_table.eq_ignore_ascii_case(table)
    }

    /// Returns `true` if this key involves the given local column.
    pub fn uses_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk() -> ForeignKey {
        ForeignKey {
            columns: vec!["pid".into()],
            ref_table: "parent".into(),
            ref_columns: vec!["id".into()],
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::NoAction,
        }
    }

    #[test]
    fn reference_checks_are_case_insensitive() {
        assert!(fk().references("PARENT"));
        assert!(fk().uses_column("PID"));
        assert!(!fk().uses_column("id"));
    }
}
