//! In-memory tables.
//!
//! A [`Table`] owns its columns, rows, auto-increment counter, unique sets
//! and foreign keys. Row identity is the row's position in the sequence:
//! INSERT appends, UPDATE writes in place, DELETE compacts. The catalog
//! wraps every table in an `RwLock`; `Table` itself is plain data, so a
//! `clone()` is a complete snapshot.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use mirage_core::coerce::{self, coerce};
use mirage_core::{Column, DefaultValue, EngineError, Result, Value};

use crate::constraint::ForeignKey;

/// One stored row.
pub type Row = Vec<Value>;

/// The value a column takes when an INSERT or ALTER does not supply one:
/// the declared DEFAULT (coerced), else type-zero for NOT NULL, else NULL.
pub fn default_value(col: &Column) -> Result<Value> {
    match &col.default {
        Some(DefaultValue::Literal(v)) => coerce(v, &col.kind, &col.name),
        Some(DefaultValue::CurrentTimestamp) => Ok(Value::Text(coerce::now_timestamp())),
        None if col.not_null => Ok(col.kind.type_zero()),
        None => Ok(Value::Null),
    }
}

/// An in-memory table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name (lowercased).
    pub name: String,

    /// Ordered column declarations.
    pub columns: Vec<Column>,

    /// Ordered rows; a row's position is its identity.
    pub rows: Vec<Row>,

    /// Monotonic auto-increment counter; the next assigned id is
    /// `counter + 1`.
    pub auto_increment: i64,

    /// Canonical-key sets for UNIQUE/PRIMARY columns, keyed by lowercase
    /// column name.
    pub unique_sets: HashMap<String, HashSet<String>>,

    /// Declared foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Builds a table from validated column declarations.
    ///
    /// Rejects duplicate column names and more than one AUTO_INCREMENT
    /// column; initializes a unique set per UNIQUE/PRIMARY column.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into().to_lowercase();
        let mut seen = HashSet::new();
        let mut auto_count = 0;
        for col in &columns {
            if !seen.insert(col.name.to_lowercase()) {
                return Err(EngineError::schema(format!(
                    "column {} already exists",
                    col.name
                )));
            }
            if col.auto_increment {
                auto_count += 1;
            }
        }
        if auto_count > 1 {
            return Err(EngineError::schema(format!(
                "table {name} has more than one AUTO_INCREMENT column"
            )));
        }

        let unique_sets = columns
            .iter()
            .filter(|c| c.requires_unique())
            .map(|c| (c.name.to_lowercase(), HashSet::new()))
            .collect();

        Ok(Self {
            name,
            columns,
            rows: Vec::new(),
            auto_increment: 0,
            unique_sets,
            foreign_keys: Vec::new(),
        })
    }

    // -- Columns -------------------------------------------------------------

    /// Position of a column by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.is_named(name))
    }

    /// Column declaration by case-insensitive name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_named(name))
    }

    /// Position of the AUTO_INCREMENT column, if any.
    pub fn auto_increment_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.auto_increment)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    // -- Defaults ------------------------------------------------------------

    /// A fresh row with every column at its default.
    pub fn default_row(&self) -> Result<Row> {
        self.columns.iter().map(default_value).collect()
    }

    // -- Auto-increment ------------------------------------------------------

    /// Advances the counter and returns the next id.
    pub fn next_auto_increment(&mut self) -> i64 {
        self.auto_increment += 1;
        self.auto_increment
    }

    /// Raises the counter to `value` when an explicit insert outruns it.
    pub fn observe_auto_increment(&mut self, value: i64) {
        if value > self.auto_increment {
            self.auto_increment = value;
        }
    }

    // -- Unique sets ---------------------------------------------------------

    /// Returns `true` if `value` is already present in the column's unique
    /// set. NULLs never conflict.
    pub fn unique_conflict(&self, column: &str, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }
        self.unique_sets
            .get(&column.to_lowercase())
            .is_some_and(|set| set.contains(&value.canonical_key()))
    }

    /// Records a value in the column's unique set.
    pub fn unique_insert(&mut self, column: &str, value: &Value) {
        if value.is_null() {
            return;
        }
        if let Some(set) = self.unique_sets.get_mut(&column.to_lowercase()) {
            set.insert(value.canonical_key());
        }
    }

    /// Removes a value from the column's unique set.
    pub fn unique_remove(&mut self, column: &str, value: &Value) {
        if value.is_null() {
            return;
        }
        if let Some(set) = self.unique_sets.get_mut(&column.to_lowercase()) {
            set.remove(&value.canonical_key());
        }
    }

    /// Rebuilds every unique set from the current rows. Used after
    /// compaction and ALTER.
    pub fn rebuild_unique_sets(&mut self) {
        let tracked: Vec<(String, usize)> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.requires_unique())
            .map(|(i, c)| (c.name.to_lowercase(), i))
            .collect();
        self.unique_sets = tracked
            .iter()
            .map(|(name, idx)| {
                let set = self
                    .rows
                    .iter()
                    .filter(|row| !row[*idx].is_null())
                    .map(|row| row[*idx].canonical_key())
                    .collect();
                (name.clone(), set)
            })
            .collect();
    }

    // -- Rows ----------------------------------------------------------------

    /// Appends a validated row and returns its position.
    pub fn append_row(&mut self, row: Row) -> usize {
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Removes the rows at the given positions and compacts the sequence.
    /// Positions may arrive in any order.
    pub fn remove_rows(&mut self, positions: &[usize]) {
        let doomed: HashSet<usize> = positions.iter().copied().collect();
        let mut pos = 0;
        self.rows.retain(|_| {
            let keep = !doomed.contains(&pos);
            pos += 1;
            keep
        });
    }

    /// Clears all rows, the counter and the unique sets.
    pub fn truncate(&mut self) {
        self.rows.clear();
        self.auto_increment = 0;
        for set in self.unique_sets.values_mut() {
            set.clear();
        }
    }
}
