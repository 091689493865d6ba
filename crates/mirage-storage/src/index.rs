//! Named secondary indexes.
//!
//! HASH indexes are functional: their payload maps a normalized key to the
//! positions of the rows currently holding that key, and the DML executors
//! keep them in lock-step with every mutation. COMPOSITE and FULLTEXT
//! indexes are parsed-only: they round-trip through CREATE/DROP/SHOW INDEX
//! but are never maintained or consulted.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use mirage_core::{EngineError, Result, Value};

use crate::sync::{read_guard, write_guard};
use crate::table::Table;

/// Index kind, as declared by CREATE INDEX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Single-column hash index; maintained and consulted.
    Hash,
    /// Multi-column index; parsed-only.
    Composite,
    /// Fulltext index; parsed-only.
    Fulltext,
}

impl IndexKind {
    /// Returns the display spelling used by SHOW INDEX.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Hash => "HASH",
            IndexKind::Composite => "COMPOSITE",
            IndexKind::Fulltext => "FULLTEXT",
        }
    }

    /// Functional indexes answer lookups and are maintained on mutation.
    pub fn is_functional(&self) -> bool {
        matches!(self, IndexKind::Hash)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a value into an index key: numerics collapse to their double
/// form, strings lowercase, everything else uses its textual form.
pub fn normalize_key(value: &Value) -> String {
    match value {
        Value::Null => "<null>".to_string(),
        Value::Integer(i) => (*i as f64).to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Text(s) => s.to_lowercase(),
    }
}

/// A named index over one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// Index name (lowercased).
    pub name: String,

    /// Owning table name (lowercased).
    pub table: String,

    /// Target column names.
    pub columns: Vec<String>,

    /// Declared kind.
    pub kind: IndexKind,

    /// Normalized key → positions of rows currently holding that key.
    /// Always empty for parsed-only kinds.
    pub entries: HashMap<String, Vec<usize>>,
}

impl Index {
    /// Row positions whose indexed value normalizes to `value`'s key.
    pub fn lookup(&self, value: &Value) -> Vec<usize> {
        self.entries
            .get(&normalize_key(value))
            .cloned()
            .unwrap_or_default()
    }

    fn add(&mut self, key: String, position: usize) {
        self.entries.entry(key).or_default().push(position);
    }

    fn remove(&mut self, key: &str, position: usize) {
        if let Some(positions) = self.entries.get_mut(key) {
            positions.retain(|p| *p != position);
            if positions.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Recomputes the payload from the table's current rows.
    fn rebuild(&mut self, table: &Table) {
        self.entries.clear();
        if !self.kind.is_functional() {
            return;
        }
        let Some(col) = table.column_index(&self.columns[0]) else {
            return;
        };
        for (pos, row) in table.rows.iter().enumerate() {
            self.add(normalize_key(&row[col]), pos);
        }
    }
}

/// The catalog-wide registry of named indexes.
#[derive(Debug, Default)]
pub struct IndexManager {
    indexes: RwLock<HashMap<String, Arc<RwLock<Index>>>>,
    /// Lookups served by an index instead of a scan; an observability
    /// hook for tests and embedders.
    hits: AtomicU64,
}

impl IndexManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one index-served lookup.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of lookups served by an index since the engine started.
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Creates an index. Functional kinds are built immediately by
    /// scanning the table.
    pub fn create(
        &self,
        name: &str,
        table: &Table,
        columns: Vec<String>,
        kind: IndexKind,
    ) -> Result<()> {
        let key = name.to_lowercase();
        if kind.is_functional() {
            if columns.len() != 1 {
                return Err(EngineError::schema(format!(
                    "hash index {name} must target exactly one column"
                )));
            }
            if table.column_index(&columns[0]).is_none() {
                return Err(EngineError::column_not_found(&columns[0]));
            }
        }

        let mut map = write_guard(&self.indexes)?;
        if map.contains_key(&key) {
            return Err(EngineError::schema(format!("index {name} already exists")));
        }

        let mut index = Index {
            name: key.clone(),
            table: table.name.clone(),
            columns,
            kind,
            entries: HashMap::new(),
        };
        index.rebuild(table);
        tracing::debug!(index = %key, table = %table.name, kind = %kind, "index created");
        map.insert(key, Arc::new(RwLock::new(index)));
        Ok(())
    }

    /// Drops an index by name.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        let mut map = write_guard(&self.indexes)?;
        if map.remove(&name.to_lowercase()).is_none() {
            return Err(EngineError::schema(format!("index {name} does not exist")));
        }
        Ok(())
    }

    /// Returns the index with the given name, if any.
    pub fn get(&self, name: &str) -> Option<Arc<RwLock<Index>>> {
        self.indexes
            .read()
            .ok()
            .and_then(|map| map.get(&name.to_lowercase()).cloned())
    }

    /// All indexes on `table`, sorted by name.
    pub fn for_table(&self, table: &str) -> Result<Vec<Arc<RwLock<Index>>>> {
        let map = read_guard(&self.indexes)?;
        let mut found: Vec<_> = map
            .values()
            .filter(|idx| {
                read_guard(idx)
                    .map(|i| i.table.eq_ignore_ascii_case(table))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        found.sort_by_key(|idx| read_guard(idx).map(|i| i.name.clone()).unwrap_or_default());
        Ok(found)
    }

    /// A functional index on exactly `(table, column)`, if one exists.
    pub fn hash_index_on(&self, table: &str, column: &str) -> Result<Option<Arc<RwLock<Index>>>> {
        let map = read_guard(&self.indexes)?;
        for idx in map.values() {
            let guard = read_guard(idx)?;
            if guard.kind.is_functional()
                && guard.table.eq_ignore_ascii_case(table)
                && guard.columns[0].eq_ignore_ascii_case(column)
            {
                return Ok(Some(idx.clone()));
            }
        }
        Ok(None)
    }

    /// Drops every index owned by `table` (DROP TABLE).
    pub fn drop_for_table(&self, table: &str) -> Result<()> {
        let mut map = write_guard(&self.indexes)?;
        map.retain(|_, idx| {
            read_guard(idx)
                .map(|i| !i.table.eq_ignore_ascii_case(table))
                .unwrap_or(true)
        });
        Ok(())
    }

    /// Drops every index referencing `(table, column)` (ALTER DROP COLUMN).
    pub fn drop_for_column(&self, table: &str, column: &str) -> Result<()> {
        let mut map = write_guard(&self.indexes)?;
        map.retain(|_, idx| {
            read_guard(idx)
                .map(|i| {
                    !(i.table.eq_ignore_ascii_case(table)
                        && i.columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
                })
                .unwrap_or(true)
        });
        Ok(())
    }

    /// Renames a column inside every index referencing it, then rebuilds
    /// (ALTER CHANGE COLUMN).
    pub fn rename_column(&self, table: &Table, old: &str, new: &str) -> Result<()> {
        let map = read_guard(&self.indexes)?;
        for idx in map.values() {
            let mut guard = write_guard(idx)?;
            if !guard.table.eq_ignore_ascii_case(&table.name) {
                continue;
            }
            let mut touched = false;
            for col in &mut guard.columns {
                if col.eq_ignore_ascii_case(old) {
                    *col = new.to_string();
                    touched = true;
                }
            }
            if touched {
                guard.rebuild(table);
            }
        }
        Ok(())
    }

    // -- Maintenance hooks ---------------------------------------------------

    /// Records a freshly appended row in every functional index on the
    /// table.
    pub fn note_insert(&self, table: &Table, position: usize) -> Result<()> {
        self.with_functional(table, |index| {
            let Some(col) = table.column_index(&index.columns[0]) else {
                return;
            };
            index.add(normalize_key(&table.rows[position][col]), position);
        })
    }

    /// Re-keys an in-place row update in every functional index on the
    /// table.
    pub fn note_update(&self, table: &Table, position: usize, old_row: &[Value]) -> Result<()> {
        self.with_functional(table, |index| {
            let Some(col) = table.column_index(&index.columns[0]) else {
                return;
            };
            let old_key = normalize_key(&old_row[col]);
            let new_key = normalize_key(&table.rows[position][col]);
            if old_key != new_key {
                index.remove(&old_key, position);
                index.add(new_key, position);
            }
        })
    }

    /// Rebuilds every functional index on the table. Row positions shift
    /// on DELETE compaction and TRUNCATE, so the payload is recomputed
    /// from scratch.
    pub fn rebuild_for_table(&self, table: &Table) -> Result<()> {
        self.with_functional(table, |index| index.rebuild(table))
    }

    fn with_functional(&self, table: &Table, mut f: impl FnMut(&mut Index)) -> Result<()> {
        let map = read_guard(&self.indexes)?;
        for idx in map.values() {
            let mut guard = write_guard(idx)?;
            if guard.kind.is_functional() && guard.table.eq_ignore_ascii_case(&table.name) {
                f(&mut guard);
            }
        }
        Ok(())
    }

    // -- Snapshots -----------------------------------------------------------

    /// Deep copy of every index, for transaction snapshots.
    pub fn snapshot(&self) -> Result<HashMap<String, Index>> {
        let map = read_guard(&self.indexes)?;
        let mut copy = HashMap::with_capacity(map.len());
        for (name, idx) in map.iter() {
            copy.insert(name.clone(), read_guard(idx)?.clone());
        }
        Ok(copy)
    }

    /// Reinstates a previously captured snapshot.
    pub fn restore(&self, snapshot: HashMap<String, Index>) -> Result<()> {
        let mut map = write_guard(&self.indexes)?;
        *map = snapshot
            .into_iter()
            .map(|(name, idx)| (name, Arc::new(RwLock::new(idx))))
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mirage_core::{Column, ColumnKind};
    use pretty_assertions::assert_eq;

    use super::*;

    fn table_with_rows() -> Table {
        let mut t = Table::new(
            "items",
            vec![
                Column::new("id", ColumnKind::Int),
                Column::new("tag", ColumnKind::Text),
            ],
        )
        .unwrap();
        t.append_row(vec![Value::Integer(1), Value::Text("Alpha".into())]);
        t.append_row(vec![Value::Integer(2), Value::Text("beta".into())]);
        t.append_row(vec![Value::Integer(3), Value::Text("ALPHA".into())]);
        t
    }

    #[test]
    fn keys_normalize_numbers_and_case() {
        assert_eq!(normalize_key(&Value::Integer(1)), normalize_key(&Value::Float(1.0)));
        assert_eq!(normalize_key(&Value::Text("AbC".into())), "abc");
    }

    #[test]
    fn hash_index_builds_and_looks_up() {
        let t = table_with_rows();
        let mgr = IndexManager::new();
        mgr.create("ix_tag", &t, vec!["tag".into()], IndexKind::Hash).unwrap();

        let idx = mgr.get("IX_TAG").expect("index by case-insensitive name");
        let guard = idx.read().unwrap();
        assert_eq!(guard.lookup(&Value::Text("alpha".into())), vec![0, 2]);
        assert_eq!(guard.lookup(&Value::Text("beta".into())), vec![1]);
        assert!(guard.lookup(&Value::Text("gamma".into())).is_empty());
    }

    #[test]
    fn parsed_only_kinds_keep_empty_payloads() {
        let t = table_with_rows();
        let mgr = IndexManager::new();
        mgr.create("ix_multi", &t, vec!["id".into(), "tag".into()], IndexKind::Composite)
            .unwrap();
        let idx = mgr.get("ix_multi").unwrap();
        assert!(idx.read().unwrap().entries.is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let t = table_with_rows();
        let mgr = IndexManager::new();
        mgr.create("ix", &t, vec!["id".into()], IndexKind::Hash).unwrap();
        assert!(mgr.create("IX", &t, vec!["tag".into()], IndexKind::Hash).is_err());
    }

    #[test]
    fn maintenance_tracks_insert_update_and_rebuild() {
        let mut t = table_with_rows();
        let mgr = IndexManager::new();
        mgr.create("ix_id", &t, vec!["id".into()], IndexKind::Hash).unwrap();

        // Insert.
        let pos = t.append_row(vec![Value::Integer(4), Value::Null]);
        mgr.note_insert(&t, pos).unwrap();
        let idx = mgr.get("ix_id").unwrap();
        assert_eq!(idx.read().unwrap().lookup(&Value::Integer(4)), vec![3]);

        // Update in place.
        let old = t.rows[0].clone();
        t.rows[0][0] = Value::Integer(40);
        mgr.note_update(&t, 0, &old).unwrap();
        assert!(idx.read().unwrap().lookup(&Value::Integer(1)).is_empty());
        assert_eq!(idx.read().unwrap().lookup(&Value::Integer(40)), vec![0]);

        // Delete + compaction shifts positions; rebuild recovers.
        t.remove_rows(&[0]);
        mgr.rebuild_for_table(&t).unwrap();
        assert_eq!(idx.read().unwrap().lookup(&Value::Integer(2)), vec![0]);
        assert_eq!(idx.read().unwrap().lookup(&Value::Integer(4)), vec![2]);
    }

    #[test]
    fn lookup_matches_scan_after_any_mutation() {
        let mut t = table_with_rows();
        let mgr = IndexManager::new();
        mgr.create("ix_id", &t, vec!["id".into()], IndexKind::Hash).unwrap();

        t.remove_rows(&[1]);
        mgr.rebuild_for_table(&t).unwrap();

        let idx = mgr.get("ix_id").unwrap();
        for (pos, row) in t.rows.iter().enumerate() {
            let hits = idx.read().unwrap().lookup(&row[0]);
            assert_eq!(hits, vec![pos], "row {pos}");
        }
    }
}
