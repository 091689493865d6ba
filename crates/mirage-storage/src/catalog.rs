//! The catalog: a case-insensitive table directory plus the index manager.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use mirage_core::{EngineError, Result};

use crate::index::{Index, IndexManager};
use crate::sync::{read_guard, write_guard};
use crate::table::Table;

/// The name→table directory. Table names are stored lowercased; every
/// table sits behind its own `RwLock` so readers of different tables (and
/// parallel readers of the same table) do not serialize.
#[derive(Debug, Default)]
pub struct Database {
    tables: RwLock<HashMap<String, Arc<RwLock<Table>>>>,
    indexes: IndexManager,
}

/// A deep copy of the whole catalog, sufficient to restore it
/// bit-identically. Born at BEGIN/SAVEPOINT, consumed by ROLLBACK.
#[derive(Debug, Clone)]
pub struct Snapshot {
    tables: HashMap<String, Table>,
    indexes: HashMap<String, Index>,
}

impl Database {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared index manager.
    pub fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    // -- Table directory -----------------------------------------------------

    /// Registers a new table. Fails if the (case-insensitive) name is
    /// taken.
    pub fn create_table(&self, table: Table) -> Result<()> {
        let mut map = write_guard(&self.tables)?;
        let key = table.name.clone();
        if map.contains_key(&key) {
            return Err(EngineError::schema(format!("table {key} already exists")));
        }
        tracing::debug!(table = %key, "table created");
        map.insert(key, Arc::new(RwLock::new(table)));
        Ok(())
    }

    /// Removes a table from the directory.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut map = write_guard(&self.tables)?;
        if map.remove(&name.to_lowercase()).is_none() {
            return Err(EngineError::table_not_found(name));
        }
        tracing::debug!(table = %name, "table dropped");
        Ok(())
    }

    /// Resolves a table by case-insensitive name.
    pub fn table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.try_table(name)?
            .ok_or_else(|| EngineError::table_not_found(name))
    }

    /// Resolves a table, returning `None` when absent.
    pub fn try_table(&self, name: &str) -> Result<Option<Arc<RwLock<Table>>>> {
        let map = read_guard(&self.tables)?;
        Ok(map.get(&name.to_lowercase()).cloned())
    }

    /// Returns `true` if the table exists.
    pub fn contains_table(&self, name: &str) -> Result<bool> {
        Ok(read_guard(&self.tables)?.contains_key(&name.to_lowercase()))
    }

    /// All table names, sorted. Sorted order doubles as the lock
    /// acquisition order for multi-table operations.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let map = read_guard(&self.tables)?;
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Names of tables declaring a foreign key that references `name`,
    /// excluding `name` itself, sorted.
    pub fn tables_referencing(&self, name: &str) -> Result<Vec<String>> {
        let target = name.to_lowercase();
        let mut referencing = Vec::new();
        let map = read_guard(&self.tables)?;
        for (table_name, table) in map.iter() {
            if *table_name == target {
                continue;
            }
            let guard = read_guard(table)?;
            if guard.foreign_keys.iter().any(|fk| fk.references(&target)) {
                referencing.push(table_name.clone());
            }
        }
        referencing.sort();
        Ok(referencing)
    }

    // -- Snapshots -----------------------------------------------------------

    /// Deep-copies every table and every index payload.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let map = read_guard(&self.tables)?;
        let mut tables = HashMap::with_capacity(map.len());
        for (name, table) in map.iter() {
            tables.insert(name.clone(), read_guard(table)?.clone());
        }
        tracing::debug!(tables = tables.len(), "catalog snapshot taken");
        Ok(Snapshot {
            tables,
            indexes: self.indexes.snapshot()?,
        })
    }

    /// Reinstates a snapshot, replacing the whole directory and every
    /// index payload.
    pub fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let mut map = write_guard(&self.tables)?;
        tracing::debug!(tables = snapshot.tables.len(), "catalog snapshot restored");
        *map = snapshot
            .tables
            .into_iter()
            .map(|(name, table)| (name, Arc::new(RwLock::new(table))))
            .collect();
        drop(map);
        self.indexes.restore(snapshot.indexes)
    }
}

#[cfg(test)]
mod tests {
    use mirage_core::{Column, ColumnKind, ReferentialAction, Value};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::constraint::ForeignKey;

    fn table(name: &str) -> Table {
        Table::new(name, vec![Column::new("id", ColumnKind::Int)]).unwrap()
    }

    #[test]
    fn create_resolves_case_insensitively_and_rejects_duplicates() {
        let db = Database::new();
        db.create_table(table("Users")).unwrap();
        assert!(db.table("USERS").is_ok());
        assert!(db.create_table(table("users")).is_err());
    }

    #[test]
    fn drop_missing_table_is_a_schema_error() {
        let db = Database::new();
        let err = db.drop_table("ghost").unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn referencing_tables_are_found() {
        let db = Database::new();
        db.create_table(table("parent")).unwrap();
        let mut child = table("child");
        child.foreign_keys.push(ForeignKey {
            columns: vec!["id".into()],
            ref_table: "parent".into(),
            ref_columns: vec!["id".into()],
            on_delete: ReferentialAction::Restrict,
            on_update: ReferentialAction::NoAction,
        });
        db.create_table(child).unwrap();

        assert_eq!(db.tables_referencing("parent").unwrap(), vec!["child"]);
        assert!(db.tables_referencing("child").unwrap().is_empty());
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let db = Database::new();
        db.create_table(table("t")).unwrap();
        {
            let handle = db.table("t").unwrap();
            let mut guard = handle.write().unwrap();
            guard.append_row(vec![Value::Integer(1)]);
        }
        let snap = db.snapshot().unwrap();

        {
            let handle = db.table("t").unwrap();
            let mut guard = handle.write().unwrap();
            guard.append_row(vec![Value::Integer(2)]);
        }
        db.drop_table("t").ok();
        db.create_table(table("other")).unwrap();

        db.restore(snap).unwrap();
        assert!(db.contains_table("t").unwrap());
        assert!(!db.contains_table("other").unwrap());
        let handle = db.table("t").unwrap();
        assert_eq!(handle.read().unwrap().rows, vec![vec![Value::Integer(1)]]);
    }
}
