//! The INSERT executor.
//!
//! Each row goes through the same pipeline: default every column, overlay
//! the supplied values, assign auto-increment, validate (NOT NULL, type,
//! UNIQUE/PRIMARY, FOREIGN KEY), then append and maintain indexes and
//! unique sets. A later row failing leaves earlier rows written; statement
//! atomicity outside transactions is deliberately not provided.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use mirage_core::{EngineError, Result, Value, coerce};
use mirage_storage::{Database, ForeignKey, Table, read_guard, write_guard};

use crate::ast::{Expr, InsertSource};
use crate::eval::{self, Env};
use crate::exec::select;
use crate::result::QueryResult;

pub fn execute(
    catalog: &Database,
    table_name: &str,
    columns: &[String],
    source: &InsertSource,
    on_duplicate: &[(String, Expr)],
) -> Result<QueryResult> {
    // Materialize the input rows before taking any write lock; an
    // INSERT … SELECT may read the target table itself.
    let input_rows = materialize(catalog, source)?;

    let target_name = table_name.to_lowercase();
    let handle = catalog.table(&target_name)?;

    // Lock plan: the target's write lock plus a read lock per distinct FK
    // parent, all acquired in alphabetical order so concurrent
    // multi-table writers cannot deadlock.
    let mut parent_names: Vec<String> = {
        let guard = read_guard(&handle)?;
        guard
            .foreign_keys
            .iter()
            .map(|fk| fk.ref_table.clone())
            .filter(|name| *name != target_name)
            .collect()
    };
    parent_names.sort();
    parent_names.dedup();
    let parent_arcs: Vec<(String, Arc<RwLock<Table>>)> = parent_names
        .iter()
        .map(|name| Ok((name.clone(), catalog.table(name)?)))
        .collect::<Result<_>>()?;

    let mut target_guard = None;
    let mut parent_guards = Vec::with_capacity(parent_arcs.len());
    for (name, arc) in &parent_arcs {
        if target_guard.is_none() && name.as_str() > target_name.as_str() {
            target_guard = Some(write_guard(&handle)?);
        }
        parent_guards.push((name.as_str(), read_guard(arc)?));
    }
    let mut table = match target_guard {
        Some(guard) => guard,
        None => write_guard(&handle)?,
    };
    let parents: HashMap<&str, &Table> = parent_guards
        .iter()
        .map(|(name, guard)| (*name, &**guard))
        .collect();

    let positions = column_positions(&table, columns, &input_rows)?;
    let inserted = input_rows.len();
    for values in input_rows {
        insert_row(catalog, &mut table, &parents, &positions, values, on_duplicate)?;
    }
    tracing::debug!(table = %table.name, rows = inserted, "insert complete");
    Ok(QueryResult::status("Insert successful"))
}

fn materialize(catalog: &Database, source: &InsertSource) -> Result<Vec<Vec<Value>>> {
    match source {
        InsertSource::Values(rows) => {
            let env = Env::bare(catalog);
            rows.iter()
                .map(|row| row.iter().map(|e| eval::eval(e, &env)).collect())
                .collect()
        }
        InsertSource::Select(query) => Ok(select::execute_query(catalog, query, None)?.rows),
    }
}

/// Maps the statement's column list onto table positions. An empty list
/// means positional assignment over all columns.
fn column_positions(table: &Table, columns: &[String], rows: &[Vec<Value>]) -> Result<Vec<usize>> {
    let positions = if columns.is_empty() {
        (0..table.columns.len()).collect::<Vec<_>>()
    } else {
        columns
            .iter()
            .map(|name| {
                table
                    .column_index(name)
                    .ok_or_else(|| EngineError::column_not_found(name))
            })
            .collect::<Result<Vec<_>>>()?
    };
    for row in rows {
        if row.len() != positions.len() {
            return Err(EngineError::query(format!(
                "column count does not match value count ({} vs {})",
                positions.len(),
                row.len()
            )));
        }
    }
    Ok(positions)
}

fn insert_row(
    catalog: &Database,
    table: &mut Table,
    parents: &HashMap<&str, &Table>,
    positions: &[usize],
    values: Vec<Value>,
    on_duplicate: &[(String, Expr)],
) -> Result<()> {
    let mut row = table.default_row()?;
    for (position, value) in positions.iter().zip(values) {
        let column = &table.columns[*position];
        row[*position] = coerce(&value, &column.kind, &column.name)?;
    }

    // Auto-increment: NULL or 0 takes the next counter value; an explicit
    // value beyond the counter raises it.
    if let Some(auto) = table.auto_increment_index() {
        if matches!(row[auto], Value::Null | Value::Integer(0)) {
            row[auto] = Value::Integer(table.next_auto_increment());
        } else if let Value::Integer(explicit) = row[auto] {
            table.observe_auto_increment(explicit);
        }
    }

    for (position, column) in table.columns.iter().enumerate() {
        if column.not_null && row[position].is_null() {
            return Err(EngineError::constraint(format!(
                "column {} cannot be null",
                column.name
            )));
        }
    }

    // UNIQUE/PRIMARY: a conflict either diverts into the ON DUPLICATE KEY
    // UPDATE branch or rejects the row.
    if let Some(conflict) = unique_conflict(table, &row) {
        if !on_duplicate.is_empty() {
            return apply_duplicate_update(catalog, table, conflict, row, on_duplicate);
        }
        let column = &table.columns[conflict].name;
        return Err(EngineError::constraint(format!(
            "duplicate value for unique column {column}"
        )));
    }

    validate_foreign_keys(table, parents, &row)?;

    let unique_columns = unique_column_positions(table);
    let position = table.append_row(row);
    for (index, name) in &unique_columns {
        let value = table.rows[position][*index].clone();
        table.unique_insert(name, &value);
    }
    catalog.indexes().note_insert(table, position)?;
    Ok(())
}

fn unique_column_positions(table: &Table) -> Vec<(usize, String)> {
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.requires_unique())
        .map(|(i, c)| (i, c.name.clone()))
        .collect()
}

/// First column whose unique set already holds the row's value.
fn unique_conflict(table: &Table, row: &[Value]) -> Option<usize> {
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.requires_unique())
        .find(|(i, c)| table.unique_conflict(&c.name, &row[*i]))
        .map(|(i, _)| i)
}

/// Enforces every declared foreign key for one candidate row. Rows with a
/// NULL in any referencing column are exempt.
pub(crate) fn validate_foreign_keys(
    table: &Table,
    parents: &HashMap<&str, &Table>,
    row: &[Value],
) -> Result<()> {
    for fk in &table.foreign_keys {
        let mut child_values = Vec::with_capacity(fk.columns.len());
        for column in &fk.columns {
            let position = table
                .column_index(column)
                .ok_or_else(|| EngineError::column_not_found(column))?;
            child_values.push(row[position].clone());
        }
        if child_values.iter().any(Value::is_null) {
            continue;
        }

        let parent: &Table = if fk.ref_table == table.name {
            table
        } else {
            parents
                .get(fk.ref_table.as_str())
                .copied()
                .ok_or_else(|| EngineError::table_not_found(&fk.ref_table))?
        };
        if !parent_has(parent, fk, &child_values)? {
            return Err(EngineError::constraint(format!(
                "foreign key constraint violation: no row in {} matches ({})",
                fk.ref_table,
                child_values
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    }
    Ok(())
}

fn parent_has(parent: &Table, fk: &ForeignKey, values: &[Value]) -> Result<bool> {
    let mut positions = Vec::with_capacity(fk.ref_columns.len());
    for column in &fk.ref_columns {
        positions.push(
            parent
                .column_index(column)
                .ok_or_else(|| EngineError::column_not_found(column))?,
        );
    }
    Ok(parent.rows.iter().any(|row| {
        positions
            .iter()
            .zip(values)
            .all(|(p, v)| row[*p].same_as(v))
    }))
}

/// The ON DUPLICATE KEY UPDATE branch: apply the assignment list to the
/// row holding the conflicting key. `VALUES(col)` resolves against the
/// row the insert would have written.
fn apply_duplicate_update(
    catalog: &Database,
    table: &mut Table,
    conflict_column: usize,
    pending: Vec<Value>,
    assignments: &[(String, Expr)],
) -> Result<()> {
    let key = pending[conflict_column].clone();
    let position = table
        .rows
        .iter()
        .position(|row| row[conflict_column].same_as(&key))
        .ok_or_else(|| EngineError::internal("unique set out of sync with rows"))?;

    let layout = eval::table_layout(&table.name, &table.columns);
    let current = table.rows[position].clone();
    let mut updated = current.clone();
    {
        let env = Env {
            catalog,
            columns: &layout,
            row: &current,
            outer: None,
            pending: Some(&pending),
        };
        for (column, expr) in assignments {
            let target = table
                .column_index(column)
                .ok_or_else(|| EngineError::column_not_found(column))?;
            let value = eval::eval(expr, &env)?;
            updated[target] = coerce(&value, &table.columns[target].kind, column)?;
        }
    }

    for (position_in_row, column) in table.columns.iter().enumerate() {
        if column.not_null && updated[position_in_row].is_null() {
            return Err(EngineError::constraint(format!(
                "column {} cannot be null",
                column.name
            )));
        }
    }

    // Re-key unique sets for changed unique columns, rejecting the write
    // before any mutation if the new key is taken.
    let unique_columns = unique_column_positions(table);
    for (index, name) in &unique_columns {
        if !current[*index].same_as(&updated[*index])
            && table.unique_conflict(name, &updated[*index])
        {
            return Err(EngineError::constraint(format!(
                "duplicate value for unique column {name}"
            )));
        }
    }
    for (index, name) in &unique_columns {
        if !current[*index].same_as(&updated[*index]) {
            table.unique_remove(name, &current[*index]);
            table.unique_insert(name, &updated[*index]);
        }
    }

    table.rows[position] = updated;
    catalog.indexes().note_update(table, position, &current)?;
    Ok(())
}
