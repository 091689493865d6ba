//! The UPDATE executor.
//!
//! For every row matching WHERE: evaluate the SET expressions against the
//! current row, fire ON UPDATE CURRENT_TIMESTAMP for columns absent from
//! the SET list, coerce, validate (NOT NULL, UNIQUE, foreign keys both
//! ways), then write in place and re-key the indexes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use mirage_core::coerce::now_timestamp;
use mirage_core::{EngineError, Result, Value, coerce};
use mirage_storage::{Database, ForeignKey, Table, read_guard, write_guard};

use crate::ast::Expr;
use crate::eval::{self, Env};
use crate::exec::{expr_references_table, insert};
use crate::result::QueryResult;

pub fn execute(
    catalog: &Database,
    table_name: &str,
    assignments: &[(String, Expr)],
    filter: Option<&Expr>,
) -> Result<QueryResult> {
    let target_name = table_name.to_lowercase();

    // The write lock is held for the whole statement; a subquery reading
    // the target would self-deadlock, so reject it up front.
    for expr in assignments.iter().map(|(_, e)| e).chain(filter) {
        if expr_references_table(expr, &target_name) {
            return Err(EngineError::query(format!(
                "subquery may not reference the updated table {target_name}"
            )));
        }
    }

    let handle = catalog.table(&target_name)?;

    // Lock plan, alphabetical: write on the target, read on FK parents
    // (child-side checks) and on referencing children (parent-side
    // checks).
    let mut other_names: Vec<String> = {
        let guard = read_guard(&handle)?;
        guard
            .foreign_keys
            .iter()
            .map(|fk| fk.ref_table.clone())
            .collect()
    };
    other_names.extend(catalog.tables_referencing(&target_name)?);
    other_names.retain(|name| *name != target_name);
    other_names.sort();
    other_names.dedup();
    let other_arcs: Vec<(String, Arc<RwLock<Table>>)> = other_names
        .iter()
        .map(|name| Ok((name.clone(), catalog.table(name)?)))
        .collect::<Result<_>>()?;

    let mut target_guard = None;
    let mut other_guards = Vec::with_capacity(other_arcs.len());
    for (name, arc) in &other_arcs {
        if target_guard.is_none() && name.as_str() > target_name.as_str() {
            target_guard = Some(write_guard(&handle)?);
        }
        other_guards.push((name.as_str(), read_guard(arc)?));
    }
    let mut table = match target_guard {
        Some(guard) => guard,
        None => write_guard(&handle)?,
    };
    let others: HashMap<&str, &Table> = other_guards
        .iter()
        .map(|(name, guard)| (*name, &**guard))
        .collect();

    // Children whose foreign keys point at the target, for parent-side
    // restriction when a referenced column changes.
    let referencing: Vec<(&str, &ForeignKey)> = others
        .iter()
        .flat_map(|(name, child)| {
            child
                .foreign_keys
                .iter()
                .filter(|fk| fk.ref_table == target_name)
                .map(move |fk| (*name, fk))
        })
        .collect();

    let layout = eval::table_layout(&target_name, &table.columns);
    let touch_columns: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.on_update_current_timestamp)
        .filter(|(_, c)| !assignments.iter().any(|(name, _)| c.is_named(name)))
        .map(|(i, _)| i)
        .collect();

    let mut updated = 0usize;
    for position in 0..table.rows.len() {
        let current = table.rows[position].clone();
        let env = Env::row(catalog, &layout, &current);
        if let Some(filter) = filter {
            if !eval::eval_predicate(filter, &env)? {
                continue;
            }
        }

        let mut candidate = current.clone();
        for (column, expr) in assignments {
            let target = table
                .column_index(column)
                .ok_or_else(|| EngineError::column_not_found(column))?;
            let value = eval::eval(expr, &env)?;
            candidate[target] = coerce(&value, &table.columns[target].kind, column)?;
        }
        // ON UPDATE CURRENT_TIMESTAMP fires for every matched row whose
        // column the SET list left alone.
        for touch in &touch_columns {
            candidate[*touch] = Value::Text(now_timestamp());
        }

        validate_row(&table, &others, &referencing, &current, &candidate)?;

        let unique_changes: Vec<(usize, String)> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(i, c)| c.requires_unique() && !current[*i].same_as(&candidate[*i]))
            .map(|(i, c)| (i, c.name.clone()))
            .collect();
        for (index, name) in &unique_changes {
            table.unique_remove(name, &current[*index]);
            table.unique_insert(name, &candidate[*index]);
        }

        table.rows[position] = candidate;
        catalog.indexes().note_update(&table, position, &current)?;
        updated += 1;
    }

    tracing::debug!(table = %target_name, rows = updated, "update complete");
    Ok(QueryResult::status(format!("Updated {updated} row(s)")))
}

fn validate_row(
    table: &Table,
    others: &HashMap<&str, &Table>,
    referencing: &[(&str, &ForeignKey)],
    current: &[Value],
    candidate: &[Value],
) -> Result<()> {
    for (position, column) in table.columns.iter().enumerate() {
        if column.not_null && candidate[position].is_null() {
            return Err(EngineError::constraint(format!(
                "column {} cannot be null",
                column.name
            )));
        }
        if column.requires_unique()
            && !current[position].same_as(&candidate[position])
            && table.unique_conflict(&column.name, &candidate[position])
        {
            return Err(EngineError::constraint(format!(
                "duplicate value for unique column {}",
                column.name
            )));
        }
    }

    // Child side: the new values must still point at an existing parent.
    insert::validate_foreign_keys(table, others, candidate)?;

    // Parent side: refuse to change a referenced key while child rows
    // still point at the old value.
    for (child_name, fk) in referencing {
        let mut changed = false;
        let mut old_key = Vec::with_capacity(fk.ref_columns.len());
        for column in &fk.ref_columns {
            let position = table
                .column_index(column)
                .ok_or_else(|| EngineError::column_not_found(column))?;
            changed |= !current[position].same_as(&candidate[position]);
            old_key.push(current[position].clone());
        }
        if !changed {
            continue;
        }
        let child = others
            .get(*child_name)
            .copied()
            .ok_or_else(|| EngineError::table_not_found(child_name))?;
        if child_references(child, fk, &old_key)? {
            return Err(EngineError::constraint(format!(
                "cannot update {}: referenced by {child_name}",
                table.name
            )));
        }
    }
    Ok(())
}

fn child_references(child: &Table, fk: &ForeignKey, key: &[Value]) -> Result<bool> {
    let mut positions = Vec::with_capacity(fk.columns.len());
    for column in &fk.columns {
        positions.push(
            child
                .column_index(column)
                .ok_or_else(|| EngineError::column_not_found(column))?,
        );
    }
    Ok(child
        .rows
        .iter()
        .any(|row| positions.iter().zip(key).all(|(p, v)| row[*p].same_as(v))))
}
