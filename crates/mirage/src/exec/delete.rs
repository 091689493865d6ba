//! The DELETE executor.
//!
//! Deletion is two-phase for foreign-key safety. Phase one walks every
//! child table referencing a doomed row and validates the declared
//! action: RESTRICT/NO ACTION fails the statement, CASCADE recurses into
//! grandchildren, SET NULL/SET DEFAULT plan column fixes (failing early
//! when the fix is impossible). Phase two applies the fixes, compacts
//! every touched table and rebuilds its unique sets and indexes. Nothing
//! mutates until the whole plan validates.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use mirage_core::{EngineError, ReferentialAction, Result, Value};
use mirage_storage::{Database, ForeignKey, Table, default_value, write_guard};

use crate::ast::Expr;
use crate::eval::{self, Env};
use crate::exec::expr_references_table;
use crate::result::QueryResult;

/// Planned SET NULL / SET DEFAULT write.
struct Fix {
    table: String,
    position: usize,
    column: usize,
    value: Value,
}

pub fn execute(catalog: &Database, table_name: &str, filter: Option<&Expr>) -> Result<QueryResult> {
    let target_name = table_name.to_lowercase();

    // Every table the cascade may touch: the target plus the transitive
    // closure of tables referencing it.
    let mut lock_set: Vec<String> = vec![target_name.clone()];
    let mut frontier = vec![target_name.clone()];
    while let Some(current) = frontier.pop() {
        for child in catalog.tables_referencing(&current)? {
            if !lock_set.contains(&child) {
                lock_set.push(child.clone());
                frontier.push(child);
            }
        }
    }
    lock_set.sort();

    // The whole set is write-locked for the statement, so a filter
    // subquery touching any of it would self-deadlock.
    if let Some(filter) = filter {
        for name in &lock_set {
            if expr_references_table(filter, name) {
                return Err(EngineError::query(format!(
                    "subquery may not reference table {name} during DELETE"
                )));
            }
        }
    }

    let arcs: Vec<(String, Arc<RwLock<Table>>)> = lock_set
        .iter()
        .map(|name| Ok((name.clone(), catalog.table(name)?)))
        .collect::<Result<_>>()?;
    let mut guard_list = Vec::with_capacity(arcs.len());
    for (name, arc) in &arcs {
        guard_list.push((name.clone(), write_guard(arc)?));
    }
    let mut guards: HashMap<String, _> = guard_list.into_iter().collect();

    // Doomed rows in the target.
    let doomed: Vec<usize> = {
        let table = &guards[&target_name];
        let layout = eval::table_layout(&target_name, &table.columns);
        let mut doomed = Vec::new();
        for (position, row) in table.rows.iter().enumerate() {
            let matched = match filter {
                Some(filter) => {
                    let env = Env::row(catalog, &layout, row);
                    eval::eval_predicate(filter, &env)?
                }
                None => true,
            };
            if matched {
                doomed.push(position);
            }
        }
        doomed
    };

    // Child edges within the lock set: parent table -> (child, fk).
    let mut edges: HashMap<String, Vec<(String, ForeignKey)>> = HashMap::new();
    for (name, table) in &guards {
        for fk in &table.foreign_keys {
            if guards.contains_key(&fk.ref_table) {
                edges
                    .entry(fk.ref_table.clone())
                    .or_default()
                    .push((name.clone(), fk.clone()));
            }
        }
    }

    // Phase 1: validate and plan.
    let mut deletions: HashMap<String, HashSet<usize>> = HashMap::new();
    deletions
        .entry(target_name.clone())
        .or_default()
        .extend(doomed.iter().copied());
    let mut fixes = Vec::new();
    plan_cascade(&guards, &edges, &target_name, &doomed, &mut deletions, &mut fixes)?;

    // Phase 2: apply.
    for fix in &fixes {
        if let Some(table) = guards.get_mut(&fix.table) {
            table.rows[fix.position][fix.column] = fix.value.clone();
        }
    }
    let deleted = doomed.len();
    for name in deletions.keys() {
        let positions: Vec<usize> = deletions[name].iter().copied().collect();
        if let Some(table) = guards.get_mut(name) {
            table.remove_rows(&positions);
            table.rebuild_unique_sets();
            catalog.indexes().rebuild_for_table(table)?;
        }
    }
    // Tables that only received fixes still need their bookkeeping
    // refreshed.
    for fix in &fixes {
        if !deletions.contains_key(&fix.table) {
            if let Some(table) = guards.get_mut(&fix.table) {
                table.rebuild_unique_sets();
                catalog.indexes().rebuild_for_table(table)?;
            }
        }
    }

    tracing::debug!(table = %target_name, rows = deleted, "delete complete");
    Ok(QueryResult::status(format!("Deleted {deleted} row(s)")))
}

/// Walks the children of `parent`'s doomed rows, validating referential
/// actions and extending the plan. Grandchildren of CASCADE deletions are
/// validated before anything mutates.
fn plan_cascade(
    guards: &HashMap<String, std::sync::RwLockWriteGuard<'_, Table>>,
    edges: &HashMap<String, Vec<(String, ForeignKey)>>,
    parent_name: &str,
    doomed: &[usize],
    deletions: &mut HashMap<String, HashSet<usize>>,
    fixes: &mut Vec<Fix>,
) -> Result<()> {
    if doomed.is_empty() {
        return Ok(());
    }
    let parent = &guards[parent_name];
    let Some(children) = edges.get(parent_name) else {
        return Ok(());
    };

    for (child_name, fk) in children {
        let child = &guards[child_name];
        let ref_positions = resolve_columns(parent, &fk.ref_columns)?;
        let local_positions = resolve_columns(child, &fk.columns)?;

        let mut cascaded = Vec::new();
        for parent_position in doomed {
            let key: Vec<&Value> = ref_positions
                .iter()
                .map(|p| &parent.rows[*parent_position][*p])
                .collect();

            for (child_position, child_row) in child.rows.iter().enumerate() {
                let already_planned = deletions
                    .get(child_name)
                    .is_some_and(|set| set.contains(&child_position));
                if already_planned {
                    continue;
                }
                let references = local_positions
                    .iter()
                    .zip(&key)
                    .all(|(p, v)| child_row[*p].same_as(v));
                if !references {
                    continue;
                }

                match fk.on_delete {
                    ReferentialAction::Restrict | ReferentialAction::NoAction => {
                        return Err(EngineError::constraint(format!(
                            "cannot delete from {parent_name}: referenced by {child_name}"
                        )));
                    }
                    ReferentialAction::Cascade => {
                        deletions
                            .entry(child_name.clone())
                            .or_default()
                            .insert(child_position);
                        cascaded.push(child_position);
                    }
                    ReferentialAction::SetNull => {
                        for (column_position, column_name) in
                            local_positions.iter().zip(&fk.columns)
                        {
                            let column = &child.columns[*column_position];
                            if column.not_null {
                                return Err(EngineError::constraint(format!(
                                    "cannot set null: column {column_name} in {child_name} is NOT NULL"
                                )));
                            }
                            fixes.push(Fix {
                                table: child_name.clone(),
                                position: child_position,
                                column: *column_position,
                                value: Value::Null,
                            });
                        }
                    }
                    ReferentialAction::SetDefault => {
                        for (column_position, column_name) in
                            local_positions.iter().zip(&fk.columns)
                        {
                            let column = &child.columns[*column_position];
                            if column.default.is_none() {
                                return Err(EngineError::constraint(format!(
                                    "cannot set default: column {column_name} in {child_name} has no default"
                                )));
                            }
                            fixes.push(Fix {
                                table: child_name.clone(),
                                position: child_position,
                                column: *column_position,
                                value: default_value(column)?,
                            });
                        }
                    }
                }
            }
        }

        // Grandchildren of freshly cascaded rows are validated next.
        plan_cascade(guards, edges, child_name, &cascaded, deletions, fixes)?;
    }
    Ok(())
}

fn resolve_columns(table: &Table, names: &[String]) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| EngineError::column_not_found(name))
        })
        .collect()
}
