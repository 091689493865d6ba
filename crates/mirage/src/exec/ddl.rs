//! Schema statements: CREATE/ALTER/DROP/TRUNCATE TABLE, CREATE/DROP
//! INDEX.

use mirage_core::{Column, EngineError, Result, Value, coerce};
use mirage_storage::{
    Database, ForeignKey, IndexKind, Table, default_value, read_guard, write_guard,
};

use crate::ast::AlterOp;
use crate::result::QueryResult;

pub fn create_table(
    catalog: &Database,
    name: &str,
    if_not_exists: bool,
    columns: Vec<Column>,
    foreign_keys: Vec<ForeignKey>,
) -> Result<QueryResult> {
    let name = name.to_lowercase();
    if catalog.contains_table(&name)? {
        if if_not_exists {
            return Ok(QueryResult::status(format!(
                "Table {name} created successfully"
            )));
        }
        return Err(EngineError::schema(format!("table {name} already exists")));
    }

    let mut table = Table::new(name.clone(), columns)?;
    for fk in &foreign_keys {
        validate_foreign_key(catalog, &table, fk)?;
    }
    table.foreign_keys = foreign_keys;
    catalog.create_table(table)?;
    Ok(QueryResult::status(format!(
        "Table {name} created successfully"
    )))
}

/// The referenced table and columns must exist up front; self-references
/// resolve against the table being created.
fn validate_foreign_key(catalog: &Database, table: &Table, fk: &ForeignKey) -> Result<()> {
    for column in &fk.columns {
        if table.column_index(column).is_none() {
            return Err(EngineError::column_not_found(column));
        }
    }
    if fk.columns.len() != fk.ref_columns.len() {
        return Err(EngineError::schema(format!(
            "foreign key on {} has mismatched column counts",
            table.name
        )));
    }
    if fk.ref_table == table.name {
        for column in &fk.ref_columns {
            if table.column_index(column).is_none() {
                return Err(EngineError::column_not_found(column));
            }
        }
        return Ok(());
    }
    let parent = catalog.table(&fk.ref_table)?;
    let parent = read_guard(&parent)?;
    for column in &fk.ref_columns {
        if parent.column_index(column).is_none() {
            return Err(EngineError::column_not_found(column));
        }
    }
    Ok(())
}

pub fn drop_table(catalog: &Database, names: &[String], if_exists: bool) -> Result<QueryResult> {
    for name in names {
        let name = name.to_lowercase();
        if !catalog.contains_table(&name)? {
            if if_exists {
                continue;
            }
            return Err(EngineError::table_not_found(&name));
        }
        let referencing = catalog.tables_referencing(&name)?;
        if !referencing.is_empty() {
            return Err(EngineError::constraint(format!(
                "cannot drop table {name}: referenced by {}",
                referencing.join(", ")
            )));
        }
        catalog.indexes().drop_for_table(&name)?;
        catalog.drop_table(&name)?;
    }
    Ok(QueryResult::status("Table dropped successfully"))
}

pub fn truncate_table(catalog: &Database, name: &str) -> Result<QueryResult> {
    let name = name.to_lowercase();
    let handle = catalog.table(&name)?;

    // Refuse when a referencing table still holds rows.
    for child_name in catalog.tables_referencing(&name)? {
        let child = catalog.table(&child_name)?;
        if !read_guard(&child)?.rows.is_empty() {
            return Err(EngineError::constraint(format!(
                "cannot truncate table {name}: referenced by {child_name}"
            )));
        }
    }

    let mut table = write_guard(&handle)?;
    table.truncate();
    catalog.indexes().rebuild_for_table(&table)?;
    Ok(QueryResult::status("Table truncated successfully"))
}

pub fn alter_table(
    catalog: &Database,
    name: &str,
    operations: &[AlterOp],
) -> Result<QueryResult> {
    let name = name.to_lowercase();
    let handle = catalog.table(&name)?;
    let mut table = write_guard(&handle)?;

    for op in operations {
        match op {
            AlterOp::AddColumn(column) => add_column(catalog, &mut table, column.clone())?,
            AlterOp::DropColumn(column) => drop_column(catalog, &mut table, column)?,
            AlterOp::ModifyColumn(column) => {
                modify_column(catalog, &mut table, &column.name.clone(), column.clone())?
            }
            AlterOp::ChangeColumn { old_name, column } => {
                modify_column(catalog, &mut table, old_name, column.clone())?
            }
        }
    }
    Ok(QueryResult::status(format!(
        "Table {name} altered successfully"
    )))
}

fn add_column(catalog: &Database, table: &mut Table, column: Column) -> Result<()> {
    if table.column_index(&column.name).is_some() {
        return Err(EngineError::schema(format!(
            "column {} already exists",
            column.name
        )));
    }
    let fill = default_value(&column)?;
    for row in &mut table.rows {
        row.push(fill.clone());
    }
    table.columns.push(column);
    table.rebuild_unique_sets();
    catalog.indexes().rebuild_for_table(table)?;
    Ok(())
}

fn drop_column(catalog: &Database, table: &mut Table, column: &str) -> Result<()> {
    let position = table
        .column_index(column)
        .ok_or_else(|| EngineError::column_not_found(column))?;
    table.columns.remove(position);
    for row in &mut table.rows {
        row.remove(position);
    }
    // Declarations involving the column go with it.
    table.foreign_keys.retain(|fk| !fk.uses_column(column));
    catalog.indexes().drop_for_column(&table.name, column)?;
    table.rebuild_unique_sets();
    catalog.indexes().rebuild_for_table(table)?;
    Ok(())
}

/// MODIFY (and CHANGE, when `old_name` differs) replaces the declaration
/// and coerces every stored value to the new kind. Any uncoercible value
/// fails the statement before the table is touched.
fn modify_column(
    catalog: &Database,
    table: &mut Table,
    old_name: &str,
    column: Column,
) -> Result<()> {
    let position = table
        .column_index(old_name)
        .ok_or_else(|| EngineError::column_not_found(old_name))?;

    let mut converted = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        converted.push(coerce(&row[position], &column.kind, &column.name)?);
    }
    if column.requires_unique() {
        ensure_distinct(&converted, &column.name)?;
    }

    let renamed = !column.is_named(old_name);
    if renamed {
        for fk in &mut table.foreign_keys {
            for local in &mut fk.columns {
                if local.eq_ignore_ascii_case(old_name) {
                    *local = column.name.to_lowercase();
                }
            }
        }
    }

    for (row, value) in table.rows.iter_mut().zip(converted) {
        row[position] = value;
    }
    table.columns[position] = column;
    table.rebuild_unique_sets();
    if renamed {
        catalog
            .indexes()
            .rename_column(table, old_name, &table.columns[position].name.clone())?;
    }
    catalog.indexes().rebuild_for_table(table)?;
    Ok(())
}

fn ensure_distinct(values: &[Value], column: &str) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for value in values {
        if value.is_null() {
            continue;
        }
        if !seen.insert(value.canonical_key()) {
            return Err(EngineError::constraint(format!(
                "duplicate value for unique column {column}"
            )));
        }
    }
    Ok(())
}

pub fn create_index(
    catalog: &Database,
    name: &str,
    table_name: &str,
    columns: &[String],
    kind: IndexKind,
) -> Result<QueryResult> {
    let handle = catalog.table(table_name)?;
    let table = read_guard(&handle)?;
    catalog
        .indexes()
        .create(name, &table, columns.to_vec(), kind)?;
    Ok(QueryResult::status("Index created successfully"))
}

pub fn drop_index(catalog: &Database, name: &str) -> Result<QueryResult> {
    catalog.indexes().drop_index(name)?;
    Ok(QueryResult::status("Index dropped successfully"))
}
