//! SHOW TABLES, SHOW INDEX and DESCRIBE.

use mirage_core::{DefaultValue, Result, Value};
use mirage_storage::{Database, read_guard};

use crate::result::{QueryResult, ResultSet};

pub fn show_tables(catalog: &Database) -> Result<QueryResult> {
    let rows = catalog
        .table_names()?
        .into_iter()
        .map(|name| vec![Value::Text(name)])
        .collect();
    Ok(QueryResult::Set(ResultSet {
        columns: vec!["Tables".to_string()],
        rows,
    }))
}

pub fn show_index(catalog: &Database, table: &str) -> Result<QueryResult> {
    // Resolving the table first yields the proper schema error for
    // unknown names.
    catalog.table(table)?;

    let mut rows = Vec::new();
    for index in catalog.indexes().for_table(table)? {
        let index = read_guard(&index)?;
        let functional = if index.kind.is_functional() {
            "Yes"
        } else {
            "No (Parsed Only)"
        };
        rows.push(vec![
            Value::Text(index.table.clone()),
            Value::Text(index.name.clone()),
            Value::Text(index.columns.join(", ")),
            Value::Text(index.kind.to_string()),
            Value::Text(functional.to_string()),
        ]);
    }
    Ok(QueryResult::Set(ResultSet {
        columns: ["Table", "Key_name", "Column_name", "Index_type", "Functional"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        rows,
    }))
}

pub fn describe(catalog: &Database, table: &str) -> Result<QueryResult> {
    let handle = catalog.table(table)?;
    let table = read_guard(&handle)?;

    let mut rows = Vec::new();
    for column in &table.columns {
        let key = if column.primary {
            "PRI"
        } else if column.unique {
            "UNI"
        } else {
            ""
        };
        let default = match &column.default {
            Some(DefaultValue::Literal(v)) => Value::Text(v.to_string()),
            Some(DefaultValue::CurrentTimestamp) => Value::Text("CURRENT_TIMESTAMP".to_string()),
            None => Value::Null,
        };
        let mut extra = Vec::new();
        if column.auto_increment {
            extra.push("auto_increment");
        }
        if column.on_update_current_timestamp {
            extra.push("on update CURRENT_TIMESTAMP");
        }
        rows.push(vec![
            Value::Text(column.name.clone()),
            Value::Text(column.kind.to_string()),
            Value::Text(if column.not_null { "NO" } else { "YES" }.to_string()),
            Value::Text(key.to_string()),
            default,
            Value::Text(extra.join(" ")),
        ]);
    }
    Ok(QueryResult::Set(ResultSet {
        columns: ["Field", "Type", "Null", "Key", "Default", "Extra"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        rows,
    }))
}
