//! Execution results.

use serde::{Deserialize, Serialize};

use mirage_core::Value;

/// Rows returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Output column names, in projection order.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Vec<Value>>,
}

/// The outcome of one successfully executed statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryResult {
    /// A resultset (SELECT, SHOW, DESCRIBE).
    Set(ResultSet),
    /// A status line (DDL, DML, transaction control).
    Status(String),
}

impl QueryResult {
    /// Builds a status result.
    pub fn status(message: impl Into<String>) -> Self {
        QueryResult::Status(message.into())
    }

    /// The resultset, if this is one.
    pub fn as_set(&self) -> Option<&ResultSet> {
        match self {
            QueryResult::Set(set) => Some(set),
            QueryResult::Status(_) => None,
        }
    }
}
