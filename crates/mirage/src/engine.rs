//! The engine facade: one statement in, one result out.

use mirage_core::{EngineError, Result};
use mirage_storage::Database;

use crate::ast::Statement;
use crate::exec::{ddl, delete, insert, select, show, update};
use crate::lower;
use crate::preparse;
use crate::record::Recorder;
use crate::result::QueryResult;
use crate::txn::TransactionManager;

/// An in-memory, MySQL-compatible relational engine.
///
/// All state lives in the catalog; the engine itself is shareable across
/// threads, with fine-grained locking inside the storage layer.
#[derive(Default)]
pub struct Engine {
    catalog: Database,
    txn: TransactionManager,
    recorder: Recorder,
}

impl Engine {
    /// Creates an engine with an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes one SQL statement.
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(EngineError::Parse("empty statement".to_string()));
        }
        self.recorder.append(sql);

        let mut statement_text = trimmed.to_string();
        if !statement_text.ends_with(';') {
            statement_text.push(';');
        }

        // The tolerant pre-parser owns the statement families the external
        // parser mishandles; everything else goes through the AST path.
        let statement = match preparse::preparse(&statement_text)? {
            Some(statement) => statement,
            None => lower::parse_statement(&statement_text)?,
        };
        tracing::debug!(statement = ?statement_kind(&statement), "dispatch");
        self.dispatch(statement)
    }

    /// Executes a `;`-separated batch, returning one result per
    /// statement. Splitting respects single-quoted literals.
    pub fn execute_many(&self, sql: &str) -> Result<Vec<QueryResult>> {
        let mut results = Vec::new();
        for statement in split_statements(sql) {
            results.push(self.execute(&statement)?);
        }
        Ok(results)
    }

    // -- Recording -----------------------------------------------------------

    /// Clears the recording log and starts capturing statement texts.
    pub fn begin_recording(&self) {
        self.recorder.start();
    }

    /// Stops capturing.
    pub fn end_recording(&self) {
        self.recorder.stop();
    }

    /// The captured statement texts.
    pub fn recorded(&self) -> Vec<String> {
        self.recorder.recorded()
    }

    // -- Introspection -------------------------------------------------------

    /// The underlying catalog; a test accessor.
    pub fn catalog(&self) -> &Database {
        &self.catalog
    }

    /// Number of lookups served by a hash index instead of a scan.
    pub fn index_hits(&self) -> u64 {
        self.catalog.indexes().hit_count()
    }

    /// Current transaction nesting depth; 0 when idle.
    pub fn transaction_depth(&self) -> usize {
        self.txn.depth()
    }

    // -- Dispatch ------------------------------------------------------------

    fn dispatch(&self, statement: Statement) -> Result<QueryResult> {
        match statement {
            Statement::CreateTable { name, if_not_exists, columns, foreign_keys } => {
                ddl::create_table(&self.catalog, &name, if_not_exists, columns, foreign_keys)
            }
            Statement::AlterTable { name, operations } => {
                ddl::alter_table(&self.catalog, &name, &operations)
            }
            Statement::DropTable { names, if_exists } => {
                ddl::drop_table(&self.catalog, &names, if_exists)
            }
            Statement::TruncateTable { name } => ddl::truncate_table(&self.catalog, &name),
            Statement::CreateIndex { name, table, columns, kind } => {
                ddl::create_index(&self.catalog, &name, &table, &columns, kind)
            }
            Statement::DropIndex { name } => ddl::drop_index(&self.catalog, &name),

            Statement::ShowTables => show::show_tables(&self.catalog),
            Statement::ShowIndex { table } => show::show_index(&self.catalog, &table),
            Statement::Describe { table } => show::describe(&self.catalog, &table),

            Statement::Select(query) => {
                select::execute_query(&self.catalog, &query, None).map(QueryResult::Set)
            }
            Statement::Insert { table, columns, source, on_duplicate } => {
                insert::execute(&self.catalog, &table, &columns, &source, &on_duplicate)
            }
            Statement::Update { table, assignments, filter } => {
                update::execute(&self.catalog, &table, &assignments, filter.as_ref())
            }
            Statement::Delete { table, filter } => {
                delete::execute(&self.catalog, &table, filter.as_ref())
            }

            Statement::Begin => self.txn.begin(&self.catalog),
            Statement::Commit => self.txn.commit(),
            Statement::Rollback => self.txn.rollback(&self.catalog),
            Statement::Savepoint(name) => self.txn.savepoint(&self.catalog, &name),
            Statement::RollbackToSavepoint(name) => {
                self.txn.rollback_to_savepoint(&self.catalog, &name)
            }
            Statement::ReleaseSavepoint(name) => self.txn.release_savepoint(&name),
        }
    }
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::DropTable { .. } => "DROP TABLE",
        Statement::TruncateTable { .. } => "TRUNCATE",
        Statement::CreateIndex { .. } => "CREATE INDEX",
        Statement::DropIndex { .. } => "DROP INDEX",
        Statement::ShowTables => "SHOW TABLES",
        Statement::ShowIndex { .. } => "SHOW INDEX",
        Statement::Describe { .. } => "DESCRIBE",
        Statement::Select(_) => "SELECT",
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Begin => "BEGIN",
        Statement::Commit => "COMMIT",
        Statement::Rollback => "ROLLBACK",
        Statement::Savepoint(_) => "SAVEPOINT",
        Statement::RollbackToSavepoint(_) => "ROLLBACK TO SAVEPOINT",
        Statement::ReleaseSavepoint(_) => "RELEASE SAVEPOINT",
    }
}

/// Splits a batch on `;`, honoring single-quoted strings and backslash
/// escapes. Empty fragments (a trailing `;`) are dropped.
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_string = !in_string;
                current.push(c);
            }
            '\\' if in_string => {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ';' if !in_string => {
                if !current.trim().is_empty() {
                    statements.push(current.trim().to_string());
                }
                current.clear();
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    statements
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn split_honors_quoted_semicolons() {
        let parts = split_statements("INSERT INTO t VALUES ('a;b'); SELECT 1;");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "INSERT INTO t VALUES ('a;b')");
        assert_eq!(parts[1], "SELECT 1");
    }

    #[test]
    fn split_drops_empty_fragments() {
        assert!(split_statements(" ;; ").is_empty());
    }
}
