//! Tolerant text pre-parser.
//!
//! A handful of statement families bypass the external AST parser: index
//! DDL and SHOW (which it mishandles for the MySQL dialect), DESCRIBE,
//! TRUNCATE and the transaction-control family (trivial grammars, parsed
//! here so the engine controls their exact shape). The pre-parser is
//! keyword-tolerant: identifiers may be backtick-quoted and keywords are
//! case-insensitive.

use mirage_core::{EngineError, Result};
use mirage_storage::IndexKind;

use crate::ast::Statement;

/// Attempts to recognize `sql` as one of the pre-parsed statement
/// families. Returns `Ok(None)` when the statement belongs to the
/// external parser.
pub fn preparse(sql: &str) -> Result<Option<Statement>> {
    let tokens = tokenize(sql);
    if tokens.is_empty() {
        return Err(EngineError::Parse("empty statement".to_string()));
    }
    let upper: Vec<String> = tokens.iter().map(|t| t.to_uppercase()).collect();
    let kw: Vec<&str> = upper.iter().map(String::as_str).collect();

    let stmt = match kw.as_slice() {
        ["SHOW", "TABLES"] => Statement::ShowTables,

        ["SHOW", "INDEX" | "INDEXES" | "KEYS", "FROM", _] => Statement::ShowIndex {
            table: tokens[3].to_lowercase(),
        },

        ["SHOW", "COLUMNS", "FROM", _] => Statement::Describe {
            table: tokens[3].to_lowercase(),
        },
        ["DESCRIBE" | "DESC", _] => Statement::Describe {
            table: tokens[1].to_lowercase(),
        },

        ["TRUNCATE", "TABLE", _] => Statement::TruncateTable {
            name: tokens[2].to_lowercase(),
        },
        ["TRUNCATE", _] => Statement::TruncateTable {
            name: tokens[1].to_lowercase(),
        },

        ["BEGIN"] | ["START", "TRANSACTION"] => Statement::Begin,
        ["COMMIT"] => Statement::Commit,
        ["ROLLBACK"] => Statement::Rollback,
        ["ROLLBACK", "TO", "SAVEPOINT", _] => {
            Statement::RollbackToSavepoint(tokens[3].clone())
        }
        ["ROLLBACK", "TO", _] => Statement::RollbackToSavepoint(tokens[2].clone()),
        ["SAVEPOINT", _] => Statement::Savepoint(tokens[1].clone()),
        ["RELEASE", "SAVEPOINT", _] => Statement::ReleaseSavepoint(tokens[2].clone()),
        ["RELEASE", _] => Statement::ReleaseSavepoint(tokens[1].clone()),

        ["DROP", "INDEX", _] => Statement::DropIndex {
            name: tokens[2].to_lowercase(),
        },
        ["DROP", "INDEX", _, "ON", _] => Statement::DropIndex {
            name: tokens[2].to_lowercase(),
        },

        _ if kw.first() == Some(&"CREATE")
            && (kw.get(1) == Some(&"INDEX")
                || (matches!(kw.get(1), Some(&"UNIQUE") | Some(&"FULLTEXT"))
                    && kw.get(2) == Some(&"INDEX"))) =>
        {
            return parse_create_index(&tokens, &kw).map(Some);
        }

        _ => return Ok(None),
    };
    Ok(Some(stmt))
}

/// CREATE [UNIQUE|FULLTEXT] INDEX name ON table (col [, col]…).
fn parse_create_index(tokens: &[String], kw: &[&str]) -> Result<Statement> {
    let malformed = || EngineError::Parse("malformed CREATE INDEX statement".to_string());

    // Position of the INDEX keyword decides the declared kind.
    let (index_at, fulltext) = match kw {
        ["CREATE", "INDEX", ..] => (1, false),
        ["CREATE", "UNIQUE", "INDEX", ..] => (2, false),
        ["CREATE", "FULLTEXT", "INDEX", ..] => (2, true),
        _ => return Err(malformed()),
    };

    // name ON table
    let name = tokens.get(index_at + 1).ok_or_else(malformed)?;
    if kw.get(index_at + 2) != Some(&"ON") {
        return Err(malformed());
    }
    let table = tokens.get(index_at + 3).ok_or_else(malformed)?;

    // ( col [, col]… )
    if tokens.get(index_at + 4).map(String::as_str) != Some("(") {
        return Err(malformed());
    }
    let mut columns = Vec::new();
    let mut pos = index_at + 5;
    loop {
        match tokens.get(pos).map(String::as_str) {
            Some(")") => break,
            Some(",") => pos += 1,
            Some(col) => {
                columns.push(col.to_lowercase());
                pos += 1;
            }
            None => return Err(malformed()),
        }
    }
    if columns.is_empty() {
        return Err(malformed());
    }

    let kind = if fulltext {
        IndexKind::Fulltext
    } else if columns.len() > 1 {
        IndexKind::Composite
    } else {
        IndexKind::Hash
    };

    Ok(Statement::CreateIndex {
        name: name.to_lowercase(),
        table: table.to_lowercase(),
        columns,
        kind,
    })
}

/// Splits a statement into words and `( ) ,` punctuation, stripping
/// backtick quoting and the trailing semicolon.
fn tokenize(sql: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '`' => {
                for q in chars.by_ref() {
                    if q == '`' {
                        break;
                    }
                    current.push(q);
                }
            }
            '(' | ')' | ',' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            ';' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn must(sql: &str) -> Statement {
        preparse(sql).unwrap().expect("statement should pre-parse")
    }

    #[test]
    fn create_index_variants() {
        match must("CREATE INDEX ix_id ON users (id);") {
            Statement::CreateIndex { name, table, columns, kind } => {
                assert_eq!(name, "ix_id");
                assert_eq!(table, "users");
                assert_eq!(columns, vec!["id"]);
                assert_eq!(kind, IndexKind::Hash);
            }
            other => panic!("unexpected {other:?}"),
        }

        match must("create index ix on t (a, b)") {
            Statement::CreateIndex { columns, kind, .. } => {
                assert_eq!(columns, vec!["a", "b"]);
                assert_eq!(kind, IndexKind::Composite);
            }
            other => panic!("unexpected {other:?}"),
        }

        match must("CREATE FULLTEXT INDEX ft ON docs (body)") {
            Statement::CreateIndex { kind, .. } => assert_eq!(kind, IndexKind::Fulltext),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_create_index_is_a_parse_error() {
        assert!(preparse("CREATE INDEX broken ON t").is_err());
        assert!(preparse("CREATE INDEX ON t (a)").is_err());
    }

    #[test]
    fn transaction_family() {
        assert!(matches!(must("BEGIN"), Statement::Begin));
        assert!(matches!(must("start transaction;"), Statement::Begin));
        assert!(matches!(must("COMMIT;"), Statement::Commit));
        assert!(matches!(must("ROLLBACK"), Statement::Rollback));
        match must("ROLLBACK TO SAVEPOINT sp1") {
            Statement::RollbackToSavepoint(n) => assert_eq!(n, "sp1"),
            other => panic!("unexpected {other:?}"),
        }
        match must("RELEASE SAVEPOINT sp1") {
            Statement::ReleaseSavepoint(n) => assert_eq!(n, "sp1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn show_and_describe() {
        assert!(matches!(must("SHOW TABLES;"), Statement::ShowTables));
        match must("SHOW INDEX FROM `Users`") {
            Statement::ShowIndex { table } => assert_eq!(table, "users"),
            other => panic!("unexpected {other:?}"),
        }
        match must("DESCRIBE users") {
            Statement::Describe { table } => assert_eq!(table, "users"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn select_falls_through_to_the_ast_parser() {
        assert!(preparse("SELECT * FROM t").unwrap().is_none());
        assert!(preparse("INSERT INTO t VALUES (1)").unwrap().is_none());
    }

    #[test]
    fn truncate_with_and_without_table_keyword() {
        assert!(matches!(
            must("TRUNCATE TABLE t"),
            Statement::TruncateTable { .. }
        ));
        assert!(matches!(must("TRUNCATE t"), Statement::TruncateTable { .. }));
    }
}
