//! An in-memory, MySQL-compatible relational engine.
//!
//! One entry point: [`Engine::execute`] takes a SQL string and returns a
//! [`QueryResult`]. The engine covers schema management, DML, relational
//! query processing with joins/aggregates/subqueries, hash secondary
//! indexes, declarative constraints, and nested savepoint-capable
//! transactions with full-snapshot rollback. Parsing is delegated to an
//! external MySQL-dialect parser at a single boundary module.
//!
//! ```
//! use mirage::{Engine, QueryResult};
//!
//! let engine = Engine::new();
//! engine.execute("CREATE TABLE u (id INT PRIMARY KEY, n VARCHAR(10))").unwrap();
//! engine.execute("INSERT INTO u VALUES (1, 'A'), (2, 'B')").unwrap();
//! let result = engine.execute("SELECT n FROM u WHERE id > 1").unwrap();
//! let QueryResult::Set(set) = result else { panic!() };
//! assert_eq!(set.columns, vec!["n"]);
//! ```

pub mod ast;
pub mod engine;
pub mod eval;
pub mod exec;
pub mod lower;
pub mod preparse;
pub mod record;
pub mod result;
pub mod txn;

// Re-exports for convenience.
pub use engine::Engine;
pub use mirage_core::{EngineError, Result, Value};
pub use result::{QueryResult, ResultSet};
