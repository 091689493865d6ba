//! Engine error types.

/// Errors produced by any layer of the engine.
///
/// Every variant maps to one error category; the category is always
/// recoverable from the rendered message prefix.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The external SQL parser rejected the statement text.
    #[error("parse error: {0}")]
    Parse(String),

    /// Catalog shape errors: missing or duplicate tables, columns, indexes.
    #[error("schema error: {0}")]
    Schema(String),

    /// A value could not be coerced to a column's declared kind.
    #[error("invalid type for column {column}: expected {expected}, got {actual}")]
    Type {
        /// The column whose declared kind rejected the value.
        column: String,
        /// Display name of the declared kind.
        expected: String,
        /// Description of the offending value.
        actual: String,
    },

    /// A declarative constraint (NOT NULL, UNIQUE, PRIMARY KEY, FOREIGN KEY)
    /// rejected a mutation.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The query shape is invalid (aggregate mixing, subquery arity,
    /// UNION column counts).
    #[error("query error: {0}")]
    Query(String),

    /// Transaction control was used outside a valid transaction state.
    #[error("transaction error: {0}")]
    Txn(String),

    /// Recognized SQL the engine deliberately does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Catch-all for unexpected internal errors (poisoned locks).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`EngineError::Schema`] with the given message.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Creates a [`EngineError::Schema`] for a missing table.
    pub fn table_not_found(name: impl AsRef<str>) -> Self {
        Self::Schema(format!("table {} does not exist", name.as_ref()))
    }

    /// Creates a [`EngineError::Schema`] for a missing column.
    pub fn column_not_found(name: impl AsRef<str>) -> Self {
        Self::Schema(format!("column {} does not exist", name.as_ref()))
    }

    /// Creates a [`EngineError::Type`] for a column/kind/value mismatch.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Type {
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a [`EngineError::Constraint`] with the given message.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint(message.into())
    }

    /// Creates a [`EngineError::Query`] with the given message.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Creates a [`EngineError::Txn`] with the given message.
    pub fn txn(message: impl Into<String>) -> Self {
        Self::Txn(message.into())
    }

    /// Creates a [`EngineError::Unsupported`] with the given message.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Creates a [`EngineError::Internal`] with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is a schema error.
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Returns `true` if this is a constraint violation.
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }

    /// Returns `true` if this is a type error.
    pub fn is_type(&self) -> bool {
        matches!(self, Self::Type { .. })
    }

    /// Returns `true` if this is a transaction-state error.
    pub fn is_txn(&self) -> bool {
        matches!(self, Self::Txn(_))
    }
}
