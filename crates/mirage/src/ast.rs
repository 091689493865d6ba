//! The engine's internal statement and expression trees.
//!
//! The external parser's AST is lowered into these tagged sums at the
//! boundary (`lower`); every executor and the evaluator dispatch on them,
//! so the rest of the engine is independent of the parser's shape.

use mirage_core::{Column, ColumnKind, Value};
use mirage_storage::{ForeignKey, IndexKind};

/// One executable statement.
#[derive(Debug, Clone)]
pub enum Statement {
    /// CREATE TABLE with fully lowered column and constraint declarations.
    CreateTable {
        name: String,
        if_not_exists: bool,
        columns: Vec<Column>,
        foreign_keys: Vec<ForeignKey>,
    },
    /// ALTER TABLE with one or more column operations.
    AlterTable { name: String, operations: Vec<AlterOp> },
    /// DROP TABLE.
    DropTable { names: Vec<String>, if_exists: bool },
    /// TRUNCATE TABLE.
    TruncateTable { name: String },
    /// CREATE [UNIQUE|FULLTEXT] INDEX.
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        kind: IndexKind,
    },
    /// DROP INDEX.
    DropIndex { name: String },
    /// SHOW TABLES.
    ShowTables,
    /// SHOW INDEX FROM table.
    ShowIndex { table: String },
    /// DESCRIBE / SHOW COLUMNS FROM table.
    Describe { table: String },
    /// SELECT (including UNION chains).
    Select(Box<Query>),
    /// INSERT from literal rows or a SELECT.
    Insert {
        table: String,
        columns: Vec<String>,
        source: InsertSource,
        on_duplicate: Vec<(String, Expr)>,
    },
    /// UPDATE with SET assignments.
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    /// DELETE.
    Delete { table: String, filter: Option<Expr> },
    /// BEGIN / START TRANSACTION.
    Begin,
    /// COMMIT.
    Commit,
    /// ROLLBACK.
    Rollback,
    /// SAVEPOINT name.
    Savepoint(String),
    /// ROLLBACK TO [SAVEPOINT] name.
    RollbackToSavepoint(String),
    /// RELEASE [SAVEPOINT] name.
    ReleaseSavepoint(String),
}

/// One ALTER TABLE operation.
#[derive(Debug, Clone)]
pub enum AlterOp {
    /// ADD COLUMN: appends the column, backfilling existing rows.
    AddColumn(Column),
    /// DROP COLUMN: removes it from the schema and every row.
    DropColumn(String),
    /// MODIFY COLUMN: replaces the declaration, coercing stored values.
    ModifyColumn(Column),
    /// CHANGE COLUMN: MODIFY plus rename.
    ChangeColumn { old_name: String, column: Column },
}

/// The row source of an INSERT.
#[derive(Debug, Clone)]
pub enum InsertSource {
    /// Literal VALUES tuples.
    Values(Vec<Vec<Expr>>),
    /// INSERT … SELECT.
    Select(Box<Query>),
}

/// A query: a select body plus an optional LIMIT applied to its output.
#[derive(Debug, Clone)]
pub struct Query {
    pub body: QueryBody,
    pub limit: Option<Limit>,
}

/// The body of a query.
#[derive(Debug, Clone)]
pub enum QueryBody {
    Select(SelectQuery),
    /// UNION / UNION ALL of two arms.
    Union {
        left: Box<Query>,
        right: Box<Query>,
        all: bool,
    },
}

/// A plain SELECT block.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub from: Option<FromClause>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

/// One projected expression with its optional alias.
#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// The FROM clause: a first relation plus any number of join steps.
/// Comma-separated relations lower into CROSS join steps.
#[derive(Debug, Clone)]
pub struct FromClause {
    pub first: TableRef,
    pub joins: Vec<JoinStep>,
}

/// One joined relation.
#[derive(Debug, Clone)]
pub struct JoinStep {
    pub relation: TableRef,
    pub kind: JoinKind,
    pub on: Option<Expr>,
}

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

/// A relation in FROM: a named table or a materialized subquery.
#[derive(Debug, Clone)]
pub enum TableRef {
    Table { name: String, alias: Option<String> },
    Subquery { query: Box<Query>, alias: String },
}

impl TableRef {
    /// The name the relation exposes to column qualifiers.
    pub fn exposed_name(&self) -> &str {
        match self {
            TableRef::Table { name, alias } => alias.as_deref().unwrap_or(name),
            TableRef::Subquery { alias, .. } => alias,
        }
    }
}

/// LIMIT `[offset, count]`.
#[derive(Debug, Clone, Copy)]
pub struct Limit {
    pub offset: usize,
    pub count: usize,
}

/// An expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A column reference, optionally qualified by table name or alias.
    Column {
        qualifier: Option<String>,
        name: String,
    },
    /// `*` or `t.*`; only meaningful in projections and COUNT(*).
    Wildcard { qualifier: Option<String> },
    /// Binary operator application.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Unary operator application.
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// IS NULL / IS NOT NULL.
    IsNull { expr: Box<Expr>, negated: bool },
    /// BETWEEN low AND high.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// IN (list) / NOT IN (list).
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// IN (subquery) / NOT IN (subquery).
    InSubquery {
        expr: Box<Expr>,
        query: Box<Query>,
        negated: bool,
    },
    /// LIKE / NOT LIKE with `%` and `_`.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// REGEXP / NOT REGEXP.
    Regexp {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// Simple (`CASE x WHEN v`) or searched (`CASE WHEN cond`) CASE.
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        else_result: Option<Box<Expr>>,
    },
    /// CAST(x AS T) and CONVERT(x, T).
    Cast { expr: Box<Expr>, kind: ColumnKind },
    /// Scalar or aggregate function call.
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    /// EXISTS / NOT EXISTS.
    Exists { query: Box<Query>, negated: bool },
    /// Scalar subquery.
    Subquery(Box<Query>),
    /// `VALUES(col)` inside ON DUPLICATE KEY UPDATE: the value the failed
    /// insert would have written to `col`.
    InsertValues(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    /// SQL rendering, used for inferred projection names.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    /// Returns `true` for `+ - * / %`.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

impl Expr {
    /// The column name a projection of this expression gets when no alias
    /// is given: the column name itself, a function-call rendering,
    /// `(L op R)` for operators, or the literal's text.
    pub fn label(&self) -> String {
        match self {
            Expr::Column { name, .. } => name.clone(),
            Expr::Wildcard { .. } => "*".to_string(),
            Expr::Literal(v) => v.to_string(),
            Expr::Function { name, args, distinct } => {
                let rendered: Vec<String> = args.iter().map(|a| a.label()).collect();
                if *distinct {
                    format!("{}(DISTINCT {})", name, rendered.join(", "))
                } else {
                    format!("{}({})", name, rendered.join(", "))
                }
            }
            Expr::Binary { left, op, right } => {
                format!("({} {} {})", left.label(), op.symbol(), right.label())
            }
            Expr::Unary { op, expr } => match op {
                UnaryOp::Plus => expr.label(),
                UnaryOp::Minus => format!("-{}", expr.label()),
                UnaryOp::Not => format!("NOT {}", expr.label()),
            },
            Expr::Cast { expr, kind } => format!("CAST({} AS {})", expr.label(), kind),
            Expr::Case { .. } => "CASE".to_string(),
            Expr::Subquery(_) => "subquery".to_string(),
            Expr::InsertValues(col) => format!("VALUES({col})"),
            _ => "expr".to_string(),
        }
    }

    /// Returns `true` if the tree contains an aggregate function call.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Function { name, args, .. } => {
                is_aggregate_name(name) || args.iter().any(Expr::contains_aggregate)
            }
            Expr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Unary { expr, .. } => expr.contains_aggregate(),
            Expr::IsNull { expr, .. } => expr.contains_aggregate(),
            Expr::Between { expr, low, high, .. } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
            Expr::InList { expr, list, .. } => {
                expr.contains_aggregate() || list.iter().any(Expr::contains_aggregate)
            }
            // Subquery bodies compute their own aggregates; only the
            // probe expression belongs to this scope.
            Expr::InSubquery { expr, .. } => expr.contains_aggregate(),
            Expr::Like { expr, pattern, .. } | Expr::Regexp { expr, pattern, .. } => {
                expr.contains_aggregate() || pattern.contains_aggregate()
            }
            Expr::Case { operand, branches, else_result } => {
                operand.as_deref().is_some_and(Expr::contains_aggregate)
                    || branches
                        .iter()
                        .any(|(w, t)| w.contains_aggregate() || t.contains_aggregate())
                    || else_result.as_deref().is_some_and(Expr::contains_aggregate)
            }
            Expr::Cast { expr, .. } => expr.contains_aggregate(),
            _ => false,
        }
    }
}

/// Returns `true` for the aggregate function names.
pub fn is_aggregate_name(name: &str) -> bool {
    matches!(
        name.to_uppercase().as_str(),
        "COUNT" | "SUM" | "AVG" | "MIN" | "MAX"
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn col(name: &str) -> Expr {
        Expr::Column { qualifier: None, name: name.to_string() }
    }

    #[test]
    fn labels_render_like_sql() {
        assert_eq!(col("a").label(), "a");
        let sum = Expr::Function {
            name: "SUM".into(),
            args: vec![col("b")],
            distinct: false,
        };
        assert_eq!(sum.label(), "SUM(b)");
        let add = Expr::Binary {
            left: Box::new(col("a")),
            op: BinaryOp::Add,
            right: Box::new(Expr::Literal(Value::Integer(1))),
        };
        assert_eq!(add.label(), "(a + 1)");
    }

    #[test]
    fn aggregate_detection_descends() {
        let nested = Expr::Binary {
            left: Box::new(Expr::Function {
                name: "count".into(),
                args: vec![Expr::Wildcard { qualifier: None }],
                distinct: false,
            }),
            op: BinaryOp::Add,
            right: Box::new(Expr::Literal(Value::Integer(1))),
        };
        assert!(nested.contains_aggregate());
        assert!(!col("a").contains_aggregate());
    }
}
