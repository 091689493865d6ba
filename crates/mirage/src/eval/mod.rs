//! The expression evaluator.
//!
//! One evaluator serves all four contexts (single-table row, join row,
//! correlated outer+inner, aggregate group). The context is entirely
//! captured by the [`Env`]: a column layout, the current row, and an
//! optional outer environment for correlated subqueries. Aggregate
//! folding over groups lives with the SELECT executor; evaluating an
//! aggregate call here is an error.

pub mod aggregate;
pub mod functions;
pub mod pattern;

use mirage_core::{EngineError, Result, Value, coerce};
use mirage_storage::Database;

use crate::ast::{self, BinaryOp, Expr, UnaryOp};
use crate::exec::select;

/// One resolvable column of the current scope.
#[derive(Debug, Clone)]
pub struct EnvColumn {
    /// Exposing relation (table name, alias, or subquery alias), lowercased.
    pub qualifier: Option<String>,
    /// Column name as declared.
    pub name: String,
}

/// The variable environment of one evaluation.
pub struct Env<'a> {
    pub catalog: &'a Database,
    pub columns: &'a [EnvColumn],
    pub row: &'a [Value],
    /// Enclosing row context for correlated subqueries.
    pub outer: Option<&'a Env<'a>>,
    /// The would-be-inserted row backing `VALUES(col)` in
    /// ON DUPLICATE KEY UPDATE.
    pub pending: Option<&'a [Value]>,
}

impl<'a> Env<'a> {
    /// An environment with no columns in scope (FROM-less SELECT,
    /// top-level constant folding).
    pub fn bare(catalog: &'a Database) -> Self {
        Env {
            catalog,
            columns: &[],
            row: &[],
            outer: None,
            pending: None,
        }
    }

    /// A row environment over the given column layout.
    pub fn row(catalog: &'a Database, columns: &'a [EnvColumn], row: &'a [Value]) -> Self {
        Env {
            catalog,
            columns,
            row,
            outer: None,
            pending: None,
        }
    }

    /// The same row environment, linked to an enclosing one.
    pub fn correlated(
        catalog: &'a Database,
        columns: &'a [EnvColumn],
        row: &'a [Value],
        outer: &'a Env<'a>,
    ) -> Self {
        Env {
            catalog,
            columns,
            row,
            outer: Some(outer),
            pending: None,
        }
    }

    /// Resolves a column reference, inner scope first, then outward
    /// through the correlation chain.
    pub fn resolve(&self, qualifier: Option<&str>, name: &str) -> Result<Value> {
        if let Some(position) = self.find_local(qualifier, name)? {
            return Ok(self.row[position].clone());
        }
        if let Some(outer) = self.outer {
            return outer.resolve(qualifier, name);
        }
        match qualifier {
            Some(q) => Err(EngineError::column_not_found(format!("{q}.{name}"))),
            None => Err(EngineError::column_not_found(name)),
        }
    }

    /// Position of a column in the local scope. Unqualified names must
    /// match exactly one column.
    pub fn find_local(&self, qualifier: Option<&str>, name: &str) -> Result<Option<usize>> {
        let mut found = None;
        for (position, col) in self.columns.iter().enumerate() {
            if !col.name.eq_ignore_ascii_case(name) {
                continue;
            }
            let qualifier_matches = match qualifier {
                Some(q) => col
                    .qualifier
                    .as_deref()
                    .is_some_and(|cq| cq.eq_ignore_ascii_case(q)),
                None => true,
            };
            if !qualifier_matches {
                continue;
            }
            if found.is_some() {
                return Err(EngineError::query(format!("ambiguous column {name}")));
            }
            found = Some(position);
        }
        Ok(found)
    }
}

/// Builds the column layout a single table exposes under `exposed` (its
/// name or alias).
pub fn table_layout(exposed: &str, columns: &[mirage_core::Column]) -> Vec<EnvColumn> {
    columns
        .iter()
        .map(|c| EnvColumn {
            qualifier: Some(exposed.to_lowercase()),
            name: c.name.clone(),
        })
        .collect()
}

/// Evaluates an expression in the given environment.
pub fn eval(expr: &Expr, env: &Env) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Column { qualifier, name } => env.resolve(qualifier.as_deref(), name),

        Expr::Wildcard { .. } => Err(EngineError::query("misplaced *")),

        Expr::Binary { left, op, right } => eval_binary(left, *op, right, env),

        Expr::Unary { op, expr } => {
            let value = eval(expr, env)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Minus => match value {
                    Value::Null => Value::Null,
                    Value::Integer(i) => Value::Integer(-i),
                    other => other.as_number().map(|n| Value::Float(-n)).unwrap_or(Value::Null),
                },
                UnaryOp::Not => Value::Bool(!value.is_truthy()),
            })
        }

        Expr::IsNull { expr, negated } => {
            let value = eval(expr, env)?;
            Ok(Value::Bool(value.is_null() != *negated))
        }

        Expr::Between { expr, low, high, negated } => {
            let value = eval(expr, env)?;
            let low = eval(low, env)?;
            let high = eval(high, env)?;
            if value.is_null() || low.is_null() || high.is_null() {
                return Ok(Value::Bool(false));
            }
            let inside = value.compare(&low).is_ge() && value.compare(&high).is_le();
            Ok(Value::Bool(inside != *negated))
        }

        Expr::InList { expr, list, negated } => {
            let value = eval(expr, env)?;
            if value.is_null() {
                return Ok(Value::Bool(false));
            }
            let mut found = false;
            for candidate in list {
                if value.same_as(&eval(candidate, env)?) {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }

        Expr::InSubquery { expr, query, negated } => {
            let value = eval(expr, env)?;
            if value.is_null() {
                return Ok(Value::Bool(false));
            }
            let result = select::execute_query(env.catalog, query, Some(env))?;
            if result.columns.len() != 1 {
                return Err(EngineError::query(
                    "IN subquery must return exactly one column",
                ));
            }
            let found = result.rows.iter().any(|row| value.same_as(&row[0]));
            Ok(Value::Bool(found != *negated))
        }

        Expr::Like { expr, pattern, negated } => {
            let value = eval(expr, env)?;
            let pattern = eval(pattern, env)?;
            if value.is_null() || pattern.is_null() {
                return Ok(Value::Bool(false));
            }
            let re = pattern::compile_like(&pattern.to_string())?;
            Ok(Value::Bool(re.is_match(&value.to_string()) != *negated))
        }

        Expr::Regexp { expr, pattern, negated } => {
            let value = eval(expr, env)?;
            let pattern = eval(pattern, env)?;
            if value.is_null() || pattern.is_null() {
                return Ok(Value::Bool(false));
            }
            let re = pattern::compile_regexp(&pattern.to_string())?;
            Ok(Value::Bool(re.is_match(&value.to_string()) != *negated))
        }

        Expr::Case { operand, branches, else_result } => {
            match operand {
                // Simple CASE: compare the operand with each WHEN value.
                Some(operand) => {
                    let subject = eval(operand, env)?;
                    for (when, then) in branches {
                        if subject.same_as(&eval(when, env)?) {
                            return eval(then, env);
                        }
                    }
                }
                // Searched CASE: first truthy WHEN wins.
                None => {
                    for (when, then) in branches {
                        if eval(when, env)?.is_truthy() {
                            return eval(then, env);
                        }
                    }
                }
            }
            match else_result {
                Some(fallback) => eval(fallback, env),
                None => Ok(Value::Null),
            }
        }

        Expr::Cast { expr, kind } => {
            let value = eval(expr, env)?;
            coerce(&value, kind, &expr.label())
        }

        Expr::Function { name, args, distinct: _ } => {
            if ast::is_aggregate_name(name) {
                return Err(EngineError::query(format!(
                    "aggregate function {name} is not allowed in this context"
                )));
            }
            let values = args
                .iter()
                .map(|a| eval(a, env))
                .collect::<Result<Vec<_>>>()?;
            functions::call(name, &values)
        }

        Expr::Exists { query, negated } => {
            let result = select::execute_query(env.catalog, query, Some(env))?;
            Ok(Value::Bool(!result.rows.is_empty() != *negated))
        }

        Expr::Subquery(query) => {
            let result = select::execute_query(env.catalog, query, Some(env))?;
            if result.columns.len() != 1 {
                return Err(EngineError::query(
                    "scalar subquery must return exactly one column",
                ));
            }
            match result.rows.len() {
                0 => Ok(Value::Null),
                1 => Ok(result.rows[0][0].clone()),
                _ => Err(EngineError::query(
                    "scalar subquery returned more than one row",
                )),
            }
        }

        Expr::InsertValues(column) => {
            let pending = env.pending.ok_or_else(|| {
                EngineError::query("VALUES() is only valid in ON DUPLICATE KEY UPDATE")
            })?;
            let position = env
                .find_local(None, column)?
                .ok_or_else(|| EngineError::column_not_found(column))?;
            Ok(pending[position].clone())
        }
    }
}

/// Evaluates an expression as a row filter.
pub fn eval_predicate(expr: &Expr, env: &Env) -> Result<bool> {
    Ok(eval(expr, env)?.is_truthy())
}

fn eval_binary(left: &Expr, op: BinaryOp, right: &Expr, env: &Env) -> Result<Value> {
    // AND/OR short-circuit over truthiness.
    match op {
        BinaryOp::And => {
            if !eval(left, env)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval(right, env)?.is_truthy()));
        }
        BinaryOp::Or => {
            if eval(left, env)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval(right, env)?.is_truthy()));
        }
        _ => {}
    }

    let lhs = eval(left, env)?;
    let rhs = eval(right, env)?;

    if op.is_arithmetic() {
        return Ok(arithmetic(op, &lhs, &rhs));
    }

    // Three-valued comparison collapses to false on NULL.
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Bool(false));
    }
    let ordering = lhs.compare(&rhs);
    let outcome = match op {
        BinaryOp::Eq => ordering.is_eq(),
        BinaryOp::NotEq => ordering.is_ne(),
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::LtEq => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::GtEq => ordering.is_ge(),
        _ => false,
    };
    Ok(Value::Bool(outcome))
}

/// NULL-propagating arithmetic; divide and modulo by zero yield NULL.
/// Integer pairs stay integral except under `/`.
fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) else {
        return Value::Null;
    };

    if let (Value::Integer(x), Value::Integer(y)) = (lhs, rhs) {
        let integral = match op {
            BinaryOp::Add => x.checked_add(*y),
            BinaryOp::Subtract => x.checked_sub(*y),
            BinaryOp::Multiply => x.checked_mul(*y),
            BinaryOp::Modulo => {
                if *y == 0 {
                    return Value::Null;
                }
                x.checked_rem(*y)
            }
            _ => None,
        };
        if let Some(result) = integral {
            return Value::Integer(result);
        }
    }

    match op {
        BinaryOp::Add => Value::Float(a + b),
        BinaryOp::Subtract => Value::Float(a - b),
        BinaryOp::Multiply => Value::Float(a * b),
        BinaryOp::Divide => {
            if b == 0.0 {
                Value::Null
            } else {
                Value::Float(a / b)
            }
        }
        BinaryOp::Modulo => {
            if b == 0.0 {
                Value::Null
            } else {
                Value::Float(a % b)
            }
        }
        _ => Value::Null,
    }
}
