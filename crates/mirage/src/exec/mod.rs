//! Statement executors.

pub mod ddl;
pub mod delete;
pub mod insert;
pub mod select;
pub mod show;
pub mod update;

use crate::ast::{Expr, FromClause, Query, QueryBody, TableRef};

/// Returns `true` if the expression contains a subquery touching `table`.
/// UPDATE and DELETE refuse such filters up front: the executor holds the
/// target's write lock, so a nested read of the same table would
/// self-deadlock.
pub fn expr_references_table(expr: &Expr, table: &str) -> bool {
    match expr {
        Expr::Binary { left, right, .. } => {
            expr_references_table(left, table) || expr_references_table(right, table)
        }
        Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => {
            expr_references_table(expr, table)
        }
        Expr::Between { expr, low, high, .. } => {
            expr_references_table(expr, table)
                || expr_references_table(low, table)
                || expr_references_table(high, table)
        }
        Expr::InList { expr, list, .. } => {
            expr_references_table(expr, table)
                || list.iter().any(|e| expr_references_table(e, table))
        }
        Expr::InSubquery { expr, query, .. } => {
            expr_references_table(expr, table) || query_references_table(query, table)
        }
        Expr::Like { expr, pattern, .. } | Expr::Regexp { expr, pattern, .. } => {
            expr_references_table(expr, table) || expr_references_table(pattern, table)
        }
        Expr::Case { operand, branches, else_result } => {
            operand
                .as_deref()
                .is_some_and(|o| expr_references_table(o, table))
                || branches.iter().any(|(w, t)| {
                    expr_references_table(w, table) || expr_references_table(t, table)
                })
                || else_result
                    .as_deref()
                    .is_some_and(|e| expr_references_table(e, table))
        }
        Expr::Function { args, .. } => args.iter().any(|a| expr_references_table(a, table)),
        Expr::Exists { query, .. } => query_references_table(query, table),
        Expr::Subquery(query) => query_references_table(query, table),
        _ => false,
    }
}

/// Returns `true` if the query's FROM tree or any nested expression
/// touches `table`.
pub fn query_references_table(query: &Query, table: &str) -> bool {
    match &query.body {
        QueryBody::Select(select) => {
            if select
                .from
                .as_ref()
                .is_some_and(|f| from_references_table(f, table))
            {
                return true;
            }
            select
                .projection
                .iter()
                .map(|i| &i.expr)
                .chain(select.filter.iter())
                .chain(select.group_by.iter())
                .chain(select.having.iter())
                .any(|e| expr_references_table(e, table))
        }
        QueryBody::Union { left, right, .. } => {
            query_references_table(left, table) || query_references_table(right, table)
        }
    }
}

fn from_references_table(from: &FromClause, table: &str) -> bool {
    let hits = |r: &TableRef| match r {
        TableRef::Table { name, .. } => name.eq_ignore_ascii_case(table),
        TableRef::Subquery { query, .. } => query_references_table(query, table),
    };
    hits(&from.first) || from.joins.iter().any(|j| hits(&j.relation))
}
