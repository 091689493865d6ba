//! The SELECT executor.
//!
//! Pipeline: resolve FROM (table, materialized subquery, or join tree),
//! branch to the aggregate pipeline when aggregates or GROUP BY are
//! present, obtain rows (hash-index fast path for simple equality
//! filters), filter, project, dedupe for DISTINCT/UNION, LIMIT last.

use std::collections::{HashMap, HashSet};

use mirage_core::{EngineError, Result, Value};
use mirage_storage::{Database, read_guard};

use crate::ast::{
    BinaryOp, Expr, JoinKind, JoinStep, Limit, Query, QueryBody, SelectItem, SelectQuery,
    TableRef, is_aggregate_name,
};
use crate::eval::{Env, EnvColumn, aggregate, eval, eval_predicate, table_layout};
use crate::result::ResultSet;

/// A materialized row source: the column layout plus the candidate rows.
struct Source {
    layout: Vec<EnvColumn>,
    rows: Vec<Vec<Value>>,
    /// Joined sources expose `alias.column` output names for wildcards.
    joined: bool,
}

/// Executes a query (possibly a UNION chain) and applies its LIMIT.
pub fn execute_query(
    catalog: &Database,
    query: &Query,
    outer: Option<&Env<'_>>,
) -> Result<ResultSet> {
    let mut result = match &query.body {
        QueryBody::Select(select) => execute_select(catalog, select, outer)?,
        QueryBody::Union { left, right, all } => {
            let left = execute_query(catalog, left, outer)?;
            let right = execute_query(catalog, right, outer)?;
            if left.columns.len() != right.columns.len() {
                return Err(EngineError::query(format!(
                    "UNION arm has {} columns, expected {}",
                    right.columns.len(),
                    left.columns.len()
                )));
            }
            let mut rows = left.rows;
            rows.extend(right.rows);
            ResultSet {
                columns: left.columns,
                rows: if *all { rows } else { dedupe_rows(rows) },
            }
        }
    };
    if let Some(limit) = query.limit {
        result.rows = apply_limit(result.rows, limit);
    }
    Ok(result)
}

fn execute_select(
    catalog: &Database,
    select: &SelectQuery,
    outer: Option<&Env<'_>>,
) -> Result<ResultSet> {
    let source = resolve_from(catalog, select)?;

    // HAVING always evaluates against buckets, so its mere presence
    // selects the aggregate pipeline.
    let aggregated = !select.group_by.is_empty()
        || select.having.is_some()
        || select
            .projection
            .iter()
            .any(|item| item.expr.contains_aggregate());
    if aggregated {
        return aggregate_select(catalog, select, &source, outer);
    }

    let columns = projection_columns(&select.projection, &source)?;
    let mut rows = Vec::new();
    for row in &source.rows {
        let env = scoped(catalog, &source.layout, row, outer);
        if let Some(filter) = &select.filter {
            if !eval_predicate(filter, &env)? {
                continue;
            }
        }
        rows.push(project_row(&select.projection, &source, row, &env)?);
    }
    if select.distinct {
        rows = dedupe_rows(rows);
    }
    Ok(ResultSet { columns, rows })
}

fn scoped<'a>(
    catalog: &'a Database,
    layout: &'a [EnvColumn],
    row: &'a [Value],
    outer: Option<&'a Env<'a>>,
) -> Env<'a> {
    Env {
        catalog,
        columns: layout,
        row,
        outer,
        pending: None,
    }
}

// ---------------------------------------------------------------------------
// FROM resolution
// ---------------------------------------------------------------------------

fn resolve_from(catalog: &Database, select: &SelectQuery) -> Result<Source> {
    let Some(from) = &select.from else {
        // FROM-less SELECT evaluates its projection once.
        return Ok(Source {
            layout: Vec::new(),
            rows: vec![Vec::new()],
            joined: false,
        });
    };

    // Hash-index fast path: single table, simple `col = literal` filter.
    if from.joins.is_empty() {
        if let TableRef::Table { name, alias } = &from.first {
            let exposed = alias.as_deref().unwrap_or(name);
            if let Some(source) =
                index_scan(catalog, name, exposed, select.filter.as_ref())?
            {
                return Ok(source);
            }
        }
    }

    let (mut layout, mut rows) = resolve_table_ref(catalog, &from.first)?;
    let joined = !from.joins.is_empty();
    for step in &from.joins {
        (layout, rows) = join_step(catalog, layout, rows, step)?;
    }
    Ok(Source { layout, rows, joined })
}

fn resolve_table_ref(
    catalog: &Database,
    relation: &TableRef,
) -> Result<(Vec<EnvColumn>, Vec<Vec<Value>>)> {
    match relation {
        TableRef::Table { name, alias } => {
            let handle = catalog.table(name)?;
            let guard = read_guard(&handle)?;
            let exposed = alias.as_deref().unwrap_or(name);
            Ok((table_layout(exposed, &guard.columns), guard.rows.clone()))
        }
        TableRef::Subquery { query, alias } => {
            // FROM-clause subqueries are evaluated eagerly and exposed as
            // a virtual table under their alias.
            let result = execute_query(catalog, query, None)?;
            let layout = result
                .columns
                .iter()
                .map(|name| EnvColumn {
                    qualifier: Some(alias.clone()),
                    name: name.clone(),
                })
                .collect();
            Ok((layout, result.rows))
        }
    }
}

/// Serves a simple equality filter from a HASH index, when one exists on
/// the filtered column. The WHERE clause still runs afterwards, so key
/// normalization can only over-approximate, never change results.
fn index_scan(
    catalog: &Database,
    table: &str,
    exposed: &str,
    filter: Option<&Expr>,
) -> Result<Option<Source>> {
    let Some((column, probe)) = equality_probe(filter, exposed) else {
        return Ok(None);
    };
    let Some(index) = catalog.indexes().hash_index_on(table, column)? else {
        return Ok(None);
    };

    let handle = catalog.table(table)?;
    let guard = read_guard(&handle)?;
    let positions = read_guard(&index)?.lookup(probe);
    catalog.indexes().record_hit();
    tracing::trace!(table, column, hits = positions.len(), "index-served lookup");

    let rows = positions
        .iter()
        .filter_map(|p| guard.rows.get(*p).cloned())
        .collect();
    Ok(Some(Source {
        layout: table_layout(exposed, &guard.columns),
        rows,
        joined: false,
    }))
}

/// Extracts `col = literal` (either side) from a WHERE clause.
fn equality_probe<'e>(filter: Option<&'e Expr>, exposed: &str) -> Option<(&'e str, &'e Value)> {
    let Some(Expr::Binary { left, op: BinaryOp::Eq, right }) = filter else {
        return None;
    };
    let qualifier_ok = |qualifier: &Option<String>| match qualifier {
        None => true,
        Some(q) => q.eq_ignore_ascii_case(exposed),
    };
    match (left.as_ref(), right.as_ref()) {
        (Expr::Column { qualifier, name }, Expr::Literal(v)) if qualifier_ok(qualifier) => {
            Some((name.as_str(), v))
        }
        (Expr::Literal(v), Expr::Column { qualifier, name }) if qualifier_ok(qualifier) => {
            Some((name.as_str(), v))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Joins
// ---------------------------------------------------------------------------

fn join_step(
    catalog: &Database,
    left_layout: Vec<EnvColumn>,
    left_rows: Vec<Vec<Value>>,
    step: &JoinStep,
) -> Result<(Vec<EnvColumn>, Vec<Vec<Value>>)> {
    let (right_layout, right_rows) = resolve_table_ref(catalog, &step.relation)?;
    let left_width = left_layout.len();
    let right_width = right_layout.len();

    let mut layout = left_layout;
    layout.extend(right_layout);

    let matches = |combined: &[Value]| -> Result<bool> {
        match &step.on {
            Some(on) => eval_predicate(on, &scoped(catalog, &layout, combined, None)),
            None => Ok(true),
        }
    };

    let mut rows = Vec::new();
    match step.kind {
        JoinKind::Inner | JoinKind::Cross => {
            for l in &left_rows {
                for r in &right_rows {
                    let combined = concat(l, r);
                    if matches(&combined)? {
                        rows.push(combined);
                    }
                }
            }
        }
        JoinKind::Left => {
            for l in &left_rows {
                let mut matched = false;
                for r in &right_rows {
                    let combined = concat(l, r);
                    if matches(&combined)? {
                        rows.push(combined);
                        matched = true;
                    }
                }
                if !matched {
                    rows.push(concat(l, &vec![Value::Null; right_width]));
                }
            }
        }
        JoinKind::Right => {
            for r in &right_rows {
                let mut matched = false;
                for l in &left_rows {
                    let combined = concat(l, r);
                    if matches(&combined)? {
                        rows.push(combined);
                        matched = true;
                    }
                }
                if !matched {
                    rows.push(concat(&vec![Value::Null; left_width], r));
                }
            }
        }
    }
    Ok((layout, rows))
}

fn concat(left: &[Value], right: &[Value]) -> Vec<Value> {
    let mut row = Vec::with_capacity(left.len() + right.len());
    row.extend_from_slice(left);
    row.extend_from_slice(right);
    row
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

fn projection_columns(projection: &[SelectItem], source: &Source) -> Result<Vec<String>> {
    let mut columns = Vec::new();
    for item in projection {
        match &item.expr {
            Expr::Wildcard { qualifier } => {
                for col in wildcard_columns(source, qualifier.as_deref())? {
                    columns.push(wildcard_label(source, col));
                }
            }
            expr => columns.push(item.alias.clone().unwrap_or_else(|| expr.label())),
        }
    }
    Ok(columns)
}

fn project_row(
    projection: &[SelectItem],
    source: &Source,
    row: &[Value],
    env: &Env<'_>,
) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for item in projection {
        match &item.expr {
            Expr::Wildcard { qualifier } => {
                for position in wildcard_columns(source, qualifier.as_deref())? {
                    out.push(row[position].clone());
                }
            }
            expr => out.push(eval(expr, env)?),
        }
    }
    Ok(out)
}

/// Positions selected by `*` or `alias.*`.
fn wildcard_columns(source: &Source, qualifier: Option<&str>) -> Result<Vec<usize>> {
    match qualifier {
        None => Ok((0..source.layout.len()).collect()),
        Some(q) => {
            let positions: Vec<usize> = source
                .layout
                .iter()
                .enumerate()
                .filter(|(_, col)| {
                    col.qualifier
                        .as_deref()
                        .is_some_and(|cq| cq.eq_ignore_ascii_case(q))
                })
                .map(|(i, _)| i)
                .collect();
            if positions.is_empty() {
                return Err(EngineError::query(format!("unknown table {q} in {q}.*")));
            }
            Ok(positions)
        }
    }
}

fn wildcard_label(source: &Source, position: usize) -> String {
    let col = &source.layout[position];
    if source.joined {
        match &col.qualifier {
            Some(q) => format!("{q}.{}", col.name),
            None => col.name.clone(),
        }
    } else {
        col.name.clone()
    }
}

// ---------------------------------------------------------------------------
// Aggregate pipeline
// ---------------------------------------------------------------------------

fn aggregate_select(
    catalog: &Database,
    select: &SelectQuery,
    source: &Source,
    outer: Option<&Env<'_>>,
) -> Result<ResultSet> {
    // (a) WHERE filters the input rows.
    let mut rows: Vec<&Vec<Value>> = Vec::new();
    for row in &source.rows {
        let env = scoped(catalog, &source.layout, row, outer);
        if let Some(filter) = &select.filter {
            if !eval_predicate(filter, &env)? {
                continue;
            }
        }
        rows.push(row);
    }

    // (b) Every non-aggregate projection must be a GROUP BY expression.
    let grouped = !select.group_by.is_empty();
    for item in &select.projection {
        if item.expr.contains_aggregate() {
            continue;
        }
        if matches!(item.expr, Expr::Wildcard { .. }) {
            return Err(EngineError::query(
                "cannot mix * with aggregate functions",
            ));
        }
        if !grouped {
            return Err(EngineError::query(
                "mixing aggregate and non-aggregate columns not supported without GROUP BY",
            ));
        }
        let covered = select
            .group_by
            .iter()
            .any(|g| g.label().eq_ignore_ascii_case(&item.expr.label()));
        if !covered {
            return Err(EngineError::query(format!(
                "column {} must appear in GROUP BY",
                item.expr.label()
            )));
        }
    }

    // (c) Bucket by the GROUP BY value tuple, preserving first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<&Vec<Value>>> = HashMap::new();
    if grouped {
        for row in rows {
            let env = scoped(catalog, &source.layout, row, outer);
            let mut key = String::new();
            for group_expr in &select.group_by {
                key.push_str(&eval(group_expr, &env)?.canonical_key());
                key.push('\u{1f}');
            }
            if !buckets.contains_key(&key) {
                order.push(key.clone());
            }
            buckets.entry(key).or_default().push(row);
        }
    } else {
        order.push(String::new());
        buckets.insert(String::new(), rows);
    }

    // (d) + (e) HAVING per bucket, then assemble one row per survivor.
    let columns = projection_columns(&select.projection, source)?;
    let empty_row: Vec<Value> = Vec::new();
    let mut out_rows = Vec::new();
    for key in &order {
        let members = &buckets[key];
        let representative: &[Value] =
            members.first().map_or(empty_row.as_slice(), |r| r.as_slice());
        let layout: &[EnvColumn] = if members.is_empty() {
            &[]
        } else {
            &source.layout
        };

        if let Some(having) = &select.having {
            let folded = fold_aggregates(having, members, &source.layout, catalog, outer)?;
            let env = scoped(catalog, layout, representative, outer);
            if !eval_predicate(&folded, &env)? {
                continue;
            }
        }

        let mut out = Vec::new();
        for item in &select.projection {
            let folded =
                fold_aggregates(&item.expr, members, &source.layout, catalog, outer)?;
            let env = scoped(catalog, layout, representative, outer);
            out.push(eval(&folded, &env)?);
        }
        out_rows.push(out);
    }

    Ok(ResultSet {
        columns,
        rows: out_rows,
    })
}

/// Replaces every aggregate call in the tree with the literal computed
/// over the group, leaving a row-evaluable expression behind.
fn fold_aggregates(
    expr: &Expr,
    members: &[&Vec<Value>],
    layout: &[EnvColumn],
    catalog: &Database,
    outer: Option<&Env<'_>>,
) -> Result<Expr> {
    let fold = |e: &Expr| fold_aggregates(e, members, layout, catalog, outer);
    Ok(match expr {
        Expr::Function { name, args, distinct } if is_aggregate_name(name) => {
            let star = args.is_empty() || matches!(args[0], Expr::Wildcard { .. });
            let values: Vec<Value> = if star {
                if !name.eq_ignore_ascii_case("COUNT") {
                    return Err(EngineError::query(format!("{name}(*) is not valid")));
                }
                vec![Value::Null; members.len()]
            } else {
                if args.len() != 1 {
                    return Err(EngineError::query(format!(
                        "{name} expects exactly one argument"
                    )));
                }
                members
                    .iter()
                    .map(|row| eval(&args[0], &scoped(catalog, layout, row, outer)))
                    .collect::<Result<Vec<_>>>()?
            };
            Expr::Literal(aggregate::compute(
                &name.to_uppercase(),
                *distinct,
                star,
                &values,
            )?)
        }

        Expr::Binary { left, op, right } => Expr::Binary {
            left: Box::new(fold(left)?),
            op: *op,
            right: Box::new(fold(right)?),
        },
        Expr::Unary { op, expr } => Expr::Unary {
            op: *op,
            expr: Box::new(fold(expr)?),
        },
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(fold(expr)?),
            negated: *negated,
        },
        Expr::Between { expr, low, high, negated } => Expr::Between {
            expr: Box::new(fold(expr)?),
            low: Box::new(fold(low)?),
            high: Box::new(fold(high)?),
            negated: *negated,
        },
        Expr::InList { expr, list, negated } => Expr::InList {
            expr: Box::new(fold(expr)?),
            list: list.iter().map(&fold).collect::<Result<Vec<_>>>()?,
            negated: *negated,
        },
        Expr::Case { operand, branches, else_result } => Expr::Case {
            operand: match operand {
                Some(o) => Some(Box::new(fold(o)?)),
                None => None,
            },
            branches: branches
                .iter()
                .map(|(w, t)| Ok((fold(w)?, fold(t)?)))
                .collect::<Result<Vec<_>>>()?,
            else_result: match else_result {
                Some(e) => Some(Box::new(fold(e)?)),
                None => None,
            },
        },
        Expr::Cast { expr, kind } => Expr::Cast {
            expr: Box::new(fold(expr)?),
            kind: kind.clone(),
        },
        Expr::Function { name, args, distinct } => Expr::Function {
            name: name.clone(),
            args: args.iter().map(&fold).collect::<Result<Vec<_>>>()?,
            distinct: *distinct,
        },

        other => other.clone(),
    })
}

// ---------------------------------------------------------------------------
// Output shaping
// ---------------------------------------------------------------------------

fn dedupe_rows(rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let key: String = row
            .iter()
            .map(Value::canonical_key)
            .collect::<Vec<_>>()
            .join("\u{1f}");
        if seen.insert(key) {
            out.push(row);
        }
    }
    out
}

fn apply_limit(rows: Vec<Vec<Value>>, limit: Limit) -> Vec<Vec<Value>> {
    rows.into_iter()
        .skip(limit.offset)
        .take(limit.count)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn limit_slices_and_survives_overrun() {
        let rows: Vec<Vec<Value>> = (0..5).map(|i| vec![Value::Integer(i)]).collect();
        let page = apply_limit(rows.clone(), Limit { offset: 1, count: 2 });
        assert_eq!(page, vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]);
        assert!(apply_limit(rows, Limit { offset: 9, count: 2 }).is_empty());
    }

    #[test]
    fn dedupe_preserves_first_occurrence_order() {
        let rows = vec![
            vec![Value::Integer(1)],
            vec![Value::Float(1.0)],
            vec![Value::Integer(2)],
            vec![Value::Integer(1)],
        ];
        let unique = dedupe_rows(rows);
        assert_eq!(unique, vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]);
    }

    #[test]
    fn equality_probe_matches_both_orientations() {
        let col = Expr::Column { qualifier: None, name: "id".into() };
        let lit = Expr::Literal(Value::Integer(2));
        let filter = Expr::Binary {
            left: Box::new(lit.clone()),
            op: BinaryOp::Eq,
            right: Box::new(col),
        };
        let probe = equality_probe(Some(&filter), "t").expect("probe");
        assert_eq!(probe.0, "id");

        let non_eq = Expr::Binary {
            left: Box::new(Expr::Column { qualifier: None, name: "id".into() }),
            op: BinaryOp::Gt,
            right: Box::new(lit),
        };
        assert!(equality_probe(Some(&non_eq), "t").is_none());
    }
}
