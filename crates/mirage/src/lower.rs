//! Lowering from the external parser's AST into the engine's own trees.
//!
//! This is the only module that touches `sqlparser` types. Statements are
//! parsed with the MySQL dialect and immediately converted; anything the
//! engine does not implement surfaces as an `Unsupported` error here, so
//! the executors only ever see shapes they understand.

use sqlparser::ast as ext;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use mirage_core::{
    Column, ColumnKind, ColumnReference, DefaultValue, EngineError, ReferentialAction, Result,
    Value,
};
use mirage_storage::ForeignKey;

use crate::ast::{
    AlterOp, BinaryOp, Expr, FromClause, InsertSource, JoinKind, JoinStep, Limit, Query,
    QueryBody, SelectItem, SelectQuery, Statement, TableRef, UnaryOp,
};

/// Parses one SQL statement and lowers it.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    let statements = Parser::parse_sql(&MySqlDialect {}, sql)
        .map_err(|e| EngineError::Parse(e.to_string()))?;
    let mut statements = statements.into_iter();
    let first = statements
        .next()
        .ok_or_else(|| EngineError::Parse("empty statement".to_string()))?;
    if statements.next().is_some() {
        return Err(EngineError::Parse(
            "expected a single statement".to_string(),
        ));
    }
    lower_statement(first)
}

fn lower_statement(stmt: ext::Statement) -> Result<Statement> {
    match stmt {
        ext::Statement::Query(query) => Ok(Statement::Select(Box::new(lower_query(*query)?))),

        ext::Statement::Insert(insert) => lower_insert(insert),

        ext::Statement::Update { table, assignments, selection, .. } => {
            if !table.joins.is_empty() {
                return Err(EngineError::unsupported("multi-table UPDATE"));
            }
            let name = match table.relation {
                ext::TableFactor::Table { name, .. } => object_name(&name),
                other => {
                    return Err(EngineError::unsupported(format!("UPDATE target {other}")));
                }
            };
            Ok(Statement::Update {
                table: name,
                assignments: lower_assignments(assignments)?,
                filter: selection.map(lower_expr).transpose()?,
            })
        }

        ext::Statement::Delete(delete) => {
            let from = match delete.from {
                ext::FromTable::WithFromKeyword(v) | ext::FromTable::WithoutKeyword(v) => v,
            };
            let [target] = from.as_slice() else {
                return Err(EngineError::unsupported("multi-table DELETE"));
            };
            if !target.joins.is_empty() {
                return Err(EngineError::unsupported("DELETE with joins"));
            }
            let name = match &target.relation {
                ext::TableFactor::Table { name, .. } => object_name(name),
                other => {
                    return Err(EngineError::unsupported(format!("DELETE target {other}")));
                }
            };
            Ok(Statement::Delete {
                table: name,
                filter: delete.selection.map(lower_expr).transpose()?,
            })
        }

        ext::Statement::CreateTable(create) => lower_create_table(create),

        ext::Statement::AlterTable { name, operations, .. } => {
            let operations = operations
                .into_iter()
                .map(lower_alter_op)
                .collect::<Result<Vec<_>>>()?;
            Ok(Statement::AlterTable {
                name: object_name(&name),
                operations,
            })
        }

        ext::Statement::Drop { object_type, if_exists, names, .. } => match object_type {
            ext::ObjectType::Table => Ok(Statement::DropTable {
                names: names.iter().map(object_name).collect(),
                if_exists,
            }),
            ext::ObjectType::Index => {
                let [name] = names.as_slice() else {
                    return Err(EngineError::unsupported("DROP INDEX with multiple names"));
                };
                Ok(Statement::DropIndex {
                    name: object_name(name),
                })
            }
            other => Err(EngineError::unsupported(format!("DROP {other}"))),
        },

        other => Err(EngineError::unsupported(format!("statement: {other}"))),
    }
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

fn lower_create_table(create: ext::CreateTable) -> Result<Statement> {
    let table_name = object_name(&create.name);
    let mut columns = Vec::with_capacity(create.columns.len());
    for def in create.columns {
        columns.push(lower_column_def(def)?);
    }

    let mut foreign_keys = Vec::new();
    for constraint in create.constraints {
        match constraint {
            ext::TableConstraint::PrimaryKey { columns: keys, .. } => {
                for key in &keys {
                    let col = find_column(&mut columns, &key.value)?;
                    col.primary = true;
                    col.not_null = true;
                }
            }
            ext::TableConstraint::Unique { columns: keys, .. } => {
                for key in &keys {
                    find_column(&mut columns, &key.value)?.unique = true;
                }
            }
            ext::TableConstraint::ForeignKey {
                columns: local,
                foreign_table,
                referred_columns,
                on_delete,
                on_update,
                ..
            } => {
                foreign_keys.push(ForeignKey {
                    columns: local.iter().map(|i| i.value.to_lowercase()).collect(),
                    ref_table: object_name(&foreign_table),
                    ref_columns: referred_columns
                        .iter()
                        .map(|i| i.value.to_lowercase())
                        .collect(),
                    on_delete: lower_referential_action(on_delete),
                    on_update: lower_referential_action(on_update),
                });
            }
            // Inline INDEX/KEY and CHECK declarations are tolerated and
            // ignored.
            _ => {}
        }
    }

    // Hoist inline REFERENCES clauses into the table-level list.
    for col in &mut columns {
        if let Some(reference) = col.references.take() {
            foreign_keys.push(ForeignKey {
                columns: vec![col.name.to_lowercase()],
                ref_table: reference.table.clone(),
                ref_columns: vec![reference.column.to_lowercase()],
                on_delete: reference.on_delete,
                on_update: reference.on_update,
            });
        }
    }

    Ok(Statement::CreateTable {
        name: table_name,
        if_not_exists: create.if_not_exists,
        columns,
        foreign_keys,
    })
}

fn find_column<'a>(columns: &'a mut [Column], name: &str) -> Result<&'a mut Column> {
    columns
        .iter_mut()
        .find(|c| c.is_named(name))
        .ok_or_else(|| EngineError::column_not_found(name))
}

fn lower_column_def(def: ext::ColumnDef) -> Result<Column> {
    let mut column = Column::new(def.name.value.clone(), lower_data_type(&def.data_type)?);
    for opt in def.options {
        apply_column_option(&mut column, opt.option)?;
    }
    column.validate()?;
    Ok(column)
}

fn apply_column_option(column: &mut Column, option: ext::ColumnOption) -> Result<()> {
    match option {
        ext::ColumnOption::Null => column.not_null = false,
        ext::ColumnOption::NotNull => column.not_null = true,
        ext::ColumnOption::Default(expr) => {
            column.default = Some(lower_default(expr, &column.name)?);
        }
        ext::ColumnOption::Unique { is_primary, .. } => {
            if is_primary {
                column.primary = true;
                column.not_null = true;
            } else {
                column.unique = true;
            }
        }
        ext::ColumnOption::ForeignKey {
            foreign_table,
            referred_columns,
            on_delete,
            on_update,
            ..
        } => {
            let referred = referred_columns
                .first()
                .map(|i| i.value.to_lowercase())
                .ok_or_else(|| {
                    EngineError::schema(format!(
                        "REFERENCES on column {} names no column",
                        column.name
                    ))
                })?;
            column.references = Some(ColumnReference {
                table: object_name(&foreign_table),
                column: referred,
                on_delete: lower_referential_action(on_delete),
                on_update: lower_referential_action(on_update),
            });
        }
        other => {
            // MySQL-specific options surface here; AUTO_INCREMENT and the
            // ON UPDATE trigger are recognized by spelling, the rest
            // (COMMENT, CHARACTER SET, …) are tolerated.
            let rendered = other.to_string().to_uppercase();
            if rendered == "AUTO_INCREMENT" {
                column.auto_increment = true;
            } else if rendered.starts_with("ON UPDATE CURRENT_TIMESTAMP") {
                column.on_update_current_timestamp = true;
            }
        }
    }
    Ok(())
}

fn lower_default(expr: ext::Expr, column: &str) -> Result<DefaultValue> {
    match lower_expr(expr)? {
        Expr::Literal(v) => Ok(DefaultValue::Literal(v)),
        Expr::Unary { op: UnaryOp::Minus, expr } => match *expr {
            Expr::Literal(Value::Integer(i)) => Ok(DefaultValue::Literal(Value::Integer(-i))),
            Expr::Literal(Value::Float(f)) => Ok(DefaultValue::Literal(Value::Float(-f))),
            _ => Err(EngineError::unsupported(format!(
                "non-literal default for column {column}"
            ))),
        },
        Expr::Function { name, .. } if name.eq_ignore_ascii_case("CURRENT_TIMESTAMP")
            || name.eq_ignore_ascii_case("NOW") =>
        {
            Ok(DefaultValue::CurrentTimestamp)
        }
        _ => Err(EngineError::unsupported(format!(
            "non-literal default for column {column}"
        ))),
    }
}

fn lower_referential_action(action: Option<ext::ReferentialAction>) -> ReferentialAction {
    match action {
        Some(ext::ReferentialAction::Restrict) => ReferentialAction::Restrict,
        Some(ext::ReferentialAction::Cascade) => ReferentialAction::Cascade,
        Some(ext::ReferentialAction::SetNull) => ReferentialAction::SetNull,
        Some(ext::ReferentialAction::SetDefault) => ReferentialAction::SetDefault,
        Some(ext::ReferentialAction::NoAction) | None => ReferentialAction::NoAction,
    }
}

fn lower_alter_op(op: ext::AlterTableOperation) -> Result<AlterOp> {
    match op {
        ext::AlterTableOperation::AddColumn { column_def, .. } => {
            Ok(AlterOp::AddColumn(lower_column_def(column_def)?))
        }
        ext::AlterTableOperation::DropColumn { column_name, .. } => {
            Ok(AlterOp::DropColumn(column_name.value.to_lowercase()))
        }
        ext::AlterTableOperation::ModifyColumn { col_name, data_type, options, .. } => {
            Ok(AlterOp::ModifyColumn(lower_loose_column(
                col_name.value,
                &data_type,
                options,
            )?))
        }
        ext::AlterTableOperation::ChangeColumn {
            old_name,
            new_name,
            data_type,
            options,
            ..
        } => Ok(AlterOp::ChangeColumn {
            old_name: old_name.value.to_lowercase(),
            column: lower_loose_column(new_name.value, &data_type, options)?,
        }),
        other => Err(EngineError::unsupported(format!("ALTER TABLE {other}"))),
    }
}

/// MODIFY/CHANGE carry bare `ColumnOption`s instead of full definitions.
fn lower_loose_column(
    name: String,
    data_type: &ext::DataType,
    options: Vec<ext::ColumnOption>,
) -> Result<Column> {
    let mut column = Column::new(name, lower_data_type(data_type)?);
    for option in options {
        apply_column_option(&mut column, option)?;
    }
    column.validate()?;
    Ok(column)
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn lower_data_type(dt: &ext::DataType) -> Result<ColumnKind> {
    use ext::DataType as DT;
    Ok(match dt {
        DT::Int(_) | DT::Integer(_) | DT::BigInt(_) | DT::SmallInt(_) | DT::TinyInt(_) => {
            ColumnKind::Int
        }
        DT::Varchar(len) | DT::Char(len) => ColumnKind::Varchar(char_length(len)),
        DT::Text => ColumnKind::Text,
        DT::Float(_) | DT::Real => ColumnKind::Float,
        DT::Boolean | DT::Bool => ColumnKind::Bool,
        DT::Decimal(info) | DT::Numeric(info) => {
            let (precision, scale) = exact_number(info);
            ColumnKind::Decimal(precision, scale)
        }
        DT::Timestamp(..) | DT::Datetime(_) => ColumnKind::Timestamp,
        DT::Date => ColumnKind::Date,
        DT::Time(..) => ColumnKind::Time,
        other => {
            // Version-tolerant fallback: classify by rendered name. ENUM
            // and SET payloads are recovered from the rendering.
            let rendered = other.to_string();
            let upper = rendered.to_uppercase();
            if upper.starts_with("ENUM") {
                ColumnKind::Enum(quoted_members(&rendered))
            } else if upper.starts_with("SET") {
                ColumnKind::Set(quoted_members(&rendered))
            } else if upper.starts_with("YEAR") {
                ColumnKind::Year
            } else if upper.starts_with("DOUBLE") {
                ColumnKind::Float
            } else if upper.contains("INT") || upper == "SIGNED" || upper == "UNSIGNED" {
                ColumnKind::Int
            } else if upper.contains("TEXT") || upper.starts_with("CHAR") {
                ColumnKind::Text
            } else {
                return Err(EngineError::unsupported(format!("column type {rendered}")));
            }
        }
    })
}

fn char_length(len: &Option<ext::CharacterLength>) -> u32 {
    match len {
        Some(ext::CharacterLength::IntegerLength { length, .. }) => *length as u32,
        // VARCHAR without a length (or VARCHAR(MAX)) gets the MySQL
        // default display width.
        _ => 255,
    }
}

fn exact_number(info: &ext::ExactNumberInfo) -> (u32, u32) {
    match info {
        ext::ExactNumberInfo::None => (10, 0),
        ext::ExactNumberInfo::Precision(p) => (*p as u32, 0),
        ext::ExactNumberInfo::PrecisionAndScale(p, s) => (*p as u32, *s as u32),
    }
}

/// Pulls `'a','b'` members out of a rendered `ENUM('a','b')`.
fn quoted_members(rendered: &str) -> Vec<String> {
    let inner = rendered
        .find('(')
        .and_then(|start| rendered.rfind(')').map(|end| &rendered[start + 1..end]))
        .unwrap_or("");
    inner
        .split(',')
        .map(|m| m.trim().trim_matches('\'').trim_matches('"').to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// DML
// ---------------------------------------------------------------------------

fn lower_insert(insert: ext::Insert) -> Result<Statement> {
    let table = object_name(&insert.table_name);
    let columns: Vec<String> = insert
        .columns
        .iter()
        .map(|i| i.value.to_lowercase())
        .collect();

    let source_query = *insert
        .source
        .ok_or_else(|| EngineError::unsupported("INSERT without a VALUES or SELECT source"))?;
    let limit = lower_limit(&source_query)?;
    let source = match *source_query.body {
        ext::SetExpr::Values(values) => {
            let mut rows = Vec::with_capacity(values.rows.len());
            for row in values.rows {
                rows.push(row.into_iter().map(lower_expr).collect::<Result<Vec<_>>>()?);
            }
            InsertSource::Values(rows)
        }
        other => InsertSource::Select(Box::new(Query {
            body: lower_set_expr(other)?,
            limit,
        })),
    };

    let on_duplicate = match insert.on {
        Some(ext::OnInsert::DuplicateKeyUpdate(assignments)) => {
            lower_assignments(assignments)?
                .into_iter()
                .map(|(col, expr)| (col, rewrite_values_pseudo(expr)))
                .collect()
        }
        Some(_) => return Err(EngineError::unsupported("INSERT conflict clause")),
        None => Vec::new(),
    };

    Ok(Statement::Insert {
        table,
        columns,
        source,
        on_duplicate,
    })
}

fn lower_assignments(assignments: Vec<ext::Assignment>) -> Result<Vec<(String, Expr)>> {
    assignments
        .into_iter()
        .map(|a| {
            let column = match &a.target {
                ext::AssignmentTarget::ColumnName(name) => last_ident(name),
                other => {
                    return Err(EngineError::unsupported(format!(
                        "assignment target {other}"
                    )));
                }
            };
            Ok((column, lower_expr(a.value)?))
        })
        .collect()
}

/// Rewrites `VALUES(col)` calls inside ON DUPLICATE KEY UPDATE into the
/// dedicated pseudo-expression.
fn rewrite_values_pseudo(expr: Expr) -> Expr {
    match expr {
        Expr::Function { name, mut args, .. }
            if name.eq_ignore_ascii_case("VALUES") && args.len() == 1 =>
        {
            match args.remove(0) {
                Expr::Column { name: col, .. } => Expr::InsertValues(col),
                other => other,
            }
        }
        Expr::Binary { left, op, right } => Expr::Binary {
            left: Box::new(rewrite_values_pseudo(*left)),
            op,
            right: Box::new(rewrite_values_pseudo(*right)),
        },
        Expr::Unary { op, expr } => Expr::Unary {
            op,
            expr: Box::new(rewrite_values_pseudo(*expr)),
        },
        Expr::Function { name, args, distinct } => Expr::Function {
            name,
            args: args.into_iter().map(rewrite_values_pseudo).collect(),
            distinct,
        },
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn lower_query(query: ext::Query) -> Result<Query> {
    let limit = lower_limit(&query)?;
    match *query.body {
        // A parenthesized query keeps its own LIMIT; an outer one wins.
        ext::SetExpr::Query(inner) => {
            let mut lowered = lower_query(*inner)?;
            if limit.is_some() {
                lowered.limit = limit;
            }
            Ok(lowered)
        }
        body => Ok(Query {
            body: lower_set_expr(body)?,
            limit,
        }),
    }
}

fn lower_set_expr(body: ext::SetExpr) -> Result<QueryBody> {
    match body {
        ext::SetExpr::Select(select) => Ok(QueryBody::Select(lower_select(*select)?)),
        ext::SetExpr::Query(inner) => Ok(lower_query(*inner)?.body),
        ext::SetExpr::SetOperation { op: ext::SetOperator::Union, set_quantifier, left, right } => {
            Ok(QueryBody::Union {
                left: Box::new(lower_union_arm(*left)?),
                right: Box::new(lower_union_arm(*right)?),
                all: matches!(set_quantifier, ext::SetQuantifier::All),
            })
        }
        ext::SetExpr::SetOperation { op, .. } => {
            Err(EngineError::unsupported(format!("set operation {op}")))
        }
        other => Err(EngineError::unsupported(format!("query body {other}"))),
    }
}

/// A union arm is a bare select or a parenthesized query carrying its own
/// LIMIT.
fn lower_union_arm(body: ext::SetExpr) -> Result<Query> {
    match body {
        ext::SetExpr::Query(inner) => lower_query(*inner),
        other => Ok(Query {
            body: lower_set_expr(other)?,
            limit: None,
        }),
    }
}

fn lower_select(select: ext::Select) -> Result<SelectQuery> {
    let mut projection = Vec::with_capacity(select.projection.len());
    for item in select.projection {
        projection.push(lower_select_item(item)?);
    }

    let from = lower_from(select.from)?;

    let group_by = match select.group_by {
        ext::GroupByExpr::Expressions(exprs, _) => {
            exprs.into_iter().map(lower_expr).collect::<Result<Vec<_>>>()?
        }
        _ => return Err(EngineError::unsupported("GROUP BY ALL")),
    };

    Ok(SelectQuery {
        distinct: select.distinct.is_some(),
        projection,
        from,
        filter: select.selection.map(lower_expr).transpose()?,
        group_by,
        having: select.having.map(lower_expr).transpose()?,
    })
}

fn lower_select_item(item: ext::SelectItem) -> Result<SelectItem> {
    Ok(match item {
        ext::SelectItem::UnnamedExpr(e) => SelectItem {
            expr: lower_expr(e)?,
            alias: None,
        },
        ext::SelectItem::ExprWithAlias { expr, alias } => SelectItem {
            expr: lower_expr(expr)?,
            alias: Some(alias.value),
        },
        ext::SelectItem::Wildcard(_) => SelectItem {
            expr: Expr::Wildcard { qualifier: None },
            alias: None,
        },
        ext::SelectItem::QualifiedWildcard(name, _) => SelectItem {
            expr: Expr::Wildcard {
                qualifier: Some(strip_wildcard_suffix(&name.to_string())),
            },
            alias: None,
        },
    })
}

fn strip_wildcard_suffix(name: &str) -> String {
    name.trim_end_matches(".*").trim_matches('`').to_lowercase()
}

fn lower_from(from: Vec<ext::TableWithJoins>) -> Result<Option<FromClause>> {
    let mut relations = from.into_iter();
    let Some(first) = relations.next() else {
        return Ok(None);
    };

    let mut clause = FromClause {
        first: lower_table_factor(first.relation)?,
        joins: Vec::new(),
    };
    for join in first.joins {
        clause.joins.push(lower_join(join)?);
    }

    // Comma-separated relations are CROSS joins filtered by WHERE.
    for extra in relations {
        clause.joins.push(JoinStep {
            relation: lower_table_factor(extra.relation)?,
            kind: JoinKind::Cross,
            on: None,
        });
        for join in extra.joins {
            clause.joins.push(lower_join(join)?);
        }
    }
    Ok(Some(clause))
}

fn lower_join(join: ext::Join) -> Result<JoinStep> {
    let (kind, constraint) = match join.join_operator {
        ext::JoinOperator::Inner(c) => (JoinKind::Inner, Some(c)),
        ext::JoinOperator::LeftOuter(c) => (JoinKind::Left, Some(c)),
        ext::JoinOperator::RightOuter(c) => (JoinKind::Right, Some(c)),
        ext::JoinOperator::CrossJoin => (JoinKind::Cross, None),
        other => {
            return Err(EngineError::unsupported(format!("join type {other:?}")));
        }
    };
    let on = match constraint {
        Some(ext::JoinConstraint::On(e)) => Some(lower_expr(e)?),
        Some(ext::JoinConstraint::None) | None => None,
        Some(other) => {
            return Err(EngineError::unsupported(format!(
                "join constraint {other:?}"
            )));
        }
    };
    Ok(JoinStep {
        relation: lower_table_factor(join.relation)?,
        kind,
        on,
    })
}

fn lower_table_factor(factor: ext::TableFactor) -> Result<TableRef> {
    match factor {
        ext::TableFactor::Table { name, alias, .. } => Ok(TableRef::Table {
            name: object_name(&name),
            alias: alias.map(|a| a.name.value.to_lowercase()),
        }),
        ext::TableFactor::Derived { subquery, alias, .. } => {
            let alias = alias
                .map(|a| a.name.value.to_lowercase())
                .ok_or_else(|| EngineError::query("subquery in FROM requires an alias"))?;
            Ok(TableRef::Subquery {
                query: Box::new(lower_query(*subquery)?),
                alias,
            })
        }
        other => Err(EngineError::unsupported(format!("FROM item {other}"))),
    }
}

fn lower_limit(query: &ext::Query) -> Result<Option<Limit>> {
    let count = match &query.limit {
        Some(e) => Some(literal_usize(e, "LIMIT")?),
        None => None,
    };
    let offset = match &query.offset {
        Some(o) => literal_usize(&o.value, "OFFSET")?,
        None => 0,
    };
    Ok(count.map(|count| Limit { offset, count }))
}

fn literal_usize(expr: &ext::Expr, clause: &str) -> Result<usize> {
    if let ext::Expr::Value(ext::Value::Number(n, _)) = expr {
        if let Ok(v) = n.parse::<usize>() {
            return Ok(v);
        }
    }
    Err(EngineError::query(format!(
        "{clause} requires a non-negative integer literal"
    )))
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn lower_expr(expr: ext::Expr) -> Result<Expr> {
    Ok(match expr {
        ext::Expr::Identifier(ident) => Expr::Column {
            qualifier: None,
            name: ident.value,
        },
        ext::Expr::CompoundIdentifier(idents) => {
            let mut parts: Vec<String> = idents.into_iter().map(|i| i.value).collect();
            let name = parts.pop().unwrap_or_default();
            Expr::Column {
                qualifier: parts.pop().map(|q| q.to_lowercase()),
                name,
            }
        }
        ext::Expr::Value(value) => Expr::Literal(lower_value(value)?),
        ext::Expr::Nested(inner) => lower_expr(*inner)?,

        ext::Expr::BinaryOp { left, op, right } => {
            let op = lower_binary_op(op)?;
            Expr::Binary {
                left: Box::new(lower_expr(*left)?),
                op,
                right: Box::new(lower_expr(*right)?),
            }
        }
        ext::Expr::UnaryOp { op, expr } => {
            let op = match op {
                ext::UnaryOperator::Plus => UnaryOp::Plus,
                ext::UnaryOperator::Minus => UnaryOp::Minus,
                ext::UnaryOperator::Not => UnaryOp::Not,
                other => {
                    return Err(EngineError::unsupported(format!("unary operator {other}")));
                }
            };
            Expr::Unary {
                op,
                expr: Box::new(lower_expr(*expr)?),
            }
        }

        ext::Expr::IsNull(inner) => Expr::IsNull {
            expr: Box::new(lower_expr(*inner)?),
            negated: false,
        },
        ext::Expr::IsNotNull(inner) => Expr::IsNull {
            expr: Box::new(lower_expr(*inner)?),
            negated: true,
        },

        ext::Expr::Between { expr, negated, low, high } => Expr::Between {
            expr: Box::new(lower_expr(*expr)?),
            low: Box::new(lower_expr(*low)?),
            high: Box::new(lower_expr(*high)?),
            negated,
        },

        ext::Expr::InList { expr, list, negated } => Expr::InList {
            expr: Box::new(lower_expr(*expr)?),
            list: list.into_iter().map(lower_expr).collect::<Result<Vec<_>>>()?,
            negated,
        },
        ext::Expr::InSubquery { expr, subquery, negated } => Expr::InSubquery {
            expr: Box::new(lower_expr(*expr)?),
            query: Box::new(lower_query(*subquery)?),
            negated,
        },

        ext::Expr::Like { negated, expr, pattern, .. }
        | ext::Expr::ILike { negated, expr, pattern, .. } => Expr::Like {
            expr: Box::new(lower_expr(*expr)?),
            pattern: Box::new(lower_expr(*pattern)?),
            negated,
        },
        ext::Expr::RLike { negated, expr, pattern, .. } => Expr::Regexp {
            expr: Box::new(lower_expr(*expr)?),
            pattern: Box::new(lower_expr(*pattern)?),
            negated,
        },

        ext::Expr::Case { operand, conditions, results, else_result } => {
            let branches = conditions
                .into_iter()
                .zip(results)
                .map(|(when, then)| Ok((lower_expr(when)?, lower_expr(then)?)))
                .collect::<Result<Vec<_>>>()?;
            Expr::Case {
                operand: operand.map(|o| lower_expr(*o).map(Box::new)).transpose()?,
                branches,
                else_result: else_result
                    .map(|e| lower_expr(*e).map(Box::new))
                    .transpose()?,
            }
        }

        ext::Expr::Cast { expr, data_type, .. } => Expr::Cast {
            expr: Box::new(lower_expr(*expr)?),
            kind: lower_data_type(&data_type)?,
        },
        ext::Expr::Convert { expr, data_type, .. } => {
            let kind = data_type
                .ok_or_else(|| EngineError::unsupported("CONVERT without a target type"))?;
            Expr::Cast {
                expr: Box::new(lower_expr(*expr)?),
                kind: lower_data_type(&kind)?,
            }
        }

        // The parser gives a few standard functions dedicated nodes;
        // they re-enter the engine as ordinary calls.
        ext::Expr::Substring { expr, substring_from, substring_for, .. } => {
            let mut args = vec![lower_expr(*expr)?];
            if let Some(from) = substring_from {
                args.push(lower_expr(*from)?);
            }
            if let Some(length) = substring_for {
                args.push(lower_expr(*length)?);
            }
            Expr::Function {
                name: "SUBSTRING".to_string(),
                args,
                distinct: false,
            }
        }
        ext::Expr::Trim { expr, trim_where, trim_what, .. } => {
            if trim_where.is_some() || trim_what.is_some() {
                return Err(EngineError::unsupported("TRIM with modifiers"));
            }
            Expr::Function {
                name: "TRIM".to_string(),
                args: vec![lower_expr(*expr)?],
                distinct: false,
            }
        }
        ext::Expr::Ceil { expr, .. } => Expr::Function {
            name: "CEILING".to_string(),
            args: vec![lower_expr(*expr)?],
            distinct: false,
        },
        ext::Expr::Floor { expr, .. } => Expr::Function {
            name: "FLOOR".to_string(),
            args: vec![lower_expr(*expr)?],
            distinct: false,
        },

        ext::Expr::Function(func) => lower_function(func)?,

        ext::Expr::Exists { subquery, negated } => Expr::Exists {
            query: Box::new(lower_query(*subquery)?),
            negated,
        },
        ext::Expr::Subquery(subquery) => Expr::Subquery(Box::new(lower_query(*subquery)?)),

        other => {
            return Err(EngineError::unsupported(format!("expression: {other}")));
        }
    })
}

fn lower_binary_op(op: ext::BinaryOperator) -> Result<BinaryOp> {
    Ok(match op {
        ext::BinaryOperator::Plus => BinaryOp::Add,
        ext::BinaryOperator::Minus => BinaryOp::Subtract,
        ext::BinaryOperator::Multiply => BinaryOp::Multiply,
        ext::BinaryOperator::Divide => BinaryOp::Divide,
        ext::BinaryOperator::Modulo => BinaryOp::Modulo,
        ext::BinaryOperator::Eq => BinaryOp::Eq,
        ext::BinaryOperator::NotEq => BinaryOp::NotEq,
        ext::BinaryOperator::Lt => BinaryOp::Lt,
        ext::BinaryOperator::LtEq => BinaryOp::LtEq,
        ext::BinaryOperator::Gt => BinaryOp::Gt,
        ext::BinaryOperator::GtEq => BinaryOp::GtEq,
        ext::BinaryOperator::And => BinaryOp::And,
        ext::BinaryOperator::Or => BinaryOp::Or,
        other => {
            return Err(EngineError::unsupported(format!("operator {other}")));
        }
    })
}

fn lower_function(func: ext::Function) -> Result<Expr> {
    let name = last_ident(&func.name).to_uppercase();
    let (args, distinct) = match func.args {
        ext::FunctionArguments::None => (Vec::new(), false),
        ext::FunctionArguments::List(list) => {
            let distinct = matches!(
                list.duplicate_treatment,
                Some(ext::DuplicateTreatment::Distinct)
            );
            let mut lowered = Vec::with_capacity(list.args.len());
            for arg in list.args {
                match arg {
                    ext::FunctionArg::Unnamed(ext::FunctionArgExpr::Expr(e)) => {
                        lowered.push(lower_expr(e)?);
                    }
                    ext::FunctionArg::Unnamed(ext::FunctionArgExpr::Wildcard) => {
                        lowered.push(Expr::Wildcard { qualifier: None });
                    }
                    ext::FunctionArg::Unnamed(ext::FunctionArgExpr::QualifiedWildcard(q)) => {
                        lowered.push(Expr::Wildcard {
                            qualifier: Some(object_name(&q)),
                        });
                    }
                    other => {
                        return Err(EngineError::unsupported(format!(
                            "function argument {other}"
                        )));
                    }
                }
            }
            (lowered, distinct)
        }
        ext::FunctionArguments::Subquery(_) => {
            return Err(EngineError::unsupported("subquery function argument"));
        }
    };
    Ok(Expr::Function { name, args, distinct })
}

fn lower_value(value: ext::Value) -> Result<Value> {
    Ok(match value {
        ext::Value::Number(text, _) => {
            if let Ok(i) = text.parse::<i64>() {
                Value::Integer(i)
            } else {
                text.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| EngineError::Parse(format!("bad numeric literal {text}")))?
            }
        }
        ext::Value::SingleQuotedString(s) | ext::Value::DoubleQuotedString(s) => Value::Text(s),
        ext::Value::Boolean(b) => Value::Bool(b),
        ext::Value::Null => Value::Null,
        other => {
            return Err(EngineError::unsupported(format!("literal {other}")));
        }
    })
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Lowercased last segment of a (possibly qualified) object name.
fn object_name(name: &ext::ObjectName) -> String {
    name.0
        .last()
        .map(|i| i.value.to_lowercase())
        .unwrap_or_default()
}

fn last_ident(name: &ext::ObjectName) -> String {
    name.0
        .last()
        .map(|i| i.value.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn create_table_lowers_columns_and_constraints() {
        let stmt = parse_statement(
            "CREATE TABLE t (
                id INT AUTO_INCREMENT PRIMARY KEY,
                name VARCHAR(20) NOT NULL,
                score DECIMAL(8,2) DEFAULT 0,
                pid INT,
                FOREIGN KEY (pid) REFERENCES parent(id) ON DELETE CASCADE
            );",
        )
        .unwrap();
        let Statement::CreateTable { name, columns, foreign_keys, .. } = stmt else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(name, "t");
        assert_eq!(columns.len(), 4);
        assert!(columns[0].auto_increment && columns[0].primary && columns[0].not_null);
        assert_eq!(columns[1].kind, ColumnKind::Varchar(20));
        assert!(columns[1].not_null);
        assert_eq!(
            columns[2].default,
            Some(DefaultValue::Literal(Value::Integer(0)))
        );
        assert_eq!(foreign_keys.len(), 1);
        assert_eq!(foreign_keys[0].ref_table, "parent");
        assert_eq!(foreign_keys[0].on_delete, ReferentialAction::Cascade);
    }

    #[test]
    fn inline_references_are_hoisted() {
        let stmt = parse_statement(
            "CREATE TABLE c (pid INT REFERENCES parent(id) ON DELETE SET NULL);",
        )
        .unwrap();
        let Statement::CreateTable { columns, foreign_keys, .. } = stmt else {
            panic!("expected CREATE TABLE");
        };
        assert!(columns[0].references.is_none(), "reference should be hoisted");
        assert_eq!(foreign_keys[0].columns, vec!["pid"]);
        assert_eq!(foreign_keys[0].on_delete, ReferentialAction::SetNull);
    }

    #[test]
    fn select_with_joins_and_limit() {
        let stmt = parse_statement(
            "SELECT u.name, o.total FROM users u LEFT JOIN orders o ON u.id = o.uid LIMIT 2, 5;",
        )
        .unwrap();
        let Statement::Select(query) = stmt else {
            panic!("expected SELECT");
        };
        let limit = query.limit.expect("limit");
        assert_eq!((limit.offset, limit.count), (2, 5));
        let QueryBody::Select(select) = query.body else {
            panic!("expected plain select");
        };
        let from = select.from.expect("from");
        assert_eq!(from.first.exposed_name(), "u");
        assert_eq!(from.joins.len(), 1);
        assert_eq!(from.joins[0].kind, JoinKind::Left);
    }

    #[test]
    fn insert_on_duplicate_rewrites_values_pseudo() {
        let stmt = parse_statement(
            "INSERT INTO t (id, n) VALUES (1, 2) ON DUPLICATE KEY UPDATE n = VALUES(n) + 1;",
        )
        .unwrap();
        let Statement::Insert { on_duplicate, .. } = stmt else {
            panic!("expected INSERT");
        };
        assert_eq!(on_duplicate.len(), 1);
        let (col, expr) = &on_duplicate[0];
        assert_eq!(col, "n");
        let Expr::Binary { left, .. } = expr else {
            panic!("expected arithmetic over VALUES(n)");
        };
        assert!(matches!(left.as_ref(), Expr::InsertValues(c) if c == "n"));
    }

    #[test]
    fn union_all_is_preserved() {
        let stmt = parse_statement("SELECT a FROM t UNION ALL SELECT b FROM s;").unwrap();
        let Statement::Select(query) = stmt else {
            panic!("expected SELECT");
        };
        assert!(matches!(query.body, QueryBody::Union { all: true, .. }));
    }

    #[test]
    fn unsupported_statements_are_reported() {
        let err = parse_statement("CREATE VIEW v AS SELECT 1;").unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)), "{err}");
    }
}
