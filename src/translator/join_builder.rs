//! Join builder
//!
//! Two shapes reach here:
//!
//! - `Join(inner, outerKey, innerKey, result)` renders an `INNER JOIN` whose
//!   condition pairs the two key selectors (member by member for composite
//!   keys);
//! - `SelectMany(outer => inner.Where(..).DefaultIfEmpty(..), result)` renders
//!   a `LEFT JOIN` when the collection ends in `DefaultIfEmpty`, an
//!   `INNER JOIN` on its `Where` conditions otherwise, or a `CROSS JOIN`.
//!
//! Joins are inserted at the end of the level's `FROM` part, ahead of any
//! `WHERE` text already written.

use std::rc::Rc;

use super::context::{Clause, RenderMode};
use super::errors::{TranslateError, TranslateResult};
use super::scope::{DefaultSubstitution, DerivedColumn, DerivedTarget, Env, Target};
use super::statement::{compile_nested, lambda_arg, optional_lambda, Purpose, SelectLevel, StatementCompiler};
use crate::expression::{Category, Expr, LambdaExpr, MethodCall, Value};

pub type JoinBuilderResult<T> = Result<T, TranslateError>;

/// Joins cannot be merged into a level that already groups, pages or
/// de-duplicates its rows.
fn prepare_level(c: &mut StatementCompiler<'_>, level: &mut SelectLevel) -> TranslateResult<()> {
    if level.group.is_some() || level.page.is_bound() || level.distinct {
        c.wrap_derived(level)?;
    }
    Ok(())
}

fn insert_join(level: &mut SelectLevel, text: &str) {
    let at = level.from_end;
    let written = level.writer.main_mut().write_at(at, text);
    level.from_end += written;
    log::debug!("join inserted at {}: {}", at, text.trim_start());
}

/// The inner side of a join: a table or a compiled derived table.
fn inner_source(c: &mut StatementCompiler<'_>, inner: &Expr) -> TranslateResult<(String, Target)> {
    match inner.strip_convert() {
        Expr::Constant {
            value: Value::Source(entity),
        } => {
            let table = c.ctx.new_table(entity)?;
            let sql = format!(
                "{} {}",
                c.ctx.dialect.quote_path(&table.info.table_name),
                table.alias
            );
            Ok((sql, Target::table(table)))
        }
        query if query.is_query() => {
            let env = c.env.clone();
            let finalized = compile_nested(&mut *c.ctx, env, query, Purpose::Derived)?;
            let alias = c.ctx.aliases.next_alias();
            let sql = format!("({}) {}", finalized.sql, alias);
            let columns: Vec<DerivedColumn> =
                finalized.columns.into_iter().map(Into::into).collect();
            let derived = DerivedTarget {
                alias,
                columns,
                scalar: finalized.scalar,
            };
            Ok((sql, Target::Derived(Rc::new(derived))))
        }
        other => Err(TranslateError::unsupported(format!(
            "{:?} node as a join source",
            other.kind()
        ))),
    }
}

fn key_parts(body: &Expr) -> Vec<&Expr> {
    match body.strip_convert() {
        Expr::New(new) => new.bindings.iter().map(|b| &b.expr).collect(),
        other => vec![other],
    }
}

/// `o1 = i1 AND o2 = i2 ...` for the paired key selectors.
fn key_condition(
    c: &mut StatementCompiler<'_>,
    outer: (&LambdaExpr, Env),
    inner: (&LambdaExpr, Env),
) -> TranslateResult<String> {
    let outer_parts = key_parts(&outer.0.body);
    let inner_parts = key_parts(&inner.0.body);
    if outer_parts.len() != inner_parts.len() {
        return Err(TranslateError::unsupported(format!(
            "join keys of different shapes ({} and {} members)",
            outer_parts.len(),
            inner_parts.len()
        )));
    }
    let mut terms = Vec::with_capacity(outer_parts.len());
    for (o, i) in outer_parts.into_iter().zip(inner_parts) {
        let left = c.render(Clause::Join, outer.1.clone(), o, RenderMode::value())?;
        let right = c.render(Clause::Join, inner.1.clone(), i, RenderMode::value())?;
        terms.push(format!("{} = {}", left, right));
    }
    Ok(terms.join(" AND "))
}

pub(crate) fn apply_join(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> JoinBuilderResult<()> {
    let inner = call
        .arg(1)
        .ok_or_else(|| TranslateError::unsupported("Join without an inner sequence"))?;
    let outer_key = lambda_arg(call, 2)?;
    let inner_key = lambda_arg(call, 3)?;
    let result = lambda_arg(call, 4)?;
    prepare_level(c, level)?;

    let outer = level.element.clone();
    let (source, inner_target) = inner_source(c, inner)?;
    let outer_env = c.bind_lambda(outer_key, &[outer.clone()])?;
    let inner_env = c.bind_lambda(inner_key, &[inner_target.clone()])?;
    let condition = key_condition(c, (outer_key, outer_env), (inner_key, inner_env))?;
    insert_join(level, &format!(" INNER JOIN {} ON {}", source, condition));

    let env = c.bind_lambda(result, &[outer, inner_target])?;
    level.element = Target::bound(&result.body, &env);
    level.select_fixed = false;
    Ok(())
}

/// The pieces of a `SelectMany` collection selector.
struct Collection<'e> {
    entity: &'e str,
    filters: Vec<&'e LambdaExpr>,
    /// `Some` when the chain ends in `DefaultIfEmpty`, holding its fallback
    outer: Option<Option<&'e Expr>>,
}

fn collection_parts(body: &Expr) -> TranslateResult<Collection<'_>> {
    let mut current = body.strip_convert();
    let mut outer = None;
    if let Expr::Call(call) = current {
        if call.is(Category::QueryOperators, "DefaultIfEmpty") {
            outer = Some(call.arg(1));
            current = call
                .receiver()
                .ok_or_else(|| TranslateError::unsupported("DefaultIfEmpty without a source"))?
                .strip_convert();
        }
    }

    let mut filters = Vec::new();
    while let Expr::Call(call) = current {
        if !call.is(Category::QueryOperators, "Where") {
            return Err(TranslateError::unsupported(format!(
                "'{}' inside a SelectMany collection selector",
                call.name
            )));
        }
        filters.push(lambda_arg(call, 1)?);
        current = call
            .receiver()
            .ok_or_else(|| TranslateError::unsupported("Where without a source"))?
            .strip_convert();
    }
    filters.reverse();

    match current {
        Expr::Constant {
            value: Value::Source(entity),
        } => Ok(Collection {
            entity,
            filters,
            outer,
        }),
        other => Err(TranslateError::unsupported(format!(
            "SelectMany over {:?} (only entity sources can be joined)",
            other.kind()
        ))),
    }
}

pub(crate) fn apply_select_many(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> JoinBuilderResult<()> {
    let selector = lambda_arg(call, 1)?;
    let result = optional_lambda(call, 2);
    prepare_level(c, level)?;

    let outer = level.element.clone();
    let selector_env = c.bind_lambda(selector, &[outer.clone()])?;
    let collection = collection_parts(&selector.body)?;

    let table = c.ctx.new_table(collection.entity)?;
    let source = format!(
        "{} {}",
        c.ctx.dialect.quote_path(&table.info.table_name),
        table.alias
    );
    let guard: Vec<String> = table
        .info
        .key_columns()?
        .into_iter()
        .map(|column| c.ctx.dialect.qualify(&table.alias, &column.column))
        .collect();
    let inner = Target::table(table.clone());

    let mut conditions = Vec::new();
    for filter in &collection.filters {
        let Some(param) = filter.params.first() else {
            return Err(TranslateError::unsupported("Where without a parameter"));
        };
        let env = selector_env.bind(&param.name, inner.clone());
        let text = c.render(Clause::Join, env, &filter.body, RenderMode::condition())?;
        if !text.is_empty() {
            conditions.push(text);
        }
    }

    let join = match (collection.outer.is_some(), conditions.is_empty()) {
        (true, true) => format!(" LEFT JOIN {} ON 1 = 1", source),
        (true, false) => format!(" LEFT JOIN {} ON {}", source, conditions.join(" AND ")),
        (false, false) => format!(" INNER JOIN {} ON {}", source, conditions.join(" AND ")),
        (false, true) => format!(" CROSS JOIN {}", source),
    };
    insert_join(level, &join);

    level.element = match result {
        Some(result) => {
            let joined = match (collection.outer, result.params.get(1)) {
                (Some(Some(fallback)), Some(param)) if !fallback.is_null_constant() => {
                    log::debug!(
                        "default substitution for {} via '{}'",
                        table.info.entity,
                        param.name
                    );
                    Target::table(table.with_default(Rc::new(DefaultSubstitution {
                        guard,
                        fallback: Rc::new(fallback.clone()),
                        fallback_env: selector_env.clone(),
                    })))
                }
                _ => inner,
            };
            let env = c.bind_lambda(result, &[outer, joined])?;
            Target::bound(&result.body, &env)
        }
        None => inner,
    };
    level.select_fixed = false;
    Ok(())
}
