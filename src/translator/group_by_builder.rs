//! GROUP BY builder
//!
//! `GroupBy` writes the ` GROUP BY` clause immediately and turns the level's
//! element into a grouping. Later references re-expand from the key selector:
//!
//! - `g.Key` renders the key expression again, exactly as it was grouped on;
//! - `g.Count()`, `g.Sum(x => ..)` and friends become aggregate functions over
//!   the grouped rows, with `g.Where(..)` filters folded into `CASE WHEN`.
//!
//! The clause position is remembered so it can be regenerated in place when
//! the projection needs more key columns (outer-join defaults referenced
//! outside an aggregate).

use std::mem;
use std::rc::Rc;

use super::context::{Clause, RenderMode};
use super::errors::{TranslateError, TranslateResult};
use super::expr_visitor::ExprVisitor;
use super::scope::{GroupTarget, Target};
use super::statement::{lambda_arg, optional_lambda, GroupState, SelectLevel, StatementCompiler};
use crate::expression::{Category, Expr, LambdaExpr, MethodCall};
use crate::writer::SqlBuffer;

/// Result type for grouping helpers
pub type GroupByBuilderResult<T> = Result<T, TranslateError>;

pub(crate) fn apply_group_by(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> GroupByBuilderResult<()> {
    let key = lambda_arg(call, 1)?;
    if level.group.is_some() || level.page.is_bound() || level.distinct {
        c.wrap_derived(level)?;
    }
    if !level.ordering.is_empty() {
        log::debug!("GroupBy discards {} ordering item(s)", level.ordering.len());
        level.ordering.clear();
    }

    let element = level.element.clone();
    let key_env = c.bind_lambda(key, &[element.clone()])?;
    let keys = render_keys(c, key_env.clone(), &key.body)?;
    if keys.is_empty() {
        return Err(TranslateError::unsupported("grouping on an empty key"));
    }

    let main = level.writer.main_mut();
    main.set_insertion_point(None);
    let start = main.len();
    main.write(&format!(" GROUP BY {}", keys.join(", ")));
    let end = main.len();
    level.group = Some(GroupState { keys, start, end });

    let mut group_element = element.clone();
    let mut result_selector = None;
    for arg in call.args.iter().skip(2) {
        let Some(lambda) = arg.as_lambda() else {
            return Err(TranslateError::unsupported("GroupBy with a comparer"));
        };
        match lambda.params.len() {
            1 => {
                let env = c.bind_lambda(lambda, &[element.clone()])?;
                group_element = Target::bound(&lambda.body, &env);
            }
            2 => result_selector = Some(lambda),
            n => {
                return Err(TranslateError::unsupported(format!(
                    "GroupBy selector with {} parameters",
                    n
                )))
            }
        }
    }

    let group = Rc::new(GroupTarget {
        key: Rc::new((*key.body).clone()),
        key_env: key_env.clone(),
        element: group_element,
    });
    level.element = match result_selector {
        Some(selector) => {
            let env = c.bind_lambda(
                selector,
                &[Target::bound(&key.body, &key_env), Target::Group(group)],
            )?;
            Target::bound(&selector.body, &env)
        }
        None => Target::Group(group),
    };
    Ok(())
}

fn render_keys(
    c: &mut StatementCompiler<'_>,
    env: super::scope::Env,
    body: &Expr,
) -> GroupByBuilderResult<Vec<String>> {
    let mut buffer = SqlBuffer::new();
    let keys = {
        let mut v = ExprVisitor::new(&mut *c.ctx, &mut buffer, Clause::GroupKey, env);
        v.visit(body, RenderMode::list_item())?;
        mem::take(&mut v.group_keys)
    };
    if keys.is_empty() && !buffer.is_empty() {
        return Ok(vec![buffer.into_string()]);
    }
    Ok(keys)
}

/// Group-key override for `New`, `Member` and `Parameter` at the root of the
/// key selector: each key column is recorded separately.
pub(crate) fn group_key_item(
    v: &mut ExprVisitor<'_>,
    expr: &Expr,
    mode: RenderMode,
) -> TranslateResult<()> {
    if !mode.list_item {
        return v.visit_default(expr, mode);
    }
    match expr.strip_convert() {
        Expr::New(new) => {
            for binding in &new.bindings {
                push_key(v, &binding.expr)?;
            }
            Ok(())
        }
        other => push_key(v, other),
    }
}

fn push_key(v: &mut ExprVisitor<'_>, expr: &Expr) -> TranslateResult<()> {
    let expr = expr.strip_convert();
    if let Expr::New(_) = expr {
        return group_key_item(v, expr, RenderMode::list_item());
    }
    if let Some((sub, env)) = v.substitution(expr)? {
        return v.with_env(env, |v| push_key(v, &sub));
    }
    if matches!(expr, Expr::Parameter(_) | Expr::Member(_)) {
        if let Some(target) = v.resolve_target(expr)? {
            return push_object_keys(v, &target);
        }
    }
    let text = v.capture(|v| v.visit_default(expr, RenderMode::value()))?;
    record_key(v, text);
    Ok(())
}

/// Grouping on a whole entity groups on every visible column.
fn push_object_keys(v: &mut ExprVisitor<'_>, target: &Target) -> TranslateResult<()> {
    match target {
        Target::Table(table) => {
            let members: Vec<String> = table
                .visible_columns()
                .into_iter()
                .map(|c| c.member.clone())
                .collect();
            for member in members {
                let text = v.capture(|v| {
                    v.visit_target_member(target, &member, RenderMode::value())
                })?;
                record_key(v, text);
            }
            Ok(())
        }
        Target::Derived(derived) => {
            let dialect = v.ctx.dialect.clone();
            if let Some(scalar) = &derived.scalar {
                record_key(v, dialect.qualify(&derived.alias, scalar));
                return Ok(());
            }
            for column in &derived.columns {
                record_key(v, dialect.qualify(&derived.alias, &column.name));
            }
            Ok(())
        }
        _ => Err(TranslateError::unsupported("grouping on a grouping")),
    }
}

fn record_key(v: &mut ExprVisitor<'_>, text: String) {
    if v.group_keys.contains(&text) {
        return;
    }
    if !v.group_keys.is_empty() {
        v.write(", ");
    }
    v.write(&text);
    v.group_keys.push(text);
}

/// Appends `growth` to the key list and regenerates the clause in place.
pub(crate) fn grow_group_keys(level: &mut SelectLevel, growth: &[String]) {
    let Some(group) = level.group.as_mut() else {
        return;
    };
    let before = group.keys.len();
    for key in growth {
        if !group.keys.contains(key) {
            group.keys.push(key.clone());
        }
    }
    if group.keys.len() == before {
        return;
    }
    let text = format!(" GROUP BY {}", group.keys.join(", "));
    let delta = level
        .writer
        .main_mut()
        .replace_range(group.start, group.end, &text);
    group.end = (group.end as isize + delta) as usize;
    log::debug!("GROUP BY grown to {} key(s)", group.keys.len());
}

/// Rows of a grouping an aggregate runs over.
pub(crate) struct GroupSource<'e> {
    pub group: Rc<GroupTarget>,
    pub filters: Vec<&'e LambdaExpr>,
    pub projection: Option<&'e LambdaExpr>,
}

/// Recognizes `g`, `g.Where(..)` and `g.Where(..).Select(..)` over a grouping.
pub(crate) fn group_source<'e>(
    v: &mut ExprVisitor<'_>,
    expr: &'e Expr,
) -> TranslateResult<Option<GroupSource<'e>>> {
    match expr.strip_convert() {
        e @ (Expr::Parameter(_) | Expr::Member(_)) => match v.resolve_target(e)? {
            Some(Target::Group(group)) => Ok(Some(GroupSource {
                group,
                filters: Vec::new(),
                projection: None,
            })),
            _ => Ok(None),
        },
        Expr::Call(call) if call.category == Category::QueryOperators => {
            let Some(receiver) = call.receiver() else {
                return Ok(None);
            };
            match call.name.as_str() {
                "Where" => {
                    let Some(mut source) = group_source(v, receiver)? else {
                        return Ok(None);
                    };
                    if source.projection.is_some() {
                        return Err(TranslateError::unsupported(
                            "filtering a projected grouping",
                        ));
                    }
                    source.filters.push(lambda_arg(call, 1)?);
                    Ok(Some(source))
                }
                "Select" => {
                    let Some(mut source) = group_source(v, receiver)? else {
                        return Ok(None);
                    };
                    if source.projection.is_some() {
                        return Err(TranslateError::unsupported(
                            "projecting a projected grouping",
                        ));
                    }
                    source.projection = Some(lambda_arg(call, 1)?);
                    Ok(Some(source))
                }
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

fn render_over_rows(
    v: &mut ExprVisitor<'_>,
    lambda: &LambdaExpr,
    element: &Target,
    condition: bool,
) -> TranslateResult<String> {
    let Some(param) = lambda.params.first() else {
        return Err(TranslateError::unsupported("aggregate lambda without a parameter"));
    };
    let env = v.env.bind(&param.name, element.clone());
    let mode = RenderMode::value().aggregating();
    v.with_env(env, |v| {
        v.capture(|v| {
            if condition {
                v.visit_condition(&lambda.body, mode)
            } else {
                v.visit(&lambda.body, mode)
            }
        })
    })
}

/// `COUNT`, `SUM`, ... over the rows of a grouping.
pub(crate) fn visit_group_aggregate(
    v: &mut ExprVisitor<'_>,
    source: &GroupSource<'_>,
    call: &MethodCall,
    _mode: RenderMode,
) -> TranslateResult<()> {
    let element = source.group.element.clone();
    let mut conditions = Vec::new();
    for filter in &source.filters {
        let text = render_over_rows(v, filter, &element, true)?;
        if !text.is_empty() {
            conditions.push(text);
        }
    }

    // Lambdas of the aggregate itself see the rows after `g.Select(..)`.
    let row = match source.projection {
        Some(projection) => {
            let Some(param) = projection.params.first() else {
                return Err(TranslateError::unsupported("Select over a grouping without a parameter"));
            };
            let env = v.env.bind(&param.name, element.clone());
            Target::bound(&projection.body, &env)
        }
        None => element.clone(),
    };

    let name = call.name.as_str();
    let lambda = optional_lambda(call, 1);
    let text = match name {
        "Count" | "LongCount" | "Any" => {
            if let Some(predicate) = lambda {
                let text = render_over_rows(v, predicate, &row, true)?;
                if !text.is_empty() {
                    conditions.push(text);
                }
            }
            let count = if conditions.is_empty() {
                "COUNT(1)".to_string()
            } else {
                format!("COUNT(CASE WHEN {} THEN 1 END)", conditions.join(" AND "))
            };
            if name == "Any" {
                format!("{} > 0", count)
            } else {
                count
            }
        }
        "All" => {
            let predicate = lambda_arg(call, 1)?;
            let text = render_over_rows(v, predicate, &row, true)?;
            if !text.is_empty() {
                conditions.push(format!("NOT ({})", text));
            }
            if conditions.is_empty() {
                "1 = 1".to_string()
            } else {
                format!(
                    "COUNT(CASE WHEN {} THEN 1 END) = 0",
                    conditions.join(" AND ")
                )
            }
        }
        "Sum" | "Min" | "Max" | "Average" => {
            let value = match (lambda, source.projection) {
                (Some(selector), _) => render_over_rows(v, selector, &row, false)?,
                (None, Some(projection)) => render_over_rows(v, projection, &element, false)?,
                (None, None) => match &element {
                    Target::Bound { expr, env } => {
                        let expr = expr.clone();
                        v.with_env(env.clone(), |v| {
                            v.capture(|v| v.visit(&expr, RenderMode::value().aggregating()))
                        })?
                    }
                    _ => {
                        return Err(TranslateError::unsupported(format!(
                            "'{}' over grouped entity rows without a selector",
                            name
                        )))
                    }
                },
            };
            let value = if conditions.is_empty() {
                value
            } else {
                format!("CASE WHEN {} THEN {} END", conditions.join(" AND "), value)
            };
            match name {
                "Sum" => format!("COALESCE(SUM({}), 0)", value),
                "Min" => format!("MIN({})", value),
                "Max" => format!("MAX({})", value),
                _ => format!("AVG({})", value),
            }
        }
        other => {
            return Err(TranslateError::unsupported(format!(
                "'{}' over a grouping",
                other
            )))
        }
    };
    v.write(&text);
    Ok(())
}
