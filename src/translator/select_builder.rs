//! Select list builder
//!
//! Renders the projection of a level: the level's element is whatever the
//! last `Select` (or the source table, a join result, a derived table) made
//! of each row.
//!
//! ## Naming
//!
//! - entity columns keep their column names (`t.Name`, no alias);
//! - a projected member becomes `expr AS Member`;
//! - members of nested objects are flattened as `Outer_Inner`;
//! - a bare scalar projection is named `Value`.

use super::context::{Clause, RenderMode};
use super::errors::{TranslateError, TranslateResult};
use super::expr_visitor::ExprVisitor;
use super::group_by_builder;
use super::scope::{DerivedColumn, Target};
use super::statement::{Purpose, SelectLevel, StatementCompiler};
use crate::expression::Expr;
use crate::writer::SqlBuffer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectColumn {
    /// Member path the column stands for
    pub member: String,
    /// Output name
    pub name: String,
}

impl From<SelectColumn> for DerivedColumn {
    fn from(column: SelectColumn) -> Self {
        DerivedColumn {
            member: column.member,
            name: column.name,
        }
    }
}

/// A rendered select list.
#[derive(Debug, Clone, Default)]
pub(crate) struct SelectList {
    pub text: String,
    pub columns: Vec<SelectColumn>,
    /// Output name when the list is a single scalar projection
    pub scalar: Option<String>,
}

fn prefixed(path: Option<&str>, member: &str) -> String {
    match path {
        Some(path) => format!("{}_{}", path, member),
        None => member.to_string(),
    }
}

fn implicit_name(expr: &Expr) -> Option<String> {
    match expr.strip_convert() {
        Expr::Member(access) if access.member != "Value" => Some(access.member.clone()),
        Expr::Member(access) => implicit_name(&access.owner),
        _ => None,
    }
}

/// Projects one item, returning true when it produced a single scalar column.
///
/// `path` is the member path from enclosing object constructions, `leaf` the
/// name of the member reference that led here through a substitution.
pub(crate) fn project_item(
    v: &mut ExprVisitor<'_>,
    expr: &Expr,
    path: Option<String>,
    leaf: Option<String>,
) -> TranslateResult<bool> {
    let expr = expr.strip_convert();
    if let Expr::New(new) = expr {
        for binding in &new.bindings {
            let member_path = prefixed(path.as_deref(), &binding.member);
            project_item(v, &binding.expr, Some(member_path), None)?;
        }
        return Ok(false);
    }

    if let Some((sub, env)) = v.substitution(expr)? {
        let leaf = leaf.or_else(|| implicit_name(expr));
        return v.with_env(env, |v| project_item(v, &sub, path, leaf));
    }

    if matches!(expr, Expr::Parameter(_) | Expr::Member(_)) {
        if let Some(target) = v.resolve_target(expr)? {
            let is_object = match &target {
                Target::Derived(derived) => derived.scalar.is_none(),
                _ => true,
            };
            if is_object {
                expand_target(v, &target, path.as_deref())?;
                return Ok(false);
            }
        }
    }

    let text = v.capture(|v| v.visit_default(expr, RenderMode::value()))?;
    let name = path
        .or(leaf)
        .or_else(|| implicit_name(expr))
        .unwrap_or_else(|| "Value".to_string());
    push_column(v, &text, name.clone(), name);
    Ok(true)
}

/// Every visible column of an object target.
pub(crate) fn expand_target(
    v: &mut ExprVisitor<'_>,
    target: &Target,
    path: Option<&str>,
) -> TranslateResult<()> {
    match target {
        Target::Table(table) => {
            let columns: Vec<(String, String)> = table
                .visible_columns()
                .into_iter()
                .map(|c| (c.member.clone(), c.column.clone()))
                .collect();
            for (member, column) in columns {
                let text = v.capture(|v| {
                    v.visit_target_member(target, &member, RenderMode::value())
                })?;
                let (member, name) = match path {
                    Some(_) => {
                        let flat = prefixed(path, &member);
                        (flat.clone(), flat)
                    }
                    None => (member, column),
                };
                push_column(v, &text, member, name);
            }
            Ok(())
        }
        Target::Derived(derived) => {
            let dialect = v.ctx.dialect.clone();
            for column in &derived.columns {
                let text = dialect.qualify(&derived.alias, &column.name);
                let member = prefixed(path, &column.member);
                let name = match path {
                    Some(_) => member.clone(),
                    None => column.name.clone(),
                };
                push_column(v, &text, member, name);
            }
            Ok(())
        }
        Target::Group(_) => Err(TranslateError::unsupported(
            "a grouping cannot be projected directly; select its Key or aggregates",
        )),
        Target::Bound { .. } => Err(TranslateError::unsupported(
            "projection of a computed object",
        )),
    }
}

/// Writes `, text AS name`, skipping the alias when a plain column already
/// carries that name.
fn push_column(v: &mut ExprVisitor<'_>, text: &str, member: String, name: String) {
    let quoted = v.ctx.dialect.quote(&name);
    let plain = !text.contains(' ') && text.ends_with(&format!(".{}", quoted));
    if !v.columns.is_empty() {
        v.write(", ");
    }
    v.write(text);
    if !plain {
        v.write(" AS ");
        v.write(&quoted);
    }
    v.columns.push(SelectColumn { member, name });
}

/// Renders the select list of `level` for the given purpose, growing the
/// `GROUP BY` keys when defaulted outer-join columns require it.
pub(crate) fn render_select_list(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    purpose: Purpose,
) -> TranslateResult<SelectList> {
    let mut buffer = SqlBuffer::new();
    let grouped = level.group.is_some();
    let env = c.env.clone();
    let element = level.element.clone();

    let (scalar, columns, growth) = {
        let mut v = ExprVisitor::new(&mut *c.ctx, &mut buffer, Clause::Select, env);
        v.grouped = grouped;
        let scalar = match &element {
            Target::Group(group) => {
                if purpose != Purpose::Derived {
                    return Err(TranslateError::unsupported(
                        "a grouped query must end with a projection (Select or a GroupBy result selector)",
                    ));
                }
                let key = group.key.clone();
                v.with_env(group.key_env.clone(), |v| {
                    project_item(v, &key, Some("Key".to_string()), None)
                })?;
                false
            }
            Target::Bound { expr, env } => {
                let expr = expr.clone();
                v.with_env(env.clone(), |v| project_item(v, &expr, None, None))?
            }
            target => {
                expand_target(&mut v, target, None)?;
                false
            }
        };
        (
            scalar,
            std::mem::take(&mut v.columns),
            std::mem::take(&mut v.key_growth),
        )
    };

    if !growth.is_empty() {
        group_by_builder::grow_group_keys(level, &growth);
    }

    let scalar_name = if scalar {
        columns.first().map(|c| c.name.clone())
    } else {
        None
    };
    Ok(SelectList {
        text: buffer.into_string(),
        columns,
        scalar: scalar_name,
    })
}

