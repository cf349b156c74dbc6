//! Predicate grammar
//!
//! Overrides registered for the `Predicate`, `Having` and `Join` clauses. In
//! condition position every boolean leaf must become a real SQL condition:
//!
//! - `u.Active` becomes `t.Active = @p0` (`true`);
//! - `x == null` becomes `x IS NULL`;
//! - `a ?? b ?? c > x` expands into one guarded branch per link;
//! - nullable-to-nullable equality gets null-safe `OR` branches;
//! - `true && P` / `false || P` collapse to `P`; `P || true` is `true`
//!   wherever it sits, so an enclosing `Q && (P || true)` is just `Q`.
//!
//! Outside condition position the handlers fall back to
//! [`ExprVisitor::visit_default`].

use super::context::RenderMode;
use super::errors::{TranslateError, TranslateResult};
use super::expr_visitor::ExprVisitor;
use crate::expression::{BinaryExpr, BinaryOp, Category, Expr, UnaryOp, Value};
use crate::writer::{workflow, wrap_non_empty};

/// Whether `expr` is boolean-valued by shape alone.
pub(crate) fn is_condition(expr: &Expr) -> bool {
    match expr.strip_convert() {
        Expr::Binary(b) => match b.op {
            op if op.is_comparison() || op.is_short_circuit() => true,
            BinaryOp::And | BinaryOp::Or => {
                is_condition_or_flag(&b.left) || is_condition_or_flag(&b.right)
            }
            _ => false,
        },
        Expr::Unary(u) => u.op == UnaryOp::Not,
        Expr::Call(call) => match call.category {
            Category::StringOps => matches!(
                call.name.as_str(),
                "Contains" | "StartsWith" | "EndsWith" | "IsNullOrEmpty" | "IsNullOrWhiteSpace" | "Equals"
            ),
            Category::EnumerableOps => matches!(call.name.as_str(), "Contains" | "Any" | "All"),
            Category::QueryOperators => matches!(call.name.as_str(), "Any" | "All" | "Contains"),
            Category::CustomExtension => false,
        },
        Expr::Member(m) => m.member == "HasValue",
        _ => false,
    }
}

fn is_condition_or_flag(expr: &Expr) -> bool {
    is_condition(expr) || expr.as_bool_constant().is_some()
}

/// A condition in value position: `CASE WHEN cond THEN TRUE ELSE FALSE END`.
pub(crate) fn condition_as_value(
    v: &mut ExprVisitor<'_>,
    expr: &Expr,
    mode: RenderMode,
) -> TranslateResult<()> {
    let condition = v.capture(|v| v.visit_condition(expr, mode))?;
    let dialect = v.ctx.dialect.clone();
    let text = if condition.is_empty() {
        dialect.bool_literal(true).to_string()
    } else {
        format!(
            "CASE WHEN {} THEN {} ELSE {} END",
            condition,
            dialect.bool_literal(true),
            dialect.bool_literal(false)
        )
    };
    v.write(&text);
    Ok(())
}

/// Flattens a `??` chain into its links, left to right.
pub(crate) fn coalesce_links<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr.strip_convert() {
        Expr::Binary(b) if b.op == BinaryOp::Coalesce => {
            coalesce_links(&b.left, out);
            coalesce_links(&b.right, out);
        }
        other => out.push(other),
    }
}

fn is_coalesce(expr: &Expr) -> bool {
    matches!(expr.strip_convert(), Expr::Binary(b) if b.op == BinaryOp::Coalesce)
}

fn is_constant(expr: &Expr) -> bool {
    matches!(expr.strip_convert(), Expr::Constant { .. })
}

/// `x OP y` rewritten as `y OP' x`.
fn mirror(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::LessThan => BinaryOp::GreaterThan,
        BinaryOp::LessThanOrEqual => BinaryOp::GreaterThanOrEqual,
        BinaryOp::GreaterThan => BinaryOp::LessThan,
        BinaryOp::GreaterThanOrEqual => BinaryOp::LessThanOrEqual,
        other => other,
    }
}

pub(crate) fn predicate_binary(
    v: &mut ExprVisitor<'_>,
    expr: &Expr,
    mode: RenderMode,
) -> TranslateResult<()> {
    let Expr::Binary(binary) = expr else {
        return v.visit_default(expr, mode);
    };
    if !mode.condition {
        return v.visit_default(expr, mode);
    }
    match binary.op {
        BinaryOp::AndAlso | BinaryOp::And => visit_logical(v, binary, true, mode),
        BinaryOp::OrElse | BinaryOp::Or => visit_logical(v, binary, false, mode),
        op if op.is_comparison() => visit_comparison(v, binary, mode.nested()),
        _ => bool_suffix(v, expr, mode),
    }
}

/// Truth value of a condition built only from boolean constants, `!`,
/// `&&` and `||`. An absorbing operand decides the operation on its own.
pub(crate) fn constant_truth(expr: &Expr) -> Option<bool> {
    if let Some(value) = expr.as_bool_constant() {
        return Some(value);
    }
    match expr.strip_convert() {
        Expr::Unary(u) if u.op == UnaryOp::Not => constant_truth(&u.operand).map(|b| !b),
        Expr::Binary(b) => {
            let and = match b.op {
                BinaryOp::AndAlso | BinaryOp::And => true,
                BinaryOp::OrElse | BinaryOp::Or => false,
                _ => return None,
            };
            let (left, right) = (constant_truth(&b.left), constant_truth(&b.right));
            if left == Some(!and) || right == Some(!and) {
                return Some(!and);
            }
            match (left, right) {
                (Some(_), Some(_)) => Some(and),
                _ => None,
            }
        }
        _ => None,
    }
}

fn visit_logical(
    v: &mut ExprVisitor<'_>,
    binary: &BinaryExpr,
    and: bool,
    mode: RenderMode,
) -> TranslateResult<()> {
    let left = constant_truth(&binary.left);
    let right = constant_truth(&binary.right);

    // `false && P` / `true || P`, on either side.
    let absorbing = !and;
    if left == Some(absorbing) || right == Some(absorbing) {
        log::debug!(
            "constant {} absorbs the {} operation",
            absorbing,
            if and { "AND" } else { "OR" }
        );
        if mode.filter_root {
            return Ok(());
        }
        v.write(if absorbing { "1 = 1" } else { "1 = 0" });
        return Ok(());
    }
    // `true && P` / `false || P`, on either side.
    match (left, right) {
        (Some(_), _) => return v.visit(&binary.right, mode),
        (_, Some(_)) => return v.visit(&binary.left, mode),
        _ => {}
    }

    let mode = mode.nested();
    if and {
        workflow(
            v,
            " AND ",
            |v| v.visit(&binary.right, mode),
            |v| v.visit(&binary.left, mode),
        )?;
    } else {
        wrap_non_empty(v, "(", ")", |v| {
            workflow(
                v,
                " OR ",
                |v| v.visit(&binary.right, mode),
                |v| v.visit(&binary.left, mode),
            )
            .map(|_| ())
        })?;
    }
    Ok(())
}

fn visit_comparison(
    v: &mut ExprVisitor<'_>,
    binary: &BinaryExpr,
    mode: RenderMode,
) -> TranslateResult<()> {
    let op = binary.op;
    let operand_mode = mode.as_value();

    if binary.left.is_null_constant() || binary.right.is_null_constant() {
        if binary.left.is_null_constant() && binary.right.is_null_constant() {
            v.write(if op == BinaryOp::Equal { "1 = 1" } else { "1 = 0" });
            return Ok(());
        }
        let operand = if binary.right.is_null_constant() {
            &binary.left
        } else {
            &binary.right
        };
        let suffix = match op {
            BinaryOp::Equal => "IS NULL",
            BinaryOp::NotEqual => "IS NOT NULL",
            other => {
                return Err(TranslateError::unsupported(format!(
                    "'{}' comparison against null",
                    other.sql_symbol()
                )))
            }
        };
        let text = v.capture(|v| v.visit(operand, operand_mode.ignoring_nullable(true)))?;
        v.write(&format!("{} {}", text, suffix));
        return Ok(());
    }

    if is_coalesce(&binary.left) {
        return visit_coalesce_comparison(v, &binary.left, op, &binary.right, operand_mode);
    }
    if is_coalesce(&binary.right) {
        return visit_coalesce_comparison(v, &binary.right, mirror(op), &binary.left, operand_mode);
    }

    let left_constant = is_constant(&binary.left);
    let right_constant = is_constant(&binary.right);
    let left = v.capture(|v| v.visit(&binary.left, operand_mode.ignoring_nullable(right_constant)))?;
    let right = v.capture(|v| v.visit(&binary.right, operand_mode.ignoring_nullable(left_constant)))?;

    let null_safe = !left_constant
        && !right_constant
        && v.is_nullable(&binary.left)
        && v.is_nullable(&binary.right);
    let text = match op {
        BinaryOp::Equal if null_safe => format!(
            "({l} = {r} OR ({l} IS NULL AND {r} IS NULL))",
            l = left,
            r = right
        ),
        BinaryOp::NotEqual if null_safe => format!(
            "({l} <> {r} OR ({l} IS NULL AND {r} IS NOT NULL) OR ({l} IS NOT NULL AND {r} IS NULL))",
            l = left,
            r = right
        ),
        op => format!("{} {} {}", left, op.sql_symbol(), right),
    };
    v.write(&text);
    Ok(())
}

/// `(a OP x OR (a IS NULL AND b OP x) OR (a IS NULL AND b IS NULL AND c OP x))`
fn visit_coalesce_comparison(
    v: &mut ExprVisitor<'_>,
    chain: &Expr,
    op: BinaryOp,
    other: &Expr,
    mode: RenderMode,
) -> TranslateResult<()> {
    let mut links = Vec::new();
    coalesce_links(chain, &mut links);

    let other_sql = v.capture(|v| v.visit(other, mode))?;
    let mut rendered = Vec::with_capacity(links.len());
    for link in &links {
        rendered.push(v.capture(|v| v.visit(link, mode.ignoring_nullable(true)))?);
    }

    let mut branches = Vec::with_capacity(rendered.len());
    for (i, link) in rendered.iter().enumerate() {
        let comparison = format!("{} {} {}", link, op.sql_symbol(), other_sql);
        if i == 0 {
            branches.push(comparison);
            continue;
        }
        let mut terms: Vec<String> = rendered[..i]
            .iter()
            .map(|previous| format!("{} IS NULL", previous))
            .collect();
        terms.push(comparison);
        branches.push(format!("({})", terms.join(" AND ")));
    }
    v.write(&format!("({})", branches.join(" OR ")));
    Ok(())
}

pub(crate) fn predicate_unary(
    v: &mut ExprVisitor<'_>,
    expr: &Expr,
    mode: RenderMode,
) -> TranslateResult<()> {
    if !mode.condition {
        return v.visit_default(expr, mode);
    }
    match expr {
        Expr::Unary(unary) if unary.op == UnaryOp::Not => {
            wrap_non_empty(v, "NOT (", ")", |v| v.visit(&unary.operand, mode.nested()))?;
            Ok(())
        }
        Expr::Unary(unary) if matches!(unary.op, UnaryOp::Convert | UnaryOp::Quote) => {
            v.visit(&unary.operand, mode)
        }
        _ => bool_suffix(v, expr, mode),
    }
}

/// Members and parameters in condition position.
pub(crate) fn predicate_reference(
    v: &mut ExprVisitor<'_>,
    expr: &Expr,
    mode: RenderMode,
) -> TranslateResult<()> {
    if !mode.condition {
        return v.visit_default(expr, mode);
    }
    if let Some((sub, env)) = v.substitution(expr)? {
        return v.with_env(env, |v| v.visit(&sub, mode));
    }
    if is_condition(expr) {
        return v.visit_default(expr, mode);
    }
    bool_suffix(v, expr, mode)
}

pub(crate) fn predicate_call(
    v: &mut ExprVisitor<'_>,
    expr: &Expr,
    mode: RenderMode,
) -> TranslateResult<()> {
    if !mode.condition || is_condition(expr) {
        return v.visit_default(expr, mode);
    }
    bool_suffix(v, expr, mode)
}

pub(crate) fn predicate_constant(
    v: &mut ExprVisitor<'_>,
    expr: &Expr,
    mode: RenderMode,
) -> TranslateResult<()> {
    if !mode.condition {
        return v.visit_default(expr, mode);
    }
    match expr.as_bool_constant() {
        Some(true) => v.write("1 = 1"),
        _ => v.write("1 = 0"),
    }
    Ok(())
}

pub(crate) fn predicate_conditional(
    v: &mut ExprVisitor<'_>,
    expr: &Expr,
    mode: RenderMode,
) -> TranslateResult<()> {
    let Expr::Conditional(conditional) = expr else {
        return v.visit_default(expr, mode);
    };
    if !mode.condition {
        return v.visit_default(expr, mode);
    }
    if let Some(test) = conditional.test.as_bool_constant() {
        let branch = if test {
            &conditional.if_true
        } else {
            &conditional.if_false
        };
        return v.visit(branch, mode.nested());
    }
    let value_mode = mode.as_value().with_variable_condition();
    let text = v.capture(|v| v.visit_default(expr, value_mode))?;
    if mode.variable_condition {
        v.write(&text);
    } else {
        let marker = v.ctx.parameter(Value::Bool(true));
        v.write(&format!("{} = {}", text, marker));
    }
    Ok(())
}

/// A boolean value used as a condition: `x = @p(true)`.
fn bool_suffix(v: &mut ExprVisitor<'_>, expr: &Expr, mode: RenderMode) -> TranslateResult<()> {
    let text = v.capture(|v| v.visit_default(expr, mode.as_value()))?;
    if mode.variable_condition {
        v.write(&text);
        return Ok(());
    }
    let marker = v.ctx.parameter(Value::Bool(true));
    v.write(&format!("{} = {}", text, marker));
    Ok(())
}
