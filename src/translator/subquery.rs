//! Nested subqueries
//!
//! A query used inside an expression (`orders.Any(o => ..)`, a scalar
//! `Count()`, `Contains` membership) is compiled as an independent statement
//! into its own buffer and spliced in once complete. Lambda parameters of the
//! enclosing statement stay visible, which makes the subquery correlated.

use super::errors::TranslateResult;
use super::expr_visitor::ExprVisitor;
use super::statement::{compile_nested, Purpose};
use crate::expression::Expr;

pub(crate) fn visit_subquery(v: &mut ExprVisitor<'_>, expr: &Expr) -> TranslateResult<()> {
    let env = v.env.clone();
    let nested = compile_nested(&mut *v.ctx, env, expr, Purpose::Nested)?;
    log::trace!("subquery: {}", nested.sql);
    v.write(&nested.sql);
    Ok(())
}
