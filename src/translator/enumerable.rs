//! In-memory collections
//!
//! `ids.Contains(u.Id)` and `names.Any(n => u.Name.StartsWith(n))` over a
//! literal list are unrolled into an `OR` chain, one branch per element, with
//! the lambda parameter bound to that element's value. The list never
//! becomes a relation in SQL.

use super::context::RenderMode;
use super::errors::{TranslateError, TranslateResult};
use super::expr_visitor::ExprVisitor;
use super::scope::{Env, Target};
use super::statement::optional_lambda;
use crate::expression::{builder, Expr, LambdaExpr, MethodCall, Value};

pub(crate) fn is_in_memory_list(expr: &Expr) -> bool {
    matches!(
        expr.strip_convert(),
        Expr::Constant {
            value: Value::List(_)
        }
    )
}

fn list_items<'e>(v: &ExprVisitor<'_>, call: &'e MethodCall) -> TranslateResult<&'e [Value]> {
    let items = match call.receiver().map(Expr::strip_convert) {
        Some(Expr::Constant {
            value: Value::List(items),
        }) => items.as_slice(),
        _ => {
            return Err(TranslateError::unsupported(format!(
                "'{}' over a sequence that is neither a query nor a constant list",
                call.name
            )))
        }
    };
    if items.len() > v.ctx.max_list_unroll {
        return Err(TranslateError::unsupported(format!(
            "in-memory list of {} elements (at most {} are unrolled)",
            items.len(),
            v.ctx.max_list_unroll
        )));
    }
    Ok(items)
}

/// One branch per element with `lambda`'s parameter bound to it.
fn per_element(
    v: &mut ExprVisitor<'_>,
    items: &[Value],
    lambda: &LambdaExpr,
) -> TranslateResult<Vec<String>> {
    let Some(param) = lambda.params.first() else {
        return Err(TranslateError::unsupported("element lambda without a parameter"));
    };
    let mut branches = Vec::with_capacity(items.len());
    for item in items {
        let element = Expr::Constant {
            value: item.clone(),
        };
        let env = v.env.bind(&param.name, Target::bound(&element, &Env::new()));
        let text = v.with_env(env, |v| {
            v.capture(|v| v.visit_condition(&lambda.body, RenderMode::condition()))
        })?;
        branches.push(if text.is_empty() { "1 = 1".to_string() } else { text });
    }
    Ok(branches)
}

fn chain(branches: Vec<String>, joiner: &str, empty: &str) -> String {
    match branches.len() {
        0 => empty.to_string(),
        1 => branches.into_iter().next().unwrap_or_default(),
        _ => format!("({})", branches.join(joiner)),
    }
}

pub(crate) fn visit_enumerable_call(
    v: &mut ExprVisitor<'_>,
    call: &MethodCall,
    _mode: RenderMode,
) -> TranslateResult<()> {
    let items = list_items(v, call)?;
    let text = match call.name.as_str() {
        "Contains" => {
            let value = call.arg(1).ok_or_else(|| {
                TranslateError::unsupported("Contains without a value")
            })?;
            let mut branches = Vec::with_capacity(items.len());
            for item in items {
                let test = builder::eq(
                    value.clone(),
                    Expr::Constant {
                        value: item.clone(),
                    },
                );
                branches.push(v.capture(|v| v.visit_condition(&test, RenderMode::condition()))?);
            }
            chain(branches, " OR ", "1 = 0")
        }
        "Any" => match optional_lambda(call, 1) {
            Some(predicate) => chain(per_element(v, items, predicate)?, " OR ", "1 = 0"),
            None if items.is_empty() => "1 = 0".to_string(),
            None => "1 = 1".to_string(),
        },
        "All" => {
            let predicate = optional_lambda(call, 1).ok_or_else(|| {
                TranslateError::unsupported("All without a predicate")
            })?;
            chain(per_element(v, items, predicate)?, " AND ", "1 = 1")
        }
        other => {
            return Err(TranslateError::unsupported(format!(
                "'{}' over an in-memory list",
                other
            )))
        }
    };
    log::trace!("unrolled {} over {} element(s)", call.name, items.len());
    v.write(&text);
    Ok(())
}
