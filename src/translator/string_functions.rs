//! String method translation
//!
//! `Contains`/`StartsWith`/`EndsWith` become `LIKE`. A constant argument is
//! turned into a single pattern parameter (`'%an%'`); anything else gets the
//! wildcards spliced in with the dialect's concatenation. `Substring` and
//! `IndexOf` are `CASE`-guarded so that zero-based host semantics survive
//! the engines' one-based functions.
//!
//! Unknown string methods fall through to the custom-function visitors.

use std::sync::Arc;

use super::context::RenderMode;
use super::errors::{TranslateError, TranslateResult};
use super::expr_visitor::ExprVisitor;
use crate::expression::{builder, MethodCall, Value};

/// Whether the string method produces a string (for `+` as concatenation).
pub(crate) fn returns_string(name: &str) -> bool {
    matches!(
        name,
        "Replace"
            | "ToUpper"
            | "ToUpperInvariant"
            | "ToLower"
            | "ToLowerInvariant"
            | "Trim"
            | "TrimStart"
            | "TrimEnd"
            | "Substring"
            | "Concat"
    )
}

fn operand(v: &mut ExprVisitor<'_>, call: &MethodCall, index: usize) -> TranslateResult<String> {
    let arg = call.arg(index).ok_or_else(|| {
        TranslateError::unsupported(format!(
            "'{}' expects at least {} argument(s)",
            call.name,
            index + 1
        ))
    })?;
    v.render_value(arg)
}

pub(crate) fn visit_string_call(
    v: &mut ExprVisitor<'_>,
    call: &MethodCall,
    mode: RenderMode,
) -> TranslateResult<()> {
    let name = call.name.as_str();
    let text = match name {
        "Contains" | "StartsWith" | "EndsWith" => like(v, call)?,
        "IsNullOrEmpty" => {
            let x = operand(v, call, 0)?;
            format!("({x} IS NULL OR {x} = '')", x = x)
        }
        "IsNullOrWhiteSpace" => {
            let x = operand(v, call, 0)?;
            format!("({x} IS NULL OR TRIM({x}) = '')", x = x)
        }
        "Equals" => {
            let (Some(left), Some(right)) = (call.arg(0), call.arg(1)) else {
                return Err(TranslateError::unsupported("Equals expects two operands"));
            };
            let test = builder::eq(left.clone(), right.clone());
            return v.visit_condition(&test, mode);
        }
        "ToUpper" | "ToUpperInvariant" => format!("UPPER({})", operand(v, call, 0)?),
        "ToLower" | "ToLowerInvariant" => format!("LOWER({})", operand(v, call, 0)?),
        "Trim" | "TrimStart" | "TrimEnd" => {
            if call.args.len() > 1 {
                return Err(TranslateError::unsupported(format!(
                    "'{}' with explicit characters",
                    name
                )));
            }
            let function = match name {
                "Trim" => "TRIM",
                "TrimStart" => "LTRIM",
                _ => "RTRIM",
            };
            format!("{}({})", function, operand(v, call, 0)?)
        }
        "Replace" => {
            let x = operand(v, call, 0)?;
            let from = operand(v, call, 1)?;
            let to = operand(v, call, 2)?;
            format!("REPLACE({}, {}, {})", x, from, to)
        }
        "Substring" => substring(v, call)?,
        "IndexOf" => index_of(v, call)?,
        "Concat" => {
            let mut parts = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                parts.push(v.render_value(arg)?);
            }
            v.ctx.dialect.concat(&parts)
        }
        _ => return v.visit_custom_call(call),
    };
    v.write(&text);
    Ok(())
}

fn like(v: &mut ExprVisitor<'_>, call: &MethodCall) -> TranslateResult<String> {
    let name = call.name.as_str();
    let target = operand(v, call, 0)?;
    let arg = call
        .arg(1)
        .ok_or_else(|| TranslateError::unsupported(format!("'{}' without a pattern", name)))?;

    let pattern = match arg.strip_convert().as_constant() {
        Some(Value::String(s)) => {
            let pattern = match name {
                "Contains" => format!("%{}%", s),
                "StartsWith" => format!("{}%", s),
                _ => format!("%{}", s),
            };
            v.ctx.parameter(Value::String(pattern))
        }
        Some(Value::Null) => {
            return Err(TranslateError::unsupported(format!(
                "'{}' with a null pattern",
                name
            )))
        }
        _ => {
            let value = v.render_value(arg)?;
            let wildcard = "'%'".to_string();
            let parts = match name {
                "Contains" => vec![wildcard.clone(), value, wildcard],
                "StartsWith" => vec![value, wildcard],
                _ => vec![wildcard, value],
            };
            v.ctx.dialect.concat(&parts)
        }
    };
    Ok(format!("{} LIKE {}", target, pattern))
}

/// `x.Substring(start[, length])`: zero-based start, empty past the end.
fn substring(v: &mut ExprVisitor<'_>, call: &MethodCall) -> TranslateResult<String> {
    let dialect = Arc::clone(&v.ctx.dialect);
    let x = operand(v, call, 0)?;
    let start = operand(v, call, 1)?;
    let length = match call.arg(2) {
        Some(arg) => v.render_value(arg)?,
        None => format!("{}({})", dialect.length_function, x),
    };
    Ok(format!(
        "CASE WHEN {x} IS NULL THEN NULL WHEN {len}({x}) > {start} THEN {substr}({x}, {start} + 1, {length}) ELSE '' END",
        x = x,
        len = dialect.length_function,
        start = start,
        substr = dialect.substring_function,
        length = length
    ))
}

/// `x.IndexOf(needle)`: zero-based, `-1` when absent, `0` for an empty needle.
fn index_of(v: &mut ExprVisitor<'_>, call: &MethodCall) -> TranslateResult<String> {
    if call.args.len() > 2 {
        return Err(TranslateError::unsupported("IndexOf with a start index"));
    }
    let dialect = Arc::clone(&v.ctx.dialect);
    let haystack = operand(v, call, 0)?;
    let needle = operand(v, call, 1)?;
    let (first, second) = dialect.index_of_args(&haystack, &needle);
    Ok(format!(
        "CASE WHEN {needle} = '' THEN 0 ELSE {function}({first}, {second}) - 1 END",
        needle = needle,
        function = dialect.index_of_function,
        first = first,
        second = second
    ))
}
