//! Set operations
//!
//! `Union`, `Concat`, `Intersect` and `Except` finalize the current level as
//! the left branch and compile the argument as an independent right branch.
//! The combined text seals the level; any further operator wraps it as a
//! derived table first.

use std::mem;

use super::errors::{TranslateError, TranslateResult};
use super::statement::{compile_nested, Finalized, Purpose, SelectLevel, StatementCompiler};
use crate::expression::MethodCall;

fn keyword(c: &StatementCompiler<'_>, name: &str) -> TranslateResult<String> {
    Ok(match name {
        "Union" => "UNION".to_string(),
        "Concat" => "UNION ALL".to_string(),
        "Intersect" => "INTERSECT".to_string(),
        "Except" => c.ctx.dialect.except_keyword.clone(),
        other => {
            return Err(TranslateError::unsupported(format!(
                "set operation '{}'",
                other
            )))
        }
    })
}

pub(crate) fn apply_set_operation(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    let other = call.arg(1).ok_or_else(|| {
        TranslateError::unsupported(format!("'{}' without a second sequence", call.name))
    })?;
    if !other.is_query() {
        return Err(TranslateError::unsupported(format!(
            "'{}' with an in-memory sequence",
            call.name
        )));
    }
    let keyword = keyword(c, &call.name)?;

    let left_level = mem::replace(level, SelectLevel::placeholder());
    let left = c.finalize(left_level, Purpose::SetBranch)?;
    let env = c.env.clone();
    let right = compile_nested(&mut *c.ctx, env, other, Purpose::SetBranch)?;
    if left.columns.len() != right.columns.len() {
        return Err(TranslateError::unsupported(format!(
            "'{}' branches project {} and {} columns",
            call.name,
            left.columns.len(),
            right.columns.len()
        )));
    }

    log::debug!("{} over {} column(s)", keyword, left.columns.len());
    level.sealed = Some(Finalized {
        sql: format!("{} {} {}", left.sql, keyword, right.sql),
        columns: left.columns,
        scalar: left.scalar,
    });
    Ok(())
}
