//! Pagination accumulator
//!
//! `take` and `skip` are folded together as the operators are met, walking
//! outwards from the source:
//!
//! - `Skip(n)` adds to `skip` and shrinks an already bound `take`;
//! - `Take(n)` keeps the smaller bound;
//! - `ElementAt(i)` is `Skip(i).Take(1)`;
//! - `TakeLast`/`SkipLast` invert the ordering and flag the rows as reversed.
//!
//! Negative or contradictory arguments fail with a bounds error instead of
//! being clamped.

use super::errors::{TranslateError, TranslateResult};
use super::statement::{constant_int, SelectLevel, StatementCompiler, Terminal};
use crate::expression::MethodCall;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageWindow {
    /// `None` is unbounded
    pub take: Option<u64>,
    pub skip: u64,
    /// The SQL ordering was inverted; rows arrive last-first
    pub reverse: bool,
}

impl PageWindow {
    pub fn is_bound(&self) -> bool {
        self.take.is_some() || self.skip > 0
    }

    pub fn apply_take(&mut self, n: i64) -> TranslateResult<()> {
        let n = u64::try_from(n)
            .map_err(|_| TranslateError::bounds(format!("Take({}) with a negative count", n)))?;
        let take = self.take.map_or(n, |bound| bound.min(n));
        Self::check_end(self.skip, Some(take))?;
        self.take = Some(take);
        Ok(())
    }

    pub fn apply_skip(&mut self, n: i64) -> TranslateResult<()> {
        let n = u64::try_from(n)
            .map_err(|_| TranslateError::bounds(format!("Skip({}) with a negative count", n)))?;
        let take = match self.take {
            Some(bound) if n > bound => {
                return Err(TranslateError::bounds(format!(
                    "Skip({}) exceeds the {} rows already taken",
                    n, bound
                )));
            }
            Some(bound) => Some(bound - n),
            None => None,
        };
        let skip = self.skip.checked_add(n).ok_or_else(|| {
            TranslateError::bounds(format!("Skip({}) after skipping {} rows", n, self.skip))
        })?;
        Self::check_end(skip, take)?;
        self.skip = skip;
        self.take = take;
        Ok(())
    }

    /// The window's last row number, `skip + take`, must be representable.
    fn check_end(skip: u64, take: Option<u64>) -> TranslateResult<()> {
        match take {
            Some(n) if skip.checked_add(n).is_none() => Err(TranslateError::bounds(format!(
                "Take({}) after skipping {} rows",
                n, skip
            ))),
            _ => Ok(()),
        }
    }

    pub fn element_at(&mut self, index: i64) -> TranslateResult<()> {
        if index < 0 {
            return Err(TranslateError::bounds(format!("ElementAt({})", index)));
        }
        self.apply_skip(index)?;
        self.apply_take(1)
    }
}

fn require_reorderable(level: &SelectLevel, call: &MethodCall) -> TranslateResult<()> {
    if level.ordering.is_empty() {
        return Err(TranslateError::syntax(format!(
            "'{}' requires a preceding OrderBy",
            call.name
        )));
    }
    if level.page.is_bound() {
        return Err(TranslateError::syntax(format!(
            "'{}' cannot follow Take/Skip",
            call.name
        )));
    }
    Ok(())
}

pub(crate) fn apply_take(
    _c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    level.page.apply_take(constant_int(call, 1)?)
}

pub(crate) fn apply_skip(
    _c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    level.page.apply_skip(constant_int(call, 1)?)
}

pub(crate) fn apply_take_last(
    _c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    let n = constant_int(call, 1)?;
    require_reorderable(level, call)?;
    level.flip_ordering();
    level.page.reverse = !level.page.reverse;
    level.page.apply_take(n)
}

pub(crate) fn apply_skip_last(
    _c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    let n = constant_int(call, 1)?;
    require_reorderable(level, call)?;
    level.flip_ordering();
    level.page.reverse = !level.page.reverse;
    level.page.apply_skip(n)
}

pub(crate) fn apply_element_at(
    _c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    level.page.element_at(constant_int(call, 1)?)?;
    let or_default = call.name.ends_with("OrDefault");
    level.terminal = Some(Terminal::row(or_default));
    Ok(())
}

/// Inverts the ordering; later pagination then counts from the other end.
pub(crate) fn apply_reverse(
    _c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    require_reorderable(level, call)?;
    level.flip_ordering();
    Ok(())
}
