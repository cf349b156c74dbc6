//! Statement compiler
//!
//! Walks a chain of query operators from the source outwards, accumulating
//! one `SELECT` level at a time:
//!
//! ```text
//! FROM/JOIN ... WHERE ... GROUP BY ... HAVING ...     (main buffer)
//! ORDER BY ...                                        (ordering items)
//! take/skip/reverse                                   (page window)
//! ```
//!
//! The select list is only rendered when the level is finalized, then put in
//! front of everything else through the writer's insertion cursor. An operator
//! that cannot be merged into the current level (filtering after `Take`,
//! counting a grouped query, anything after `Union`, ...) seals the level and
//! continues on `SELECT .. FROM (<sealed>) tN`.

use std::mem;
use std::rc::Rc;

use super::context::{Clause, RenderMode, TranslationContext};
use super::dispatch;
use super::errors::{TranslateError, TranslateResult};
use super::expr_visitor::ExprVisitor;
use super::pagination::PageWindow;
use super::predicate::constant_truth;
use super::scope::{DerivedColumn, DerivedTarget, Env, TableTarget, Target};
use super::select_builder::{self, SelectColumn};
use crate::expression::{Category, Expr, LambdaExpr, MethodCall, UnaryOp, Value};
use crate::writer::{SqlBuffer, SqlWriter};

/// Message attached to required single-row and aggregate results.
pub const NO_ELEMENTS: &str = "Sequence contains no elements";

/// What a finalized `SELECT` is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Purpose {
    /// The outermost statement handed to the caller
    Statement,
    /// Wrapped as `FROM (...) alias`
    Derived,
    /// A subquery inside an expression
    Nested,
    /// One side of a set operation
    SetBranch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OrderItem {
    pub sql: String,
    pub descending: bool,
}

/// Position of the emitted ` GROUP BY ...` text in the main buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupState {
    pub keys: Vec<String>,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Existence {
    Exists,
    NotExists,
    /// `value IN (SELECT ...)`
    Member(String),
}

/// Result-shape metadata for single-row and required aggregate terminals.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Terminal {
    pub required: bool,
    pub default_value: Option<Value>,
    pub message: Option<String>,
}

impl Terminal {
    pub(crate) fn row(or_default: bool) -> Self {
        Self {
            required: !or_default,
            default_value: or_default.then_some(Value::Null),
            message: (!or_default).then(|| NO_ELEMENTS.to_string()),
        }
    }

    fn required() -> Self {
        Self::row(false)
    }
}

/// A complete `SELECT` text with the names of its output columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Finalized {
    pub sql: String,
    pub columns: Vec<SelectColumn>,
    pub scalar: Option<String>,
}

/// One `SELECT` under construction.
pub(crate) struct SelectLevel {
    pub writer: SqlWriter,
    /// What each row of the level is
    pub element: Target,
    /// End of the `FROM`/`JOIN` part; joins are inserted here
    pub from_end: usize,
    pub has_where: bool,
    pub group: Option<GroupState>,
    pub has_having: bool,
    pub select_fixed: bool,
    pub aggregate: Option<String>,
    pub existence: Option<Existence>,
    pub distinct: bool,
    pub page: PageWindow,
    pub ordering: Vec<OrderItem>,
    pub terminal: Option<Terminal>,
    /// Set-operation result; the level has no clauses of its own
    pub sealed: Option<Finalized>,
}

impl SelectLevel {
    pub fn new(element: Target) -> Self {
        Self {
            writer: SqlWriter::new(),
            element,
            from_end: 0,
            has_where: false,
            group: None,
            has_having: false,
            select_fixed: false,
            aggregate: None,
            existence: None,
            distinct: false,
            page: PageWindow::default(),
            ordering: Vec::new(),
            terminal: None,
            sealed: None,
        }
    }

    /// An empty level used while the real one is moved out.
    pub fn placeholder() -> Self {
        Self::new(Target::Derived(Rc::new(DerivedTarget {
            alias: String::new(),
            columns: Vec::new(),
            scalar: None,
        })))
    }

    /// A terminal operator was applied; nothing may follow.
    pub fn is_closed(&self) -> bool {
        self.terminal.is_some() || self.aggregate.is_some() || self.existence.is_some()
    }

    pub fn flip_ordering(&mut self) {
        for item in &mut self.ordering {
            item.descending = !item.descending;
        }
    }
}

pub(crate) struct StatementCompiler<'c> {
    pub ctx: &'c mut TranslationContext,
    /// Bindings of the enclosing statement (for correlated subqueries)
    pub env: Env,
}

impl<'c> StatementCompiler<'c> {
    pub fn new(ctx: &'c mut TranslationContext, env: Env) -> Self {
        Self { ctx, env }
    }

    pub fn compile_level(&mut self, expr: &Expr) -> TranslateResult<SelectLevel> {
        match expr {
            Expr::Constant {
                value: Value::Source(entity),
            } => {
                let table = self.ctx.new_table(entity)?;
                let from = format!(
                    " FROM {} {}",
                    self.ctx.dialect.quote_path(&table.info.table_name),
                    table.alias
                );
                let mut level = SelectLevel::new(Target::table(table));
                level.writer.main_mut().write(&from);
                level.from_end = level.writer.main().len();
                Ok(level)
            }
            Expr::Call(call) if call.category == Category::QueryOperators => {
                let source = call.receiver().ok_or_else(|| {
                    TranslateError::unsupported(format!("'{}' without a source", call.name))
                })?;
                let mut level = self.compile_level(source)?;
                self.apply_operator(&mut level, call)?;
                Ok(level)
            }
            Expr::Call(call) if call.is(Category::CustomExtension, "TimeOut") => {
                let source = call.receiver().ok_or_else(|| {
                    TranslateError::unsupported("'TimeOut' without a source")
                })?;
                let level = self.compile_level(source)?;
                let seconds = constant_int(call, 1)?;
                let seconds = u32::try_from(seconds).map_err(|_| {
                    TranslateError::bounds(format!("timeout of {} seconds", seconds))
                })?;
                self.ctx.timeout = Some(seconds);
                Ok(level)
            }
            Expr::Unary(unary) if matches!(unary.op, UnaryOp::Convert | UnaryOp::Quote) => {
                self.compile_level(&unary.operand)
            }
            other => Err(TranslateError::unsupported(format!(
                "{:?} node as a query source",
                other.kind()
            ))),
        }
    }

    fn apply_operator(&mut self, level: &mut SelectLevel, call: &MethodCall) -> TranslateResult<()> {
        log::debug!(
            "applying {} (scope depth {})",
            call.name,
            self.ctx.scope.depth()
        );
        if level.is_closed() {
            return Err(TranslateError::syntax(format!(
                "'{}' cannot follow a terminal operator",
                call.name
            )));
        }
        let handler = dispatch::operator(&call.name).ok_or_else(|| {
            TranslateError::unsupported(format!("query operator '{}'", call.name))
        })?;
        if level.sealed.is_some() {
            self.wrap_derived(level)?;
        }
        handler(self, level, call)
    }

    /// Seals `level` and replaces it with `SELECT .. FROM (<level>) tN`.
    pub fn wrap_derived(&mut self, level: &mut SelectLevel) -> TranslateResult<()> {
        let inner = mem::replace(level, SelectLevel::placeholder());
        let reverse = inner.page.reverse;
        let finalized = self.finalize(inner, Purpose::Derived)?;
        let alias = self.ctx.aliases.next_alias();
        log::debug!("wrapping level as derived table {}", alias);

        let columns: Vec<DerivedColumn> = finalized.columns.into_iter().map(Into::into).collect();
        let derived = DerivedTarget {
            alias: alias.clone(),
            columns,
            scalar: finalized.scalar,
        };
        let mut fresh = SelectLevel::new(Target::Derived(Rc::new(derived)));
        fresh
            .writer
            .main_mut()
            .write(&format!(" FROM ({}) {}", finalized.sql, alias));
        fresh.from_end = fresh.writer.main().len();
        fresh.page.reverse = reverse;
        *level = fresh;
        Ok(())
    }

    pub fn finalize(&mut self, mut level: SelectLevel, purpose: Purpose) -> TranslateResult<Finalized> {
        if purpose == Purpose::SetBranch && (level.page.is_bound() || level.sealed.is_some()) {
            self.wrap_derived(&mut level)?;
        }
        if let Some(sealed) = level.sealed.take() {
            let sql = match purpose {
                Purpose::Nested => format!("({})", sealed.sql),
                _ => sealed.sql,
            };
            return Ok(Finalized { sql, ..sealed });
        }

        let (list, columns, scalar) = match (&level.aggregate, &level.existence) {
            (Some(aggregate), _) => (
                aggregate.clone(),
                vec![SelectColumn {
                    member: "Value".to_string(),
                    name: "Value".to_string(),
                }],
                Some("Value".to_string()),
            ),
            (None, Some(Existence::Exists | Existence::NotExists)) => {
                ("1".to_string(), Vec::new(), None)
            }
            _ => {
                let list = select_builder::render_select_list(self, &mut level, purpose)?;
                (list.text, list.columns, list.scalar)
            }
        };
        if matches!(level.existence, Some(Existence::Member(_))) && columns.len() != 1 {
            return Err(TranslateError::unsupported(
                "Contains over rows with more than one column",
            ));
        }

        let head = if level.distinct {
            format!("SELECT DISTINCT {}", list)
        } else {
            format!("SELECT {}", list)
        };
        level.writer.prepend(&head);
        let order_text = level
            .ordering
            .iter()
            .map(|item| {
                if item.descending {
                    format!("{} DESC", item.sql)
                } else {
                    item.sql.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        level.writer.set_order_by(&order_text);

        let dialect = self.ctx.dialect.clone();
        let (body, order_by) = level.writer.into_parts();
        let sql = if level.page.is_bound() {
            dialect.paginate(&body, level.page.take, level.page.skip, &order_by)
        } else if purpose == Purpose::Statement && level.existence.is_none() && !order_by.is_empty() {
            format!("{} ORDER BY {}", body, order_by)
        } else {
            if !order_by.is_empty() {
                log::debug!("dropping ORDER BY {} from {:?} select", order_by, purpose);
            }
            body
        };

        let sql = match (&level.existence, purpose) {
            (Some(existence), Purpose::Statement) => format!(
                "SELECT CASE WHEN {} THEN {} ELSE {} END{}",
                existence_test(existence, &sql),
                dialect.bool_literal(true),
                dialect.bool_literal(false),
                dialect.from_dummy()
            ),
            (Some(existence), _) => existence_test(existence, &sql),
            (None, Purpose::Nested) => format!("({})", sql),
            (None, _) => sql,
        };

        Ok(Finalized {
            sql,
            columns,
            scalar,
        })
    }

    /// Renders `expr` into a fresh buffer.
    pub fn render(
        &mut self,
        clause: Clause,
        env: Env,
        expr: &Expr,
        mode: RenderMode,
    ) -> TranslateResult<String> {
        let mut buffer = SqlBuffer::new();
        {
            let mut v = ExprVisitor::new(&mut *self.ctx, &mut buffer, clause, env);
            v.visit(expr, mode)?;
        }
        Ok(buffer.into_string())
    }

    /// Binds the lambda's parameters, in order, to `targets`.
    pub fn bind_lambda(&self, lambda: &LambdaExpr, targets: &[Target]) -> TranslateResult<Env> {
        if lambda.params.len() > targets.len() {
            return Err(TranslateError::unsupported(format!(
                "lambda with {} parameters where {} expected",
                lambda.params.len(),
                targets.len()
            )));
        }
        let mut env = self.env.clone();
        for (param, target) in lambda.params.iter().zip(targets) {
            env = env.bind(&param.name, target.clone());
        }
        Ok(env)
    }
}

fn existence_test(existence: &Existence, sql: &str) -> String {
    match existence {
        Existence::Exists => format!("EXISTS ({})", sql),
        Existence::NotExists => format!("NOT EXISTS ({})", sql),
        Existence::Member(value) => format!("{} IN ({})", value, sql),
    }
}

/// Compiles a subordinate statement in its own alias frame.
pub(crate) fn compile_nested(
    ctx: &mut TranslationContext,
    env: Env,
    expr: &Expr,
    purpose: Purpose,
) -> TranslateResult<Finalized> {
    ctx.scope.push();
    let result = {
        let mut compiler = StatementCompiler::new(ctx, env);
        compiler
            .compile_level(expr)
            .and_then(|level| compiler.finalize(level, purpose))
    };
    ctx.scope.pop();
    result
}

pub(crate) fn lambda_arg<'e>(call: &'e MethodCall, index: usize) -> TranslateResult<&'e LambdaExpr> {
    call.arg(index)
        .and_then(Expr::as_lambda)
        .ok_or_else(|| {
            TranslateError::unsupported(format!("'{}' expects a lambda argument", call.name))
        })
}

pub(crate) fn optional_lambda(call: &MethodCall, index: usize) -> Option<&LambdaExpr> {
    call.arg(index).and_then(Expr::as_lambda)
}

pub(crate) fn constant_int(call: &MethodCall, index: usize) -> TranslateResult<i64> {
    call.arg(index)
        .and_then(|arg| arg.strip_convert().as_constant())
        .and_then(Value::as_int)
        .ok_or_else(|| {
            TranslateError::unsupported(format!("'{}' expects a constant integer", call.name))
        })
}

/// Adds `WHERE`/`HAVING` terms for a row predicate.
pub(crate) fn filter(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    predicate: &LambdaExpr,
    negate: bool,
) -> TranslateResult<()> {
    if predicate.params.len() != 1 {
        return Err(TranslateError::unsupported("indexed predicate"));
    }
    if level.page.is_bound() {
        c.wrap_derived(level)?;
    }
    let env = c.bind_lambda(predicate, &[level.element.clone()])?;
    let grouped = level.group.is_some();
    let clause = if grouped { Clause::Having } else { Clause::Predicate };
    let text = c.render(clause, env, &predicate.body, RenderMode::filter_root())?;
    let text = if negate {
        // An empty predicate keeps every row, so its negation keeps none.
        match (constant_truth(&predicate.body), text.is_empty()) {
            (Some(false), _) => String::new(),
            (Some(true), _) | (None, true) => "1 = 0".to_string(),
            (None, false) => format!("NOT ({})", text),
        }
    } else {
        text
    };
    if text.is_empty() {
        log::debug!("predicate folded away");
        return Ok(());
    }

    let keyword = match (grouped, level.has_having, level.has_where) {
        (true, false, _) => " HAVING ",
        (false, _, false) => " WHERE ",
        _ => " AND ",
    };
    if grouped {
        level.has_having = true;
    } else {
        level.has_where = true;
    }
    let main = level.writer.main_mut();
    main.set_insertion_point(None);
    main.write(keyword);
    main.write(&text);
    Ok(())
}

pub(crate) fn apply_where(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    filter(c, level, lambda_arg(call, 1)?, false)
}

pub(crate) fn apply_skip_while(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    filter(c, level, lambda_arg(call, 1)?, true)
}

pub(crate) fn apply_select(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    if level.select_fixed {
        return Err(TranslateError::syntax(
            "Select may only be applied once per query level",
        ));
    }
    let selector = lambda_arg(call, 1)?;
    if selector.params.len() != 1 {
        return Err(TranslateError::unsupported("indexed Select"));
    }
    if level.distinct {
        c.wrap_derived(level)?;
    }
    let env = c.bind_lambda(selector, &[level.element.clone()])?;
    level.element = Target::bound(&selector.body, &env);
    level.select_fixed = true;
    Ok(())
}

pub(crate) fn apply_distinct(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    _call: &MethodCall,
) -> TranslateResult<()> {
    if level.page.is_bound() {
        c.wrap_derived(level)?;
    }
    level.distinct = true;
    Ok(())
}

pub(crate) fn apply_order_by(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    let key = lambda_arg(call, 1)?;
    let primary = call.name.starts_with("OrderBy");
    let descending = call.name.ends_with("Descending");

    if primary {
        if level.page.is_bound() {
            c.wrap_derived(level)?;
        }
        level.ordering.clear();
        level.page.reverse = false;
    } else if level.ordering.is_empty() {
        return Err(TranslateError::syntax(format!(
            "'{}' requires a preceding OrderBy",
            call.name
        )));
    } else if level.page.is_bound() {
        return Err(TranslateError::syntax(format!(
            "'{}' cannot follow pagination",
            call.name
        )));
    }

    let env = c.bind_lambda(key, &[level.element.clone()])?;
    let keys: Vec<&Expr> = match key.body.strip_convert() {
        Expr::New(new) => new.bindings.iter().map(|b| &b.expr).collect(),
        body => vec![body],
    };
    for key in keys {
        let sql = c.render(Clause::OrderBy, env.clone(), key, RenderMode::value())?;
        if !sql.is_empty() {
            level.ordering.push(OrderItem { sql, descending });
        }
    }
    Ok(())
}

pub(crate) fn apply_cast(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    let target_type = call.type_args.first().ok_or_else(|| {
        TranslateError::unsupported(format!("'{}' without a target type", call.name))
    })?;
    let Target::Table(table) = &level.element else {
        return Err(TranslateError::unsupported(format!(
            "'{}' over a projected or derived sequence",
            call.name
        )));
    };
    let cast = c.ctx.resolve(target_type)?;
    let narrowed = TableTarget {
        alias: table.alias.clone(),
        info: table.info.clone(),
        cast: Some(cast),
        default: table.default.clone(),
    };
    c.ctx.scope.register(narrowed.key(), &narrowed.alias);
    level.element = Target::table(narrowed);
    Ok(())
}

pub(crate) fn apply_default_if_empty(
    _c: &mut StatementCompiler<'_>,
    _level: &mut SelectLevel,
    _call: &MethodCall,
) -> TranslateResult<()> {
    Err(TranslateError::unsupported(
        "DefaultIfEmpty outside a SelectMany collection selector",
    ))
}

/// `First`, `Single`, `Last` and their `OrDefault` forms.
pub(crate) fn apply_single_row(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    if let Some(predicate) = optional_lambda(call, 1) {
        filter(c, level, predicate, false)?;
    }
    if call.name.starts_with("Last") {
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
        level.flip_ordering();
    }
    level.page.apply_take(1)?;
    level.terminal = Some(Terminal::row(call.name.ends_with("OrDefault")));
    Ok(())
}

/// `Count`, `LongCount`, `Sum`, `Min`, `Max`, `Average`.
pub(crate) fn apply_aggregate(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    let name = call.name.as_str();
    let counting = matches!(name, "Count" | "LongCount");
    if counting {
        if let Some(predicate) = optional_lambda(call, 1) {
            filter(c, level, predicate, false)?;
        }
    }
    if level.page.is_bound() || level.distinct || level.group.is_some() {
        c.wrap_derived(level)?;
    }

    let text = if counting {
        "COUNT(1)".to_string()
    } else {
        let operand = match optional_lambda(call, 1) {
            Some(selector) => {
                let env = c.bind_lambda(selector, &[level.element.clone()])?;
                c.render(Clause::Select, env, &selector.body, RenderMode::value().aggregating())?
            }
            None => element_value(c, &level.element)?,
        };
        match name {
            "Sum" => format!("COALESCE(SUM({}), 0)", operand),
            "Min" => format!("MIN({})", operand),
            "Max" => format!("MAX({})", operand),
            _ => format!("AVG({})", operand),
        }
    };
    level.ordering.clear();
    level.aggregate = Some(text);
    if matches!(name, "Min" | "Max" | "Average") {
        level.terminal = Some(Terminal::required());
    }
    Ok(())
}

/// The value of each row of a scalar sequence.
fn element_value(c: &mut StatementCompiler<'_>, element: &Target) -> TranslateResult<String> {
    match element {
        Target::Bound { expr, env } => {
            c.render(Clause::Select, env.clone(), expr, RenderMode::value().aggregating())
        }
        Target::Derived(derived) if derived.scalar.is_some() => {
            let column = derived.scalar.as_deref().unwrap_or_default();
            Ok(c.ctx.dialect.qualify(&derived.alias, column))
        }
        _ => Err(TranslateError::unsupported(
            "aggregate over entity rows without a selector",
        )),
    }
}

/// `Any`, `All`, `Contains`.
pub(crate) fn apply_existence(
    c: &mut StatementCompiler<'_>,
    level: &mut SelectLevel,
    call: &MethodCall,
) -> TranslateResult<()> {
    let existence = match call.name.as_str() {
        "Any" => {
            if let Some(predicate) = optional_lambda(call, 1) {
                filter(c, level, predicate, false)?;
            }
            Existence::Exists
        }
        "All" => {
            filter(c, level, lambda_arg(call, 1)?, true)?;
            Existence::NotExists
        }
        _ => {
            let value = call.arg(1).ok_or_else(|| {
                TranslateError::unsupported("Contains without a value")
            })?;
            let env = c.env.clone();
            let sql = c.render(Clause::Select, env, value, RenderMode::value())?;
            Existence::Member(sql)
        }
    };
    level.ordering.clear();
    level.existence = Some(existence);
    Ok(())
}
