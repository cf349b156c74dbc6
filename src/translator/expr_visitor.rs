//! Expression visitor
//!
//! One traversal engine shared by every clause. The active [`Clause`] picks
//! per-node-kind overrides from the table in [`super::dispatch`]; everything
//! without an override renders through [`ExprVisitor::visit_default`].
//!
//! Lambda parameters resolve through the [`Env`] captured when their operator
//! was compiled. A reference can be:
//!
//! - a column of a table alias (`t.Name`), possibly with an outer-join default;
//! - a substitution (a projected member, a group key, a list element) rendered
//!   in the environment it was defined in;
//! - a column of a derived table.

use std::sync::Arc;

use super::context::{Clause, RenderMode, TranslationContext};
use super::dispatch;
use super::enumerable;
use super::errors::{TranslateError, TranslateResult};
use super::group_by_builder;
use super::predicate;
use super::scope::{AliasKey, DefaultSubstitution, DerivedTarget, Env, TableTarget, Target};
use super::select_builder::SelectColumn;
use super::string_functions;
use super::subquery;
use crate::expression::{
    BinaryExpr, BinaryOp, Category, ConditionalExpr, Expr, ExprType, MemberAccess, MethodCall,
    ScalarKind, SwitchExpr, UnaryOp, Value,
};
use crate::metadata::{ColumnInfo, MetadataError};
use crate::writer::{workflow, wrap_non_empty, BufferHost, SqlBuffer};

pub(crate) struct ExprVisitor<'a> {
    pub ctx: &'a mut TranslationContext,
    out: &'a mut SqlBuffer,
    pub clause: Clause,
    pub env: Env,
    /// Rendering inside a grouped `SELECT` level
    pub grouped: bool,
    /// Key columns a grouped projection needs appended to `GROUP BY`
    pub key_growth: Vec<String>,
    /// Select-list columns written so far
    pub columns: Vec<SelectColumn>,
    /// Individual `GROUP BY` keys written so far
    pub group_keys: Vec<String>,
}

impl BufferHost for ExprVisitor<'_> {
    fn buffer(&mut self) -> &mut SqlBuffer {
        &mut *self.out
    }
}

impl<'a> ExprVisitor<'a> {
    pub fn new(
        ctx: &'a mut TranslationContext,
        out: &'a mut SqlBuffer,
        clause: Clause,
        env: Env,
    ) -> Self {
        Self {
            ctx,
            out,
            clause,
            env,
            grouped: false,
            key_growth: Vec::new(),
            columns: Vec::new(),
            group_keys: Vec::new(),
        }
    }

    pub fn write(&mut self, s: &str) {
        self.out.write(s);
    }

    /// Runs `f` and takes back out of the buffer whatever it wrote.
    pub fn capture(
        &mut self,
        f: impl FnOnce(&mut Self) -> TranslateResult<()>,
    ) -> TranslateResult<String> {
        let mark = self.out.position();
        let start_len = self.out.len();
        f(self)?;
        let grown = self.out.len() - start_len;
        Ok(self.out.cut(mark, mark + grown))
    }

    pub fn render_value(&mut self, expr: &Expr) -> TranslateResult<String> {
        self.capture(|v| v.visit(expr, RenderMode::value()))
    }

    pub fn with_env<R>(&mut self, env: Env, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = std::mem::replace(&mut self.env, env);
        let result = f(self);
        self.env = saved;
        result
    }

    pub fn with_clause<R>(&mut self, clause: Clause, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.clause;
        self.clause = clause;
        let result = f(self);
        self.clause = saved;
        result
    }

    pub fn visit(&mut self, expr: &Expr, mode: RenderMode) -> TranslateResult<()> {
        if let Some(handler) = dispatch::clause_override(self.clause, expr.kind()) {
            return handler(self, expr, mode);
        }
        self.visit_default(expr, mode)
    }

    /// Renders `expr` as a boolean condition, switching to the predicate
    /// grammar if the current clause is not one.
    pub fn visit_condition(&mut self, expr: &Expr, mode: RenderMode) -> TranslateResult<()> {
        let clause = if self.clause.is_predicate() {
            self.clause
        } else {
            Clause::Predicate
        };
        self.with_clause(clause, |v| v.visit(expr, mode.as_condition()))
    }

    pub fn visit_default(&mut self, expr: &Expr, mode: RenderMode) -> TranslateResult<()> {
        let mode = mode.nested();
        if !mode.condition && predicate::is_condition(expr) {
            return predicate::condition_as_value(self, expr, mode);
        }
        match expr {
            Expr::Constant { value } => self.visit_constant(value),
            Expr::Parameter(_) => self.visit_parameter(expr, mode),
            Expr::Member(access) => self.visit_member(expr, access, mode),
            Expr::Binary(binary) => self.visit_binary_value(binary, mode),
            Expr::Unary(unary) => match unary.op {
                UnaryOp::Negate => {
                    wrap_non_empty(self, "-(", ")", |v| v.visit(&unary.operand, mode.as_value()))?;
                    Ok(())
                }
                UnaryOp::Not => {
                    wrap_non_empty(self, "NOT (", ")", |v| {
                        v.visit_condition(&unary.operand, mode)
                    })?;
                    Ok(())
                }
                UnaryOp::Convert | UnaryOp::Quote => self.visit(&unary.operand, mode),
            },
            Expr::Conditional(conditional) => self.visit_conditional_value(conditional, mode),
            Expr::Switch(switch) => self.visit_switch(switch, mode),
            Expr::Call(call) => self.visit_call(expr, call, mode),
            Expr::New(new) => Err(TranslateError::unsupported(format!(
                "construction of '{}' outside a projection",
                new.type_name
            ))),
            Expr::Lambda(_) => Err(TranslateError::unsupported("lambda used as a value")),
        }
    }

    fn visit_constant(&mut self, value: &Value) -> TranslateResult<()> {
        match value {
            Value::Null => {
                self.write("NULL");
                Ok(())
            }
            Value::List(_) => Err(TranslateError::unsupported(
                "in-memory collection outside Contains/Any",
            )),
            Value::Source(entity) => Err(TranslateError::unsupported(format!(
                "query over '{}' used as a scalar value",
                entity
            ))),
            Value::Type(name) => Err(TranslateError::unsupported(format!(
                "type constant '{}'",
                name
            ))),
            bindable => {
                let marker = self.ctx.parameter(bindable.clone());
                self.write(&marker);
                Ok(())
            }
        }
    }

    fn visit_parameter(&mut self, expr: &Expr, mode: RenderMode) -> TranslateResult<()> {
        if let Some((sub, env)) = self.substitution(expr)? {
            return self.with_env(env, |v| v.visit(&sub, mode));
        }
        let name = match expr {
            Expr::Parameter(p) => p.name.as_str(),
            _ => "?",
        };
        match self.resolve_target(expr)? {
            Some(Target::Derived(derived)) if derived.scalar.is_some() => {
                let column = derived.scalar.clone().unwrap_or_default();
                let text = self.ctx.dialect.qualify(&derived.alias, &column);
                self.write(&text);
                Ok(())
            }
            Some(_) => Err(TranslateError::unsupported(format!(
                "entity or grouping '{}' used as a scalar value",
                name
            ))),
            None => Err(TranslateError::unsupported(format!(
                "parameter '{}' is not bound to any source",
                name
            ))),
        }
    }

    /// The expression a parameter or member reference stands for, when it is
    /// a substitution rather than a column.
    pub fn substitution(&mut self, expr: &Expr) -> TranslateResult<Option<(Expr, Env)>> {
        match expr.strip_convert() {
            Expr::Parameter(p) => match self.env.lookup(&p.name) {
                Some(Target::Bound { expr, env }) => Ok(Some(((**expr).clone(), env.clone()))),
                _ => Ok(None),
            },
            Expr::Member(access) => match self.resolve_target(&access.owner)? {
                Some(Target::Bound { expr, env }) => match expr.strip_convert() {
                    Expr::New(new) => match new.binding(&access.member) {
                        Some(binding) => Ok(Some((binding.clone(), env))),
                        None => Err(TranslateError::unsupported(format!(
                            "member '{}' is not part of the projection '{}'",
                            access.member, new.type_name
                        ))),
                    },
                    owner => Ok(Some((owner.clone().member(access.member.clone()), env))),
                },
                Some(Target::Group(group)) if access.member == "Key" => {
                    Ok(Some(((*group.key).clone(), group.key_env.clone())))
                }
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Resolves an expression denoting a row-like object (entity, projection,
    /// grouping, derived row) to its target.
    pub fn resolve_target(&mut self, expr: &Expr) -> TranslateResult<Option<Target>> {
        match expr.strip_convert() {
            Expr::Parameter(p) => match self.env.lookup(&p.name).cloned() {
                Some(Target::Bound { expr, env }) => match expr.strip_convert() {
                    Expr::Parameter(_) | Expr::Member(_) => {
                        let inner = self.with_env(env.clone(), |v| v.resolve_target(&expr))?;
                        Ok(inner.or(Some(Target::Bound { expr, env })))
                    }
                    _ => Ok(Some(Target::Bound { expr, env })),
                },
                Some(target) => Ok(Some(target)),
                None => self.resolve_by_type(&p.name, &p.ty),
            },
            Expr::Member(access) => {
                let Some(owner) = self.resolve_target(&access.owner)? else {
                    return Ok(None);
                };
                match owner {
                    Target::Bound { expr, env } => match expr.strip_convert() {
                        Expr::New(new) => match new.binding(&access.member) {
                            Some(binding) => {
                                let binding = binding.clone();
                                self.with_env(env, |v| v.resolve_target(&binding))
                            }
                            None => Ok(None),
                        },
                        _ => Ok(None),
                    },
                    Target::Group(group) if access.member == "Key" => {
                        let key = group.key.clone();
                        match key.strip_convert() {
                            Expr::New(_) => Ok(Some(Target::Bound {
                                expr: key,
                                env: group.key_env.clone(),
                            })),
                            _ => self.with_env(group.key_env.clone(), |v| v.resolve_target(&key)),
                        }
                    }
                    Target::Derived(derived) => {
                        let columns = derived.nested(&access.member);
                        if columns.is_empty() {
                            return Ok(None);
                        }
                        Ok(Some(Target::Derived(std::rc::Rc::new(DerivedTarget {
                            alias: derived.alias.clone(),
                            columns,
                            scalar: None,
                        }))))
                    }
                    _ => Ok(None),
                }
            }
            Expr::New(_) => Ok(Some(Target::bound(expr, &self.env))),
            _ => Ok(None),
        }
    }

    /// Unbound entity-typed parameter: fall back to the alias registered for
    /// its type in this or an enclosing statement.
    fn resolve_by_type(
        &mut self,
        name: &str,
        ty: &ExprType,
    ) -> TranslateResult<Option<Target>> {
        let Some(entity) = ty.entity_name() else {
            return Ok(None);
        };
        let Some(alias) = self
            .ctx
            .scope
            .lookup(&AliasKey::entity(entity))
            .map(str::to_string)
        else {
            return Ok(None);
        };
        log::debug!("parameter '{}' resolved by type to alias {}", name, alias);
        let info = self.ctx.resolve(entity)?;
        Ok(Some(Target::table(TableTarget::new(alias, info))))
    }

    fn visit_member(
        &mut self,
        expr: &Expr,
        access: &MemberAccess,
        mode: RenderMode,
    ) -> TranslateResult<()> {
        if let Some((sub, env)) = self.substitution(expr)? {
            return self.with_env(env, |v| v.visit(&sub, mode));
        }
        if let Some(target) = self.resolve_target(&access.owner)? {
            return self.visit_target_member(&target, &access.member, mode);
        }
        self.visit_scalar_member(access, mode)
    }

    /// `owner.member` where the owner resolved to a table or a derived row.
    pub fn visit_target_member(
        &mut self,
        target: &Target,
        member: &str,
        mode: RenderMode,
    ) -> TranslateResult<()> {
        match target {
            Target::Table(table) => {
                let column = table.column(member)?.clone();
                let text = self.ctx.dialect.qualify(&table.alias, &column.column);
                match table.default.clone() {
                    Some(default) => self.write_defaulted(&default, &text, member, &column, mode),
                    None => {
                        self.write(&text);
                        Ok(())
                    }
                }
            }
            Target::Derived(derived) => {
                let name = derived
                    .column(member)
                    .ok_or_else(|| MetadataError::UnknownMember {
                        entity: format!("derived table {}", derived.alias),
                        member: member.to_string(),
                    })?
                    .to_string();
                let text = self.ctx.dialect.qualify(&derived.alias, &name);
                self.write(&text);
                Ok(())
            }
            Target::Group(_) => Err(TranslateError::unsupported(format!(
                "grouping member '{}' (only Key and aggregates are available)",
                member
            ))),
            Target::Bound { .. } => Err(TranslateError::unsupported(format!(
                "member '{}' of a computed value",
                member
            ))),
        }
    }

    fn write_defaulted(
        &mut self,
        default: &DefaultSubstitution,
        column_sql: &str,
        member: &str,
        column: &ColumnInfo,
        mode: RenderMode,
    ) -> TranslateResult<()> {
        let guard = default
            .guard
            .iter()
            .map(|key| format!("{} IS NOT NULL", key))
            .collect::<Vec<_>>()
            .join(" AND ");

        let fallback = match default.fallback.strip_convert() {
            Expr::New(new) => new.binding(member).cloned(),
            _ => None,
        };
        let fallback_sql = match fallback {
            Some(expr) => self.with_env(default.fallback_env.clone(), |v| v.render_value(&expr))?,
            None => match self.kind_default(column.kind) {
                Some(literal) => literal,
                None => {
                    log::warn!(
                        "no default for member '{}' in DefaultIfEmpty fallback, using NULL",
                        member
                    );
                    "NULL".to_string()
                }
            },
        };

        if self.grouped && !mode.in_aggregate && self.clause == Clause::Select {
            for key in &default.guard {
                if !self.key_growth.contains(key) {
                    self.key_growth.push(key.clone());
                }
            }
        }

        let text = format!(
            "CASE WHEN {} THEN {} ELSE {} END",
            guard, column_sql, fallback_sql
        );
        self.write(&text);
        Ok(())
    }

    fn visit_scalar_member(&mut self, access: &MemberAccess, mode: RenderMode) -> TranslateResult<()> {
        match access.member.as_str() {
            "Length" => {
                let operand = self.render_value(&access.owner)?;
                let text = format!("{}({})", self.ctx.dialect.length_function, operand);
                self.write(&text);
                Ok(())
            }
            "HasValue" => {
                let operand = self.capture(|v| {
                    v.visit(&access.owner, RenderMode::value().ignoring_nullable(true))
                })?;
                self.write(&format!("{} IS NOT NULL", operand));
                Ok(())
            }
            "Value" => {
                if mode.ignore_nullable {
                    return self.visit(&access.owner, mode);
                }
                let operand = self.render_value(&access.owner)?;
                let kind = self.scalar_kind(&access.owner);
                match self.kind_default(kind) {
                    Some(literal) => self.write(&format!("COALESCE({}, {})", operand, literal)),
                    None => self.write(&operand),
                }
                Ok(())
            }
            other => Err(TranslateError::unsupported(format!(
                "member '{}' has no column mapping or SQL translation",
                other
            ))),
        }
    }

    fn kind_default(&self, kind: ScalarKind) -> Option<String> {
        match kind {
            ScalarKind::Bool => Some(self.ctx.dialect.bool_literal(false).to_string()),
            other => other.default_literal().map(str::to_string),
        }
    }

    /// Column metadata behind a member reference, if it is one.
    pub fn column_info(&mut self, expr: &Expr) -> Option<ColumnInfo> {
        match expr.strip_convert() {
            Expr::Member(access) if access.member == "Value" => self.column_info(&access.owner),
            e @ Expr::Member(access) => {
                if let Ok(Some((sub, env))) = self.substitution(e) {
                    return self.with_env(env, |v| v.column_info(&sub));
                }
                match self.resolve_target(&access.owner) {
                    Ok(Some(Target::Table(table))) => {
                        table.column(&access.member).ok().cloned()
                    }
                    _ => None,
                }
            }
            e @ Expr::Parameter(_) => match self.substitution(e) {
                Ok(Some((sub, env))) => self.with_env(env, |v| v.column_info(&sub)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn scalar_kind(&mut self, expr: &Expr) -> ScalarKind {
        if let Some(column) = self.column_info(expr) {
            return column.kind;
        }
        match expr.strip_convert() {
            Expr::Constant { value } => value.kind(),
            Expr::Parameter(p) => p.ty.scalar_kind(),
            _ => ScalarKind::Unknown,
        }
    }

    pub fn is_nullable(&mut self, expr: &Expr) -> bool {
        match expr.strip_convert() {
            Expr::Constant { value } => value.is_null(),
            Expr::Member(access) if access.member == "Value" => false,
            Expr::Parameter(p) if matches!(p.ty, ExprType::Nullable(_)) => true,
            Expr::Binary(b) if b.op == BinaryOp::Coalesce => self.is_nullable(&b.right),
            e => self.column_info(e).map(|c| c.nullable).unwrap_or(false),
        }
    }

    pub fn is_string(&mut self, expr: &Expr) -> bool {
        match expr.strip_convert() {
            Expr::Constant { value } => matches!(value, Value::String(_)),
            Expr::Call(call) if call.category == Category::StringOps => {
                string_functions::returns_string(&call.name)
            }
            Expr::Binary(b) if matches!(b.op, BinaryOp::Add | BinaryOp::Coalesce) => {
                self.is_string(&b.left) || self.is_string(&b.right)
            }
            e => self.scalar_kind(e) == ScalarKind::String,
        }
    }

    fn visit_binary_value(&mut self, binary: &BinaryExpr, mode: RenderMode) -> TranslateResult<()> {
        let child = mode.as_value();
        match binary.op {
            BinaryOp::Coalesce => {
                let mut links = Vec::new();
                predicate::coalesce_links(&binary.left, &mut links);
                predicate::coalesce_links(&binary.right, &mut links);
                let mut parts = Vec::with_capacity(links.len());
                for link in links {
                    parts.push(self.capture(|v| v.visit(link, child))?);
                }
                self.write(&format!("COALESCE({})", parts.join(", ")));
                Ok(())
            }
            BinaryOp::Add if self.is_string(&binary.left) || self.is_string(&binary.right) => {
                let dialect = Arc::clone(&self.ctx.dialect);
                let (open, close) = dialect.concat_wrapper();
                let joiner = dialect.concat_joiner();
                wrap_non_empty(self, open, close, |v| {
                    workflow(
                        v,
                        &joiner,
                        |v| v.visit(&binary.right, child),
                        |v| v.visit(&binary.left, child),
                    )
                    .map(|_| ())
                })?;
                Ok(())
            }
            op => {
                let joiner = format!(" {} ", op.sql_symbol());
                wrap_non_empty(self, "(", ")", |v| {
                    workflow(
                        v,
                        &joiner,
                        |v| v.visit(&binary.right, child),
                        |v| v.visit(&binary.left, child),
                    )
                    .map(|_| ())
                })?;
                Ok(())
            }
        }
    }

    fn visit_conditional_value(
        &mut self,
        conditional: &ConditionalExpr,
        mode: RenderMode,
    ) -> TranslateResult<()> {
        if let Some(test) = conditional.test.as_bool_constant() {
            let branch = if test {
                &conditional.if_true
            } else {
                &conditional.if_false
            };
            return self.visit(branch, mode);
        }
        let test = self.capture(|v| v.visit_condition(&conditional.test, RenderMode::condition()))?;
        let if_true = self.capture(|v| v.visit(&conditional.if_true, mode.as_value()))?;
        let if_false = self.capture(|v| v.visit(&conditional.if_false, mode.as_value()))?;
        let test = if test.is_empty() { "1 = 1".to_string() } else { test };
        self.write(&format!(
            "CASE WHEN {} THEN {} ELSE {} END",
            test, if_true, if_false
        ));
        Ok(())
    }

    fn visit_switch(&mut self, switch: &SwitchExpr, mode: RenderMode) -> TranslateResult<()> {
        if switch.cases.is_empty() {
            return match &switch.default {
                Some(default) => self.visit(default, mode.as_value()),
                None => {
                    self.write("NULL");
                    Ok(())
                }
            };
        }
        let value = self.render_value(&switch.value)?;
        let mut sql = format!("CASE {}", value);
        for case in &switch.cases {
            let body = self.capture(|v| v.visit(&case.body, mode.as_value()))?;
            for test in &case.tests {
                let test = self.render_value(test)?;
                sql.push_str(&format!(" WHEN {} THEN {}", test, body));
            }
        }
        if let Some(default) = &switch.default {
            let default = self.capture(|v| v.visit(default, mode.as_value()))?;
            sql.push_str(&format!(" ELSE {}", default));
        }
        sql.push_str(" END");
        self.write(&sql);
        Ok(())
    }

    fn visit_call(&mut self, expr: &Expr, call: &MethodCall, mode: RenderMode) -> TranslateResult<()> {
        match call.category {
            Category::StringOps => string_functions::visit_string_call(self, call, mode),
            Category::EnumerableOps => enumerable::visit_enumerable_call(self, call, mode),
            Category::QueryOperators => {
                let receiver = call.receiver().ok_or_else(|| {
                    TranslateError::unsupported(format!("'{}' without a source", call.name))
                })?;
                if enumerable::is_in_memory_list(receiver) {
                    return enumerable::visit_enumerable_call(self, call, mode);
                }
                if let Some(source) = group_by_builder::group_source(self, receiver)? {
                    return group_by_builder::visit_group_aggregate(self, &source, call, mode);
                }
                if receiver.is_query() {
                    return subquery::visit_subquery(self, expr);
                }
                Err(TranslateError::unsupported(format!(
                    "'{}' over a navigation property or in-memory sequence",
                    call.name
                )))
            }
            Category::CustomExtension => self.visit_custom_call(call),
        }
    }

    /// Tries the registered function visitors in order.
    pub fn visit_custom_call(&mut self, call: &MethodCall) -> TranslateResult<()> {
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.render_value(arg)?);
        }
        let functions = Arc::clone(&self.ctx.functions);
        let dialect = Arc::clone(&self.ctx.dialect);
        for function in functions.iter() {
            if let Some(result) = function.visit(call, &args, &dialect) {
                let sql = result?;
                self.write(&sql);
                return Ok(());
            }
        }
        Err(TranslateError::unsupported(format!(
            "no translation for method '{}'",
            call.name
        )))
    }
}
