//! Dispatch tables
//!
//! Two static registries, built once:
//!
//! - per-clause expression overrides, keyed by `(Clause, NodeKind)`;
//! - query operator handlers, keyed by operator name.
//!
//! Handlers are plain functions so the tables can be shared by every
//! translation without locking.

use std::collections::HashMap;

use super::context::{Clause, RenderMode};
use super::errors::TranslateResult;
use super::expr_visitor::ExprVisitor;
use super::statement::{self, SelectLevel, StatementCompiler};
use super::{group_by_builder, join_builder, pagination, predicate, set_operation};
use crate::expression::{Expr, MethodCall, NodeKind};

pub(crate) type ExprHandler = fn(&mut ExprVisitor<'_>, &Expr, RenderMode) -> TranslateResult<()>;

pub(crate) type OperatorHandler =
    fn(&mut StatementCompiler<'_>, &mut SelectLevel, &MethodCall) -> TranslateResult<()>;

lazy_static::lazy_static! {
    static ref CLAUSE_OVERRIDES: HashMap<(Clause, NodeKind), ExprHandler> = {
        let mut m: HashMap<(Clause, NodeKind), ExprHandler> = HashMap::new();

        for clause in [Clause::Predicate, Clause::Having, Clause::Join] {
            m.insert((clause, NodeKind::Binary), predicate::predicate_binary);
            m.insert((clause, NodeKind::Unary), predicate::predicate_unary);
            m.insert((clause, NodeKind::Member), predicate::predicate_reference);
            m.insert((clause, NodeKind::Parameter), predicate::predicate_reference);
            m.insert((clause, NodeKind::Constant), predicate::predicate_constant);
            m.insert((clause, NodeKind::Conditional), predicate::predicate_conditional);
            m.insert((clause, NodeKind::Call), predicate::predicate_call);
        }

        for kind in [NodeKind::New, NodeKind::Member, NodeKind::Parameter] {
            m.insert((Clause::GroupKey, kind), group_by_builder::group_key_item);
        }

        m
    };

    static ref OPERATORS: HashMap<&'static str, OperatorHandler> = {
        let mut m: HashMap<&'static str, OperatorHandler> = HashMap::new();

        // ===== FILTERING AND PROJECTION =====
        m.insert("Where", statement::apply_where);
        m.insert("TakeWhile", statement::apply_where);
        m.insert("SkipWhile", statement::apply_skip_while);
        m.insert("Select", statement::apply_select);
        m.insert("Distinct", statement::apply_distinct);
        m.insert("Cast", statement::apply_cast);
        m.insert("OfType", statement::apply_cast);
        m.insert("DefaultIfEmpty", statement::apply_default_if_empty);

        // ===== ORDERING =====
        m.insert("OrderBy", statement::apply_order_by);
        m.insert("OrderByDescending", statement::apply_order_by);
        m.insert("ThenBy", statement::apply_order_by);
        m.insert("ThenByDescending", statement::apply_order_by);

        // ===== PAGINATION =====
        m.insert("Take", pagination::apply_take);
        m.insert("Skip", pagination::apply_skip);
        m.insert("TakeLast", pagination::apply_take_last);
        m.insert("SkipLast", pagination::apply_skip_last);
        m.insert("ElementAt", pagination::apply_element_at);
        m.insert("ElementAtOrDefault", pagination::apply_element_at);
        m.insert("Reverse", pagination::apply_reverse);

        // ===== TERMINALS =====
        for name in ["First", "FirstOrDefault", "Single", "SingleOrDefault", "Last", "LastOrDefault"] {
            m.insert(name, statement::apply_single_row);
        }
        for name in ["Count", "LongCount", "Sum", "Min", "Max", "Average"] {
            m.insert(name, statement::apply_aggregate);
        }
        for name in ["Any", "All", "Contains"] {
            m.insert(name, statement::apply_existence);
        }

        // ===== COMBINING SOURCES =====
        m.insert("GroupBy", group_by_builder::apply_group_by);
        m.insert("Join", join_builder::apply_join);
        m.insert("SelectMany", join_builder::apply_select_many);
        for name in ["Union", "Concat", "Intersect", "Except"] {
            m.insert(name, set_operation::apply_set_operation);
        }

        m
    };
}

pub(crate) fn clause_override(clause: Clause, kind: NodeKind) -> Option<ExprHandler> {
    CLAUSE_OVERRIDES.get(&(clause, kind)).copied()
}

pub(crate) fn operator(name: &str) -> Option<OperatorHandler> {
    OPERATORS.get(name).copied()
}

/// Names of every query operator with a translation, sorted.
pub fn supported_operators() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = OPERATORS.keys().copied().collect();
    names.sort_unstable();
    names
}
