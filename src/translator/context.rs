//! Per-translation state and the rendering context value.

use std::sync::Arc;

use super::errors::TranslateResult;
use super::function_registry::FunctionVisitor;
use super::scope::{AliasGenerator, AliasScope, TableTarget};
use crate::dialect::DialectSettings;
use crate::expression::Value;
use crate::metadata::{MetadataResolver, TableInfo};
use crate::writer::ParameterMap;

/// Which sub-grammar is active. Selects the per-clause override table entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Select,
    Predicate,
    Having,
    Join,
    GroupKey,
    OrderBy,
}

impl Clause {
    pub fn is_predicate(self) -> bool {
        matches!(self, Clause::Predicate | Clause::Having | Clause::Join)
    }
}

/// Traversal modes, passed by value into each visit so they never leak
/// out of the subtree that set them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderMode {
    /// The node is in boolean-condition position; leaves may render
    /// `= TRUE` / `IS NULL` forms.
    pub condition: bool,
    /// Render nullable unwraps (`x.Value`) as the bare column.
    pub ignore_nullable: bool,
    /// Boolean suffix already provided by the enclosing construct.
    pub variable_condition: bool,
    /// Inside an aggregate function over a group.
    pub in_aggregate: bool,
    /// Root item of a comma list (select list, group keys): entity
    /// references expand to their columns.
    pub list_item: bool,
    /// Whole body of a `Where`-style filter. A predicate that folds to a
    /// constant here renders nothing instead of `1 = 1` / `1 = 0`.
    pub filter_root: bool,
}

impl RenderMode {
    pub fn value() -> Self {
        Self::default()
    }

    pub fn condition() -> Self {
        Self {
            condition: true,
            ..Self::default()
        }
    }

    pub fn filter_root() -> Self {
        Self {
            condition: true,
            filter_root: true,
            ..Self::default()
        }
    }

    pub fn list_item() -> Self {
        Self {
            list_item: true,
            ..Self::default()
        }
    }

    /// Mode for the operands of the current node.
    pub fn nested(self) -> Self {
        Self {
            list_item: false,
            filter_root: false,
            ..self
        }
    }

    pub fn as_condition(self) -> Self {
        Self {
            condition: true,
            list_item: false,
            filter_root: false,
            ..self
        }
    }

    pub fn as_value(self) -> Self {
        Self {
            condition: false,
            variable_condition: false,
            list_item: false,
            filter_root: false,
            ..self
        }
    }

    pub fn ignoring_nullable(self, ignore: bool) -> Self {
        Self {
            ignore_nullable: ignore,
            ..self
        }
    }

    pub fn with_variable_condition(self) -> Self {
        Self {
            variable_condition: true,
            ..self
        }
    }

    pub fn aggregating(self) -> Self {
        Self {
            in_aggregate: true,
            ..self
        }
    }
}

/// Everything shared by the statement compilers and expression visitors of
/// one translation. Created per top-level query and discarded afterwards.
pub struct TranslationContext {
    pub dialect: Arc<DialectSettings>,
    pub resolver: Arc<dyn MetadataResolver>,
    pub functions: Arc<Vec<Arc<dyn FunctionVisitor>>>,
    pub params: ParameterMap,
    pub aliases: AliasGenerator,
    pub scope: AliasScope,
    pub max_list_unroll: usize,
    pub timeout: Option<u32>,
}

impl TranslationContext {
    pub fn new(
        dialect: Arc<DialectSettings>,
        resolver: Arc<dyn MetadataResolver>,
        functions: Arc<Vec<Arc<dyn FunctionVisitor>>>,
        max_list_unroll: usize,
    ) -> Self {
        Self {
            dialect,
            resolver,
            functions,
            params: ParameterMap::new(),
            aliases: AliasGenerator::default(),
            scope: AliasScope::new(),
            max_list_unroll,
            timeout: None,
        }
    }

    pub fn resolve(&self, entity: &str) -> TranslateResult<Arc<TableInfo>> {
        Ok(self.resolver.resolve(entity)?)
    }

    /// Registers a bound value and returns its marker (`@p0`).
    pub fn parameter(&mut self, value: Value) -> String {
        let name = self.params.add(value);
        self.dialect.parameter_marker(&name)
    }

    /// A fresh alias for `entity`, registered in the innermost alias frame.
    pub fn new_table(&mut self, entity: &str) -> TranslateResult<TableTarget> {
        let info = self.resolve(entity)?;
        let alias = self.aliases.next_alias();
        let target = TableTarget::new(alias, info);
        self.scope.register(target.key(), &target.alias);
        Ok(target)
    }
}
