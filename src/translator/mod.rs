//! Query translator
//!
//! Compiles a query expression tree into parameterized SQL plus the metadata
//! the execution layer needs to shape the result.
//!
//! ## Structure
//!
//! - [`statement`]: `SELECT` levels, operator application and finalization
//! - [`expr_visitor`]: the single expression traversal engine
//! - [`dispatch`]: per-clause override and operator tables
//! - `*_builder` / clause modules: select list, predicates, grouping, joins,
//!   set operations, subqueries, pagination
//! - [`function_registry`]: pluggable custom-function visitors
//!
//! ## Example
//!
//! ```ignore
//! let translator = Translator::new(DialectSettings::generic(), resolver);
//! let query = Query::from("User").filter(active).order_by(name).take(2);
//! let out = translator.translate(query.as_expr())?;
//! println!("{} {:?}", out.sql, out.parameters);
//! ```

mod context;
mod dispatch;
mod enumerable;
pub mod errors;
mod expr_visitor;
pub mod function_registry;
mod group_by_builder;
mod join_builder;
mod pagination;
mod predicate;
mod scope;
mod select_builder;
mod set_operation;
mod statement;
mod string_functions;
mod subquery;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

pub use dispatch::supported_operators;
pub use errors::{ExecutionError, TranslateError, TranslateResult};
pub use function_registry::{FunctionVisitor, ScalarFunctionVisitor};
pub use pagination::PageWindow;
pub use statement::NO_ELEMENTS;

use crate::config::TranslatorConfig;
use crate::dialect::DialectSettings;
use crate::expression::{Expr, Value};
use crate::metadata::MetadataResolver;
use crate::writer::ParameterMap;
use context::TranslationContext;
use scope::Env;
use statement::{Purpose, StatementCompiler};

/// Default upper bound on unrolled in-memory list elements.
pub const DEFAULT_MAX_LIST_UNROLL: usize = 1000;

/// The output of one translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedQuery {
    pub sql: String,
    pub parameters: ParameterMap,
    /// Seconds, from a `TimeOut` operator
    pub timeout: Option<u32>,
    /// The result must have a row (`First`, `Single`, `Min`, ...)
    pub required: bool,
    /// Value for an empty `OrDefault` result
    pub default_value: Option<Value>,
    pub missing_data_message: Option<String>,
    pub take: Option<u64>,
    pub skip: u64,
    /// Rows come back in inverted order (`TakeLast`, `SkipLast`)
    pub reverse_order: bool,
}

impl fmt::Display for TranslatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Entry point, shareable across threads. Each call to
/// [`translate`](Translator::translate) works on its own context.
#[derive(Clone)]
pub struct Translator {
    dialect: Arc<DialectSettings>,
    resolver: Arc<dyn MetadataResolver>,
    functions: Arc<Vec<Arc<dyn FunctionVisitor>>>,
    max_list_unroll: usize,
    log_sql: bool,
}

impl fmt::Debug for Translator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translator")
            .field("dialect", &self.dialect.name)
            .field("functions", &self.functions.len())
            .field("max_list_unroll", &self.max_list_unroll)
            .finish()
    }
}

impl Translator {
    pub fn new(dialect: DialectSettings, resolver: Arc<dyn MetadataResolver>) -> Self {
        let builtin: Arc<dyn FunctionVisitor> = Arc::new(ScalarFunctionVisitor);
        Self {
            dialect: Arc::new(dialect),
            resolver,
            functions: Arc::new(vec![builtin]),
            max_list_unroll: DEFAULT_MAX_LIST_UNROLL,
            log_sql: false,
        }
    }

    pub fn from_config(config: &TranslatorConfig, resolver: Arc<dyn MetadataResolver>) -> Self {
        let mut translator = Self::new(config.dialect_settings(), resolver);
        translator.max_list_unroll = config.max_list_unroll;
        translator.log_sql = config.log_sql;
        translator
    }

    /// Appends a custom-function visitor, tried after those already registered.
    pub fn register_function(&mut self, visitor: Arc<dyn FunctionVisitor>) {
        Arc::make_mut(&mut self.functions).push(visitor);
    }

    pub fn with_max_list_unroll(mut self, limit: usize) -> Self {
        self.max_list_unroll = limit;
        self
    }

    pub fn dialect(&self) -> &DialectSettings {
        &self.dialect
    }

    pub fn translate(&self, query: &Expr) -> TranslateResult<TranslatedQuery> {
        let mut ctx = TranslationContext::new(
            Arc::clone(&self.dialect),
            Arc::clone(&self.resolver),
            Arc::clone(&self.functions),
            self.max_list_unroll,
        );

        let (finalized, terminal, page) = {
            let mut compiler = StatementCompiler::new(&mut ctx, Env::new());
            let level = compiler.compile_level(query)?;
            let terminal = level.terminal.clone();
            let page = level.page;
            let finalized = compiler.finalize(level, Purpose::Statement)?;
            (finalized, terminal, page)
        };

        let mut parameters = ctx.params;
        let sql = parameters.renumber_by_appearance(&finalized.sql, &self.dialect.parameter_prefix);
        if self.log_sql {
            log::info!("{}", sql);
        } else {
            log::debug!("translated: {}", sql);
        }

        let (required, default_value, missing_data_message) = match terminal {
            Some(terminal) => (terminal.required, terminal.default_value, terminal.message),
            None => (false, None, None),
        };
        Ok(TranslatedQuery {
            sql,
            parameters,
            timeout: ctx.timeout,
            required,
            default_value,
            missing_data_message,
            take: page.take,
            skip: page.skip,
            reverse_order: page.reverse,
        })
    }
}

/// One-shot translation with a default-configured [`Translator`].
pub fn translate(
    query: &Expr,
    dialect: DialectSettings,
    resolver: Arc<dyn MetadataResolver>,
) -> TranslateResult<TranslatedQuery> {
    Translator::new(dialect, resolver).translate(query)
}
