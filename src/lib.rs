//! sqlweave - query translation core of an object-relational mapper
//!
//! This crate compiles a fluent, strongly-typed query expression tree into
//! dialect-specific SQL through:
//! - A serializable query expression tree and a fluent builder
//! - Entity metadata resolution with a thread-safe cache
//! - A retroactive-insertion output buffer and parameter map
//! - A clause-aware visitor engine (select, predicate, group-by, join,
//!   set operation, subquery)
//! - Dialect settings for identifiers, string functions and pagination

pub mod config;
pub mod dialect;
pub mod expression;
pub mod metadata;
pub mod translator;
pub mod writer;

pub use dialect::{DialectKind, DialectSettings};
pub use expression::{Expr, Query, Value};
pub use translator::{translate, TranslateError, TranslatedQuery, Translator};
