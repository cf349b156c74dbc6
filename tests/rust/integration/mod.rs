//! Integration tests - full translations through the public `Translator` API
//!
//! Every test builds a query tree with the fluent builder, resolves entities
//! against the in-process shop schema and checks the SQL, parameters and
//! result metadata that come out.

mod grouping_join_tests;
mod pagination_tests;
mod set_subquery_tests;
mod shop_schema;
mod string_dialect_tests;
mod translation_property_tests;
