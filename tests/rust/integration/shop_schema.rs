/// Shared schema for the integration tests
///
/// - `User`: Id, Name, Active
/// - `Customer`: Id, Name, Age, Email (nullable), Nickname (nullable)
/// - `Order` (table `Orders`): Id, CustomerId, Total, Discount (nullable)
use std::sync::Arc;

use sqlweave::expression::{builder, Expr, ParameterExpr, ScalarKind};
use sqlweave::metadata::{CachedResolver, EntityDescriptor, EntityRegistry, MetadataResolver};
use sqlweave::{DialectSettings, Query, TranslateError, TranslatedQuery, Translator};

pub fn registry() -> EntityRegistry {
    EntityRegistry::new()
        .with(
            EntityDescriptor::new("User")
                .key("Id", ScalarKind::Int)
                .member("Name", ScalarKind::String)
                .member("Active", ScalarKind::Bool),
        )
        .with(
            EntityDescriptor::new("Customer")
                .key("Id", ScalarKind::Int)
                .member("Name", ScalarKind::String)
                .member("Age", ScalarKind::Int)
                .nullable("Email", ScalarKind::String)
                .nullable("Nickname", ScalarKind::String),
        )
        .with(
            EntityDescriptor::new("Order")
                .table("Orders")
                .key("Id", ScalarKind::Int)
                .member("CustomerId", ScalarKind::Int)
                .member("Total", ScalarKind::Float)
                .nullable("Discount", ScalarKind::Float),
        )
}

pub fn resolver() -> Arc<dyn MetadataResolver> {
    Arc::new(CachedResolver::new(registry()))
}

pub fn translator_for(dialect: DialectSettings) -> Translator {
    Translator::new(dialect, resolver())
}

pub fn translate(query: Query) -> TranslatedQuery {
    translator_for(DialectSettings::generic())
        .translate(query.as_expr())
        .unwrap_or_else(|e| panic!("translation failed: {}", e))
}

pub fn translate_with(dialect: DialectSettings, query: Query) -> TranslatedQuery {
    translator_for(dialect)
        .translate(query.as_expr())
        .unwrap_or_else(|e| panic!("translation failed: {}", e))
}

pub fn translate_err(query: Query) -> TranslateError {
    match translator_for(DialectSettings::generic()).translate(query.as_expr()) {
        Ok(out) => panic!("expected an error, got SQL: {}", out.sql),
        Err(e) => e,
    }
}

pub fn user(name: &str) -> ParameterExpr {
    builder::param(name, "User")
}

pub fn customer(name: &str) -> ParameterExpr {
    builder::param(name, "Customer")
}

pub fn order(name: &str) -> ParameterExpr {
    builder::param(name, "Order")
}

/// `p.Member`
pub fn m(p: &ParameterExpr, member: &str) -> Expr {
    builder::member(p.to_expr(), member)
}
