/// Entity descriptions and query trees loaded from serialized documents, the
/// way the command-line front end reads them.
use std::sync::Arc;

use sqlweave::expression::builder::*;
use sqlweave::expression::Expr;
use sqlweave::metadata::{CachedResolver, EntityDescriptor, EntityRegistry};
use sqlweave::{DialectSettings, Query, Translator};

const ENTITIES: &str = r#"
- name: User
  table: app_users
  members:
    - member: Id
      kind: int
      key: true
    - member: Name
      column: display_name
      kind: string
    - member: Active
      kind: bool
"#;

fn translator() -> Translator {
    let descriptors: Vec<EntityDescriptor> = serde_yaml::from_str(ENTITIES).unwrap();
    let registry = EntityRegistry::new();
    for descriptor in descriptors {
        registry.register(descriptor);
    }
    Translator::new(DialectSettings::generic(), Arc::new(CachedResolver::new(registry)))
}

fn active_users() -> Query {
    let u = param("u", "User");
    Query::from("User").filter(lambda([u.clone()], member(u.clone(), "Active")))
}

#[test]
fn test_yaml_entities_drive_column_mapping() {
    let u = param("u", "User");
    let query = Query::from("User").order_by(lambda([u.clone()], member(u, "Name")));
    let out = translator().translate(query.as_expr()).unwrap();
    assert_eq!(
        out.sql,
        "SELECT t.Id, t.display_name, t.Active FROM app_users t ORDER BY t.display_name"
    );
}

#[test]
fn test_query_tree_from_json_translates_identically() {
    let original = active_users();
    let json = serde_json::to_string_pretty(original.as_expr()).unwrap();
    let parsed: Expr = serde_json::from_str(&json).unwrap();

    let translator = translator();
    assert_eq!(
        translator.translate(&parsed).unwrap(),
        translator.translate(original.as_expr()).unwrap()
    );
}

#[test]
fn test_translated_query_serializes_parameters_by_name() {
    let out = translator().translate(active_users().as_expr()).unwrap();
    let json = serde_json::to_value(&out).unwrap();
    assert_eq!(
        json["sql"],
        "SELECT t.Id, t.display_name, t.Active FROM app_users t WHERE t.Active = @p0"
    );
    assert_eq!(json["parameters"]["p0"]["kind"], "bool");
    assert_eq!(json["parameters"]["p0"]["value"], true);
    assert_eq!(json["required"], false);
}
