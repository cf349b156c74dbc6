/// Whole-statement behavior: the canonical filtered/ordered/paged query,
/// determinism, constant folding, null handling and parameter reuse.
use super::shop_schema::*;
use sqlweave::expression::builder::*;
use sqlweave::{Query, Value};

fn active_users_named_an() -> Query {
    let u = user("u");
    Query::from("User")
        .filter(lambda(
            [u.clone()],
            and(
                m(&u, "Active"),
                string_call("Contains", vec![m(&u, "Name"), constant("an")]),
            ),
        ))
        .order_by(lambda([u.clone()], m(&u, "Name")))
        .take(2)
}

#[test]
fn test_filtered_ordered_paged_query() {
    let out = translate(active_users_named_an());

    assert_eq!(
        out.sql,
        "SELECT t.Id, t.Name, t.Active FROM User t WHERE t.Active = @p0 AND t.Name LIKE @p1 ORDER BY t.Name LIMIT 2"
    );
    assert_eq!(out.parameters.len(), 2);
    assert_eq!(out.parameters.get("p0"), Some(&Value::Bool(true)));
    assert_eq!(out.parameters.get("p1"), Some(&Value::String("%an%".to_string())));
    assert_eq!(out.take, Some(2));
    assert_eq!(out.skip, 0);
    assert!(!out.reverse_order);
    assert!(!out.required);
}

#[test]
fn test_translation_is_deterministic() {
    let first = translate(active_users_named_an());
    let second = translate(active_users_named_an());
    assert_eq!(first, second);
}

#[test]
fn test_parameter_names_follow_sql_order() {
    let out = translate(active_users_named_an());
    let names: Vec<&str> = out.parameters.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["p0", "p1"]);
    assert!(out.sql.find("@p0") < out.sql.find("@p1"));
}

#[test]
fn test_true_and_predicate_is_the_predicate() {
    let c = customer("c");
    let plain = Query::from("Customer").filter(lambda([c.clone()], gt(m(&c, "Age"), constant(18i64))));
    let folded = Query::from("Customer").filter(lambda(
        [c.clone()],
        and(constant(true), gt(m(&c, "Age"), constant(18i64))),
    ));

    let plain = translate(plain);
    let folded = translate(folded);
    assert_eq!(plain.sql, folded.sql);
    assert_eq!(plain.parameters, folded.parameters);
    assert_eq!(
        folded.sql,
        "SELECT t.Id, t.Name, t.Age, t.Email, t.Nickname FROM Customer t WHERE t.Age > @p0"
    );
}

#[test]
fn test_false_and_predicate_drops_the_where_clause() {
    let c = customer("c");
    let out = translate(Query::from("Customer").filter(lambda(
        [c.clone()],
        and(constant(false), gt(m(&c, "Age"), constant(18i64))),
    )));
    assert_eq!(out.sql, "SELECT t.Id, t.Name, t.Age, t.Email, t.Nickname FROM Customer t");
    assert!(out.parameters.is_empty());
}

#[test]
fn test_nested_tautology_keeps_its_sibling() {
    let u = user("u");
    let out = translate(Query::from("User").filter(lambda(
        [u.clone()],
        and(
            m(&u, "Active"),
            or(constant(true), eq(m(&u, "Name"), constant("x"))),
        ),
    )));
    assert_eq!(out.sql, "SELECT t.Id, t.Name, t.Active FROM User t WHERE t.Active = @p0");
    assert_eq!(out.parameters.len(), 1);
    assert_eq!(out.parameters.get("p0"), Some(&Value::Bool(true)));
}

#[test]
fn test_nested_contradiction_drops_out_of_a_disjunction() {
    let u = user("u");
    let out = translate(Query::from("User").filter(lambda(
        [u.clone()],
        or(
            eq(m(&u, "Name"), constant("x")),
            and(constant(false), m(&u, "Active")),
        ),
    )));
    assert_eq!(out.sql, "SELECT t.Id, t.Name, t.Active FROM User t WHERE t.Name = @p0");
}

#[test]
fn test_predicate_and_true_is_the_predicate() {
    let u = user("u");
    let out = translate(Query::from("User").filter(lambda(
        [u.clone()],
        and(eq(m(&u, "Name"), constant("x")), constant(true)),
    )));
    assert_eq!(out.sql, "SELECT t.Id, t.Name, t.Active FROM User t WHERE t.Name = @p0");
}

#[test]
fn test_where_true_renders_tautology() {
    let u = user("u");
    let out = translate(Query::from("User").filter(lambda([u], constant(true))));
    assert_eq!(out.sql, "SELECT t.Id, t.Name, t.Active FROM User t WHERE 1 = 1");
}

#[test]
fn test_equal_values_share_one_parameter() {
    let c = customer("c");
    let out = translate(Query::from("Customer").filter(lambda(
        [c.clone()],
        or(
            eq(m(&c, "Age"), constant(18i64)),
            eq(m(&c, "Age"), constant(18i64)),
        ),
    )));
    assert_eq!(out.parameters.len(), 1);
    assert_eq!(out.parameters.get("p0"), Some(&Value::Int(18)));
    assert!(out.sql.ends_with("WHERE (t.Age = @p0 OR t.Age = @p0)"), "{}", out.sql);
}

#[test]
fn test_coalesce_chain_expands_into_guarded_branches() {
    let c = customer("c");
    let chain = coalesce(
        m(&c, "Nickname"),
        coalesce(m(&c, "Email"), m(&c, "Name")),
    );
    let out = translate(Query::from("Customer").filter(lambda([c.clone()], eq(chain, constant("bob")))));

    assert!(
        out.sql.ends_with(
            "WHERE (t.Nickname = @p0 OR (t.Nickname IS NULL AND t.Email = @p0) \
             OR (t.Nickname IS NULL AND t.Email IS NULL AND t.Name = @p0))"
        ),
        "{}",
        out.sql
    );
    assert_eq!(out.sql.matches(" OR (").count(), 2);
    assert_eq!(out.parameters.len(), 1);
}

#[test]
fn test_null_comparisons() {
    let c = customer("c");
    let is_null = translate(Query::from("Customer").filter(lambda(
        [c.clone()],
        eq(m(&c, "Email"), constant(Value::Null)),
    )));
    assert!(is_null.sql.ends_with("WHERE t.Email IS NULL"), "{}", is_null.sql);
    assert!(is_null.parameters.is_empty());

    let not_null = translate(Query::from("Customer").filter(lambda(
        [c.clone()],
        ne(constant(Value::Null), m(&c, "Email")),
    )));
    assert!(not_null.sql.ends_with("WHERE t.Email IS NOT NULL"), "{}", not_null.sql);
}

#[test]
fn test_nullable_columns_compare_null_safely() {
    let c = customer("c");
    let out = translate(Query::from("Customer").filter(lambda(
        [c.clone()],
        eq(m(&c, "Email"), m(&c, "Nickname")),
    )));
    assert!(
        out.sql
            .ends_with("WHERE (t.Email = t.Nickname OR (t.Email IS NULL AND t.Nickname IS NULL))"),
        "{}",
        out.sql
    );
}

#[test]
fn test_negated_flag() {
    let u = user("u");
    let out = translate(Query::from("User").filter(lambda([u.clone()], not(m(&u, "Active")))));
    assert!(out.sql.ends_with("WHERE NOT (t.Active = @p0)"), "{}", out.sql);
    assert_eq!(out.parameters.get("p0"), Some(&Value::Bool(true)));
}

#[test]
fn test_consecutive_filters_are_joined_with_and() {
    let u = user("u");
    let out = translate(
        Query::from("User")
            .filter(lambda([u.clone()], m(&u, "Active")))
            .filter(lambda([u.clone()], ne(m(&u, "Name"), constant("root")))),
    );
    assert!(
        out.sql.ends_with("WHERE t.Active = @p0 AND t.Name <> @p1"),
        "{}",
        out.sql
    );
}

#[test]
fn test_in_memory_list_contains_unrolls() {
    let u = user("u");
    let ids = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let out = translate(Query::from("User").filter(lambda(
        [u.clone()],
        enumerable_call("Contains", vec![constant(ids), m(&u, "Id")]),
    )));
    assert!(
        out.sql.ends_with("WHERE (t.Id = @p0 OR t.Id = @p1 OR t.Id = @p2)"),
        "{}",
        out.sql
    );
    assert_eq!(out.parameters.get("p2"), Some(&Value::Int(3)));
}

#[test]
fn test_empty_in_memory_list_matches_nothing() {
    let u = user("u");
    let out = translate(Query::from("User").filter(lambda(
        [u.clone()],
        enumerable_call("Contains", vec![constant(Value::List(Vec::new())), m(&u, "Id")]),
    )));
    assert!(out.sql.ends_with("WHERE 1 = 0"), "{}", out.sql);
}

#[test]
fn test_in_memory_list_any_unrolls_the_lambda() {
    let u = user("u");
    let n = scalar_param("n", sqlweave::expression::ScalarKind::String);
    let names = Value::List(vec![Value::from("ann"), Value::from("bob")]);
    let out = translate(Query::from("User").filter(lambda(
        [u.clone()],
        enumerable_call(
            "Any",
            vec![constant(names), lambda([n.clone()], eq(m(&u, "Name"), n.to_expr()))],
        ),
    )));
    assert_eq!(
        out.sql,
        "SELECT t.Id, t.Name, t.Active FROM User t WHERE (t.Name = @p0 OR t.Name = @p1)"
    );
    assert_eq!(out.parameters.get("p0"), Some(&Value::String("ann".to_string())));
    assert_eq!(out.parameters.get("p1"), Some(&Value::String("bob".to_string())));
}

#[test]
fn test_in_memory_list_all_joins_branches_with_and() {
    let u = user("u");
    let n = scalar_param("n", sqlweave::expression::ScalarKind::String);
    let names = Value::List(vec![Value::from("ann"), Value::from("bob")]);
    let out = translate(Query::from("User").filter(lambda(
        [u.clone()],
        enumerable_call(
            "All",
            vec![constant(names), lambda([n.clone()], ne(m(&u, "Name"), n.to_expr()))],
        ),
    )));
    assert_eq!(
        out.sql,
        "SELECT t.Id, t.Name, t.Active FROM User t WHERE (t.Name <> @p0 AND t.Name <> @p1)"
    );
}

#[test]
fn test_conditional_in_condition_position() {
    let u = user("u");
    let out = translate(Query::from("User").filter(lambda(
        [u.clone()],
        conditional(
            ne(m(&u, "Name"), constant("root")),
            m(&u, "Active"),
            constant(false),
        ),
    )));
    assert_eq!(
        out.sql,
        "SELECT t.Id, t.Name, t.Active FROM User t \
         WHERE CASE WHEN t.Name <> @p0 THEN t.Active ELSE @p1 END = @p2"
    );
    assert_eq!(out.parameters.get("p1"), Some(&Value::Bool(false)));
    assert_eq!(out.parameters.get("p2"), Some(&Value::Bool(true)));
}

#[test]
fn test_conditional_in_value_position() {
    let c = customer("c");
    let out = translate(Query::from("Customer").select(lambda(
        [c.clone()],
        new_object(
            "Row",
            [
                ("Name", m(&c, "Name")),
                (
                    "Tier",
                    conditional(
                        gt(m(&c, "Age"), constant(65i64)),
                        constant("senior"),
                        constant("regular"),
                    ),
                ),
            ],
        ),
    )));
    assert_eq!(
        out.sql,
        "SELECT t.Name, CASE WHEN t.Age > @p0 THEN @p1 ELSE @p2 END AS Tier FROM Customer t"
    );
    assert_eq!(out.parameters.get("p0"), Some(&Value::Int(65)));
}

#[test]
fn test_switch_projection() {
    let c = customer("c");
    let band = switch(
        m(&c, "Age"),
        vec![
            (vec![constant(18i64)], constant("adult")),
            (vec![constant(65i64), constant(70i64)], constant("senior")),
        ],
        Some(constant("other")),
    );
    let out = translate(Query::from("Customer").select(lambda(
        [c.clone()],
        new_object("Row", [("Name", m(&c, "Name")), ("Band", band)]),
    )));
    assert_eq!(
        out.sql,
        "SELECT t.Name, CASE t.Age WHEN @p0 THEN @p1 WHEN @p2 THEN @p3 WHEN @p4 THEN @p3 ELSE @p5 END AS Band \
         FROM Customer t"
    );
    assert_eq!(out.parameters.len(), 6);
    assert_eq!(out.parameters.get("p3"), Some(&Value::String("senior".to_string())));
    assert_eq!(out.parameters.get("p4"), Some(&Value::Int(70)));
}

#[test]
fn test_list_unroll_limit() {
    let u = user("u");
    let ids = Value::List((0..5).map(Value::Int).collect());
    let query = Query::from("User").filter(lambda(
        [u.clone()],
        enumerable_call("Contains", vec![constant(ids), m(&u, "Id")]),
    ));
    let result = translator_for(sqlweave::DialectSettings::generic())
        .with_max_list_unroll(2)
        .translate(query.as_expr());
    assert!(matches!(result, Err(sqlweave::TranslateError::Unsupported(_))));
}

#[test]
fn test_unknown_entity_is_a_metadata_error() {
    let err = translate_err(Query::from("Invoice"));
    assert!(matches!(err, sqlweave::TranslateError::Metadata(_)), "{:?}", err);
}

#[test]
fn test_has_value_and_length_members() {
    let c = customer("c");
    let out = translate(Query::from("Customer").filter(lambda(
        [c.clone()],
        and(
            member(m(&c, "Email"), "HasValue"),
            gt(member(m(&c, "Name"), "Length"), constant(3i64)),
        ),
    )));
    assert!(
        out.sql
            .ends_with("WHERE t.Email IS NOT NULL AND LENGTH(t.Name) > @p0"),
        "{}",
        out.sql
    );
}
