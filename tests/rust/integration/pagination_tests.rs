/// Take/Skip folding, single-row terminals, aggregates and the operator
/// sequences that are rejected.
use super::shop_schema::*;
use sqlweave::expression::builder::*;
use sqlweave::translator::NO_ELEMENTS;
use sqlweave::{DialectSettings, Query, TranslateError, Value};
use test_case::test_case;

fn by_name() -> Query {
    let u = user("u");
    Query::from("User").order_by(lambda([u.clone()], m(&u, "Name")))
}

#[test_case(by_name().take(10).skip(3), Some(7), 3 ; "skip shrinks an earlier take")]
#[test_case(by_name().take(10).take(5), Some(5), 0 ; "smaller take wins")]
#[test_case(by_name().take(5).take(10), Some(5), 0 ; "larger take is ignored")]
#[test_case(by_name().skip(2).skip(3), None, 5 ; "skips add up")]
#[test_case(by_name().skip(4).take(2), Some(2), 4 ; "take after skip")]
#[test_case(by_name().element_at(3), Some(1), 3 ; "element at")]
fn test_page_window(query: Query, take: Option<u64>, skip: u64) {
    let out = translate(query);
    assert_eq!(out.take, take);
    assert_eq!(out.skip, skip);
}

#[test]
fn test_take_then_skip_sql() {
    let out = translate(by_name().take(10).skip(3));
    assert_eq!(
        out.sql,
        "SELECT t.Id, t.Name, t.Active FROM User t ORDER BY t.Name LIMIT 7 OFFSET 3"
    );
}

#[test_case(by_name().take(10).skip(20) ; "skip past an earlier take")]
#[test_case(by_name().take(-1) ; "negative take")]
#[test_case(by_name().skip(-2) ; "negative skip")]
#[test_case(by_name().element_at(-1) ; "negative index")]
#[test_case(by_name().skip(i64::MAX).skip(i64::MAX).skip(i64::MAX) ; "accumulated skip overflows")]
#[test_case(by_name().skip(i64::MAX).skip(i64::MAX).take(2) ; "window end overflows")]
fn test_bounds_errors(query: Query) {
    assert!(matches!(translate_err(query), TranslateError::Bounds(_)));
}

#[test]
fn test_take_last_inverts_ordering() {
    let out = translate(by_name().take_last(3));
    assert_eq!(
        out.sql,
        "SELECT t.Id, t.Name, t.Active FROM User t ORDER BY t.Name DESC LIMIT 3"
    );
    assert!(out.reverse_order);
}

#[test]
fn test_reverse_flips_ordering_only() {
    let out = translate(by_name().reverse());
    assert!(out.sql.ends_with("ORDER BY t.Name DESC"), "{}", out.sql);
}

#[test_case(Query::from("User").take_last(2) ; "take last without ordering")]
#[test_case(by_name().take(5).take_last(2) ; "take last after take")]
#[test_case(by_name().skip(1).skip_last(2) ; "skip last after skip")]
#[test_case(Query::from("User").last() ; "last without ordering")]
#[test_case(by_name().first().count() ; "operator after terminal")]
fn test_sequence_errors(query: Query) {
    assert!(matches!(translate_err(query), TranslateError::Syntax(_)));
}

#[test]
fn test_then_by_requires_order_by() {
    let u = user("u");
    let err = translate_err(Query::from("User").then_by(lambda([u.clone()], m(&u, "Name"))));
    assert!(matches!(err, TranslateError::Syntax(_)));
}

#[test]
fn test_order_by_then_by_descending() {
    let u = user("u");
    let out = translate(
        Query::from("User")
            .order_by(lambda([u.clone()], m(&u, "Active")))
            .then_by_descending(lambda([u.clone()], m(&u, "Name"))),
    );
    assert!(out.sql.ends_with("ORDER BY t.Active, t.Name DESC"), "{}", out.sql);
}

#[test]
fn test_first_is_required_single_row() {
    let out = translate(by_name().first());
    assert_eq!(
        out.sql,
        "SELECT t.Id, t.Name, t.Active FROM User t ORDER BY t.Name LIMIT 1"
    );
    assert!(out.required);
    assert_eq!(out.missing_data_message.as_deref(), Some(NO_ELEMENTS));
    assert_eq!(out.default_value, None);
    assert_eq!(out.take, Some(1));
}

#[test]
fn test_first_or_default_carries_default_value() {
    let out = translate(by_name().first_or_default());
    assert!(!out.required);
    assert_eq!(out.default_value, Some(Value::Null));
    assert_eq!(out.missing_data_message, None);
}

#[test]
fn test_last_flips_ordering() {
    let out = translate(by_name().last());
    assert!(out.sql.ends_with("ORDER BY t.Name DESC LIMIT 1"), "{}", out.sql);
    assert!(out.required);
}

#[test]
fn test_filter_after_take_wraps_derived_table() {
    let u = user("u");
    let out = translate(
        Query::from("User")
            .take(5)
            .filter(lambda([u.clone()], m(&u, "Active"))),
    );
    assert_eq!(
        out.sql,
        "SELECT t1.Id, t1.Name, t1.Active FROM (SELECT t.Id, t.Name, t.Active FROM User t LIMIT 5) t1 \
         WHERE t1.Active = @p0"
    );
    assert_eq!(out.take, None);
}

#[test]
fn test_count() {
    let out = translate(Query::from("User").count());
    assert_eq!(out.sql, "SELECT COUNT(1) FROM User t");
    assert!(!out.required);
}

#[test]
fn test_sum_is_coalesced_and_ordering_dropped() {
    let o = order("o");
    let out = translate(
        Query::from("Order")
            .order_by(lambda([o.clone()], m(&o, "Id")))
            .sum(lambda([o.clone()], m(&o, "Total"))),
    );
    assert_eq!(out.sql, "SELECT COALESCE(SUM(t.Total), 0) FROM Orders t");
}

#[test]
fn test_max_is_required() {
    let o = order("o");
    let out = translate(Query::from("Order").max(lambda([o.clone()], m(&o, "Total"))));
    assert_eq!(out.sql, "SELECT MAX(t.Total) FROM Orders t");
    assert!(out.required);
}

#[test]
fn test_top_level_any() {
    let u = user("u");
    let out = translate(Query::from("User").any(Some(lambda([u.clone()], m(&u, "Active")))));
    assert_eq!(
        out.sql,
        "SELECT CASE WHEN EXISTS (SELECT 1 FROM User t WHERE t.Active = @p0) THEN TRUE ELSE FALSE END"
    );
}

#[test]
fn test_top_level_all_with_tautology_keeps_no_row() {
    let u = user("u");
    let out = translate(Query::from("User").all(lambda(
        [u.clone()],
        or(constant(true), eq(m(&u, "Name"), constant("x"))),
    )));
    assert_eq!(
        out.sql,
        "SELECT CASE WHEN NOT EXISTS (SELECT 1 FROM User t WHERE 1 = 0) THEN TRUE ELSE FALSE END"
    );
    assert!(out.parameters.is_empty());
}

#[test]
fn test_top_level_any_on_oracle_uses_dual() {
    let out = translate_with(DialectSettings::oracle(), Query::from("User").any(None));
    assert_eq!(
        out.sql,
        "SELECT CASE WHEN EXISTS (SELECT 1 FROM \"User\" t) THEN 1 ELSE 0 END FROM DUAL"
    );
}

#[test]
fn test_distinct_projection() {
    let u = user("u");
    let out = translate(
        Query::from("User")
            .select(lambda([u.clone()], m(&u, "Name")))
            .distinct(),
    );
    assert_eq!(out.sql, "SELECT DISTINCT t.Name FROM User t");
}

#[test]
fn test_second_select_on_one_level_is_rejected() {
    let u = user("u");
    let n = user("n");
    let err = translate_err(
        Query::from("User")
            .select(lambda([u.clone()], u.to_expr()))
            .select(lambda([n.clone()], m(&n, "Name"))),
    );
    assert!(matches!(err, TranslateError::Syntax(_)));
}

#[test]
fn test_timeout_is_reported() {
    let out = translate(Query::from("User").timeout(30));
    assert_eq!(out.timeout, Some(30));
    assert_eq!(out.sql, "SELECT t.Id, t.Name, t.Active FROM User t");
}

#[test]
fn test_skip_while_negates_the_predicate() {
    let u = user("u");
    let out = translate(Query::from("User").skip_while(lambda([u.clone()], m(&u, "Active"))));
    assert!(out.sql.ends_with("WHERE NOT (t.Active = @p0)"), "{}", out.sql);
}

#[test]
fn test_take_while_filters() {
    let u = user("u");
    let out = translate(Query::from("User").take_while(lambda([u.clone()], m(&u, "Active"))));
    assert!(out.sql.ends_with("WHERE t.Active = @p0"), "{}", out.sql);
}

#[test]
fn test_cast_narrows_to_shared_members() {
    let out = translate(Query::from("Customer").cast("User"));
    assert_eq!(out.sql, "SELECT t.Id, t.Name FROM Customer t");
}

#[test]
fn test_average_and_min_are_required() {
    let o = order("o");
    let avg = translate(Query::from("Order").average(lambda([o.clone()], m(&o, "Total"))));
    assert_eq!(avg.sql, "SELECT AVG(t.Total) FROM Orders t");
    assert!(avg.required);

    let min = translate(Query::from("Order").min(lambda([o.clone()], m(&o, "Total"))));
    assert_eq!(min.sql, "SELECT MIN(t.Total) FROM Orders t");
    assert!(min.required);
}

#[test]
fn test_long_count_matches_count() {
    assert_eq!(
        translate(Query::from("User").long_count()).sql,
        translate(Query::from("User").count()).sql
    );
}
