/// Set operations and correlated subqueries.
use super::shop_schema::*;
use sqlweave::expression::builder::*;
use sqlweave::expression::ScalarKind;
use sqlweave::{DialectSettings, Query, TranslateError};

fn names(active: bool) -> Query {
    let u = user("u");
    let flag = if active {
        m(&u, "Active")
    } else {
        not(m(&u, "Active"))
    };
    Query::from("User")
        .filter(lambda([u.clone()], flag))
        .select(lambda([u.clone()], m(&u, "Name")))
}

#[test]
fn test_union() {
    let out = translate(names(true).union(names(false)));
    assert_eq!(
        out.sql,
        "SELECT t.Name FROM User t WHERE t.Active = @p0 \
         UNION SELECT t1.Name FROM User t1 WHERE NOT (t1.Active = @p0)"
    );
    assert_eq!(out.parameters.len(), 1);
}

#[test]
fn test_concat_is_union_all() {
    let out = translate(names(true).concat(names(false)));
    assert!(out.sql.contains(" UNION ALL SELECT t1.Name"), "{}", out.sql);
}

#[test]
fn test_except_keyword_follows_dialect() {
    let generic = translate(names(true).except(names(false)));
    assert!(generic.sql.contains(" EXCEPT "), "{}", generic.sql);

    let oracle = translate_with(DialectSettings::oracle(), names(true).except(names(false)));
    assert!(oracle.sql.contains(" MINUS "), "{}", oracle.sql);
}

#[test]
fn test_ordering_after_union_wraps_the_set() {
    let n = scalar_param("n", ScalarKind::String);
    let out = translate(
        names(true)
            .union(names(false))
            .order_by(lambda([n.clone()], n.to_expr())),
    );
    assert_eq!(
        out.sql,
        "SELECT t2.Name FROM (SELECT t.Name FROM User t WHERE t.Active = @p0 \
         UNION SELECT t1.Name FROM User t1 WHERE NOT (t1.Active = @p0)) t2 ORDER BY t2.Name"
    );
}

#[test]
fn test_set_operation_needs_matching_columns() {
    let u = user("u");
    let err = translate_err(names(true).union(Query::from("User").filter(lambda([u.clone()], m(&u, "Active")))));
    assert!(matches!(err, TranslateError::Unsupported(_)), "{:?}", err);
}

#[test]
fn test_correlated_any_becomes_exists() {
    let c = customer("c");
    let o = order("o");
    let has_orders = Query::from("Order").any(Some(lambda(
        [o.clone()],
        eq(m(&o, "CustomerId"), m(&c, "Id")),
    )));
    let out = translate(Query::from("Customer").filter(lambda([c.clone()], has_orders.into_expr())));
    assert_eq!(
        out.sql,
        "SELECT t.Id, t.Name, t.Age, t.Email, t.Nickname FROM Customer t \
         WHERE EXISTS (SELECT 1 FROM Orders t1 WHERE t1.CustomerId = t.Id)"
    );
}

#[test]
fn test_correlated_all_becomes_not_exists() {
    let c = customer("c");
    let o = order("o");
    let all_large = Query::from("Order")
        .filter(lambda([o.clone()], eq(m(&o, "CustomerId"), m(&c, "Id"))))
        .all(lambda([o.clone()], gt(m(&o, "Total"), constant(100.0))));
    let out = translate(Query::from("Customer").filter(lambda([c.clone()], all_large.into_expr())));
    assert!(
        out.sql.ends_with(
            "WHERE NOT EXISTS (SELECT 1 FROM Orders t1 WHERE t1.CustomerId = t.Id AND NOT (t1.Total > @p0))"
        ),
        "{}",
        out.sql
    );
}

#[test]
fn test_scalar_count_subquery_in_projection() {
    let c = customer("c");
    let o = order("o");
    let order_count = Query::from("Order")
        .filter(lambda([o.clone()], eq(m(&o, "CustomerId"), m(&c, "Id"))))
        .count();
    let out = translate(Query::from("Customer").select(lambda(
        [c.clone()],
        new_object(
            "Row",
            [("Name", m(&c, "Name")), ("Orders", order_count.into_expr())],
        ),
    )));
    assert_eq!(
        out.sql,
        "SELECT t.Name, (SELECT COUNT(1) FROM Orders t1 WHERE t1.CustomerId = t.Id) AS Orders FROM Customer t"
    );
}

#[test]
fn test_subquery_membership() {
    let c = customer("c");
    let o = order("o");
    let buyer_ids = Query::from("Order")
        .select(lambda([o.clone()], m(&o, "CustomerId")))
        .contains(m(&c, "Id"));
    let out = translate(Query::from("Customer").filter(lambda([c.clone()], buyer_ids.into_expr())));
    assert!(
        out.sql.ends_with("WHERE t.Id IN (SELECT t1.CustomerId FROM Orders t1)"),
        "{}",
        out.sql
    );
}

#[test]
fn test_intersect() {
    let out = translate(names(true).intersect(names(false)));
    assert!(out.sql.contains(" INTERSECT SELECT t1.Name"), "{}", out.sql);
}
