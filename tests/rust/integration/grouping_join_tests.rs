/// GROUP BY/HAVING, key-based joins and SelectMany with default rows.
use super::shop_schema::*;
use sqlweave::expression::builder::*;
use sqlweave::expression::{ExprType, ParameterExpr, ScalarKind};
use sqlweave::{Query, TranslateError, Value};

fn group(name: &str) -> ParameterExpr {
    ParameterExpr::new(name, ExprType::Grouping)
}

/// `orders.GroupBy(o => o.CustomerId, (k, g) => new { CustomerId = k, Count = g.Count(), Total = g.Sum(x => x.Total) })`
fn orders_per_customer() -> Query {
    let o = order("o");
    let x = order("x");
    let k = scalar_param("k", ScalarKind::Int);
    let g = group("g");
    Query::from("Order").group_by_with(
        lambda([o.clone()], m(&o, "CustomerId")),
        lambda(
            [k.clone(), g.clone()],
            new_object(
                "Summary",
                [
                    ("CustomerId", k.to_expr()),
                    ("Count", query_call("Count", vec![g.to_expr()])),
                    (
                        "Total",
                        query_call(
                            "Sum",
                            vec![g.to_expr(), lambda([x.clone()], m(&x, "Total"))],
                        ),
                    ),
                ],
            ),
        ),
    )
}

#[test]
fn test_group_by_with_result_selector() {
    let out = translate(orders_per_customer());
    assert_eq!(
        out.sql,
        "SELECT t.CustomerId, COUNT(1) AS Count, COALESCE(SUM(t.Total), 0) AS Total \
         FROM Orders t GROUP BY t.CustomerId"
    );
}

#[test]
fn test_filter_after_group_by_becomes_having() {
    let s = ParameterExpr::new("s", ExprType::Anonymous("Summary".to_string()));
    let out = translate(
        orders_per_customer().filter(lambda([s.clone()], gt(m(&s, "Count"), constant(2i64)))),
    );
    assert_eq!(
        out.sql,
        "SELECT t.CustomerId, COUNT(1) AS Count, COALESCE(SUM(t.Total), 0) AS Total \
         FROM Orders t GROUP BY t.CustomerId HAVING COUNT(1) > @p0"
    );
    assert_eq!(out.parameters.get("p0"), Some(&Value::Int(2)));
}

#[test]
fn test_aggregate_selector_reads_the_projected_rows() {
    let o = order("o");
    let x = order("x");
    let s = ParameterExpr::new("s", ExprType::Anonymous("Line".to_string()));
    let k = scalar_param("k", ScalarKind::Int);
    let g = group("g");
    let lines = query_call(
        "Select",
        vec![
            g.to_expr(),
            lambda([x.clone()], new_object("Line", [("Amount", m(&x, "Total"))])),
        ],
    );
    let out = translate(Query::from("Order").group_by_with(
        lambda([o.clone()], m(&o, "CustomerId")),
        lambda(
            [k.clone(), g.clone()],
            new_object(
                "Summary",
                [
                    ("CustomerId", k.to_expr()),
                    (
                        "Total",
                        query_call("Sum", vec![lines, lambda([s.clone()], m(&s, "Amount"))]),
                    ),
                ],
            ),
        ),
    ));
    assert_eq!(
        out.sql,
        "SELECT t.CustomerId, COALESCE(SUM(t.Total), 0) AS Total FROM Orders t GROUP BY t.CustomerId"
    );
}

#[test]
fn test_group_key_projection() {
    let o = order("o");
    let g = group("g");
    let out = translate(
        Query::from("Order")
            .group_by(lambda([o.clone()], m(&o, "CustomerId")))
            .select(lambda(
                [g.clone()],
                new_object(
                    "Row",
                    [
                        ("CustomerId", m(&g, "Key")),
                        ("Orders", query_call("Count", vec![g.to_expr()])),
                    ],
                ),
            )),
    );
    assert_eq!(
        out.sql,
        "SELECT t.CustomerId, COUNT(1) AS Orders FROM Orders t GROUP BY t.CustomerId"
    );
}

#[test]
fn test_group_by_discards_prior_ordering() {
    let o = order("o");
    let g = group("g");
    let out = translate(
        Query::from("Order")
            .order_by(lambda([o.clone()], m(&o, "Total")))
            .group_by(lambda([o.clone()], m(&o, "CustomerId")))
            .select(lambda([g.clone()], m(&g, "Key"))),
    );
    assert!(!out.sql.contains("ORDER BY"), "{}", out.sql);
    assert!(out.sql.ends_with("GROUP BY t.CustomerId"), "{}", out.sql);
}

#[test]
fn test_composite_group_key() {
    let c = customer("c");
    let g = group("g");
    let out = translate(
        Query::from("Customer")
            .group_by(lambda(
                [c.clone()],
                new_object("Key", [("Name", m(&c, "Name")), ("Age", m(&c, "Age"))]),
            ))
            .select(lambda([g.clone()], query_call("Count", vec![g.to_expr()]))),
    );
    assert!(out.sql.ends_with("GROUP BY t.Name, t.Age"), "{}", out.sql);
}

#[test]
fn test_inner_join_on_keys() {
    let o = order("o");
    let c = customer("c");
    let out = translate(Query::from("Order").join(
        Query::from("Customer"),
        lambda([o.clone()], m(&o, "CustomerId")),
        lambda([c.clone()], m(&c, "Id")),
        lambda(
            [o.clone(), c.clone()],
            new_object("Row", [("Total", m(&o, "Total")), ("Customer", m(&c, "Name"))]),
        ),
    ));
    assert_eq!(
        out.sql,
        "SELECT t.Total, t1.Name AS Customer FROM Orders t INNER JOIN Customer t1 ON t.CustomerId = t1.Id"
    );
}

#[test]
fn test_join_is_inserted_before_an_earlier_where() {
    let o = order("o");
    let c = customer("c");
    let out = translate(
        Query::from("Order")
            .filter(lambda([o.clone()], gt(m(&o, "Total"), constant(10.0))))
            .join(
                Query::from("Customer"),
                lambda([o.clone()], m(&o, "CustomerId")),
                lambda([c.clone()], m(&c, "Id")),
                lambda(
                    [o.clone(), c.clone()],
                    new_object("Row", [("Total", m(&o, "Total")), ("Customer", m(&c, "Name"))]),
                ),
            ),
    );
    assert_eq!(
        out.sql,
        "SELECT t.Total, t1.Name AS Customer FROM Orders t \
         INNER JOIN Customer t1 ON t.CustomerId = t1.Id WHERE t.Total > @p0"
    );
}

/// `customers.SelectMany(c => orders.Where(o => o.CustomerId == c.Id).DefaultIfEmpty(new Order { Total = 0.0 }), ...)`
fn customers_with_orders(result: fn(&ParameterExpr, &ParameterExpr) -> sqlweave::Expr) -> Query {
    let c = customer("c");
    let o = order("o");
    let x = order("x");
    let fallback = new_object("Order", [("Total", constant(0.0))]);
    let orders = Query::from("Order")
        .filter(lambda([o.clone()], eq(m(&o, "CustomerId"), m(&c, "Id"))))
        .default_if_empty(Some(fallback));
    Query::from("Customer").select_many(
        lambda([c.clone()], orders.into_expr()),
        lambda([c.clone(), x.clone()], result(&c, &x)),
    )
}

fn name_and_total(c: &ParameterExpr, x: &ParameterExpr) -> sqlweave::Expr {
    new_object("Row", [("Name", m(c, "Name")), ("Total", m(x, "Total"))])
}

#[test]
fn test_select_many_left_join_with_default_row() {
    let out = translate(customers_with_orders(name_and_total));
    assert_eq!(
        out.sql,
        "SELECT t.Name, CASE WHEN t1.Id IS NOT NULL THEN t1.Total ELSE @p0 END AS Total \
         FROM Customer t LEFT JOIN Orders t1 ON t1.CustomerId = t.Id"
    );
    assert_eq!(out.sql.matches("CASE WHEN").count(), 1);
    assert_eq!(out.parameters.get("p0"), Some(&Value::Float(0.0)));
}

#[test]
fn test_default_stays_on_the_joined_row() {
    fn with_order_count(c: &ParameterExpr, x: &ParameterExpr) -> sqlweave::Expr {
        let inner = order("x");
        let count = Query::from("Order")
            .filter(lambda([inner.clone()], eq(m(&inner, "CustomerId"), m(c, "Id"))))
            .count();
        new_object(
            "Row",
            [
                ("Name", m(c, "Name")),
                ("Total", m(x, "Total")),
                ("Orders", count.into_expr()),
            ],
        )
    }
    let out = translate(customers_with_orders(with_order_count));
    assert_eq!(
        out.sql,
        "SELECT t.Name, CASE WHEN t1.Id IS NOT NULL THEN t1.Total ELSE @p0 END AS Total, \
         (SELECT COUNT(1) FROM Orders t2 WHERE t2.CustomerId = t.Id) AS Orders \
         FROM Customer t LEFT JOIN Orders t1 ON t1.CustomerId = t.Id"
    );
    assert_eq!(out.sql.matches("CASE WHEN").count(), 1);
}

#[test]
fn test_grouping_on_defaulted_column_grows_the_key_set() {
    let r = ParameterExpr::new("r", ExprType::Anonymous("Row".to_string()));
    let k = scalar_param("k", ScalarKind::Float);
    let g = group("g");
    let out = translate(customers_with_orders(name_and_total).group_by_with(
        lambda([r.clone()], m(&r, "Total")),
        lambda(
            [k.clone(), g.clone()],
            new_object(
                "Summary",
                [
                    ("Total", k.to_expr()),
                    ("Count", query_call("Count", vec![g.to_expr()])),
                ],
            ),
        ),
    ));
    assert_eq!(
        out.sql,
        "SELECT CASE WHEN t1.Id IS NOT NULL THEN t1.Total ELSE @p0 END AS Total, COUNT(1) AS Count \
         FROM Customer t LEFT JOIN Orders t1 ON t1.CustomerId = t.Id \
         GROUP BY CASE WHEN t1.Id IS NOT NULL THEN t1.Total ELSE @p0 END, t1.Id"
    );
}

#[test]
fn test_select_many_without_default_is_inner_join() {
    let c = customer("c");
    let o = order("o");
    let out = translate(Query::from("Customer").select_many(
        lambda(
            [c.clone()],
            Query::from("Order")
                .filter(lambda([o.clone()], eq(m(&o, "CustomerId"), m(&c, "Id"))))
                .into_expr(),
        ),
        lambda([c.clone(), o.clone()], m(&o, "Total")),
    ));
    assert_eq!(
        out.sql,
        "SELECT t1.Total FROM Customer t INNER JOIN Orders t1 ON t1.CustomerId = t.Id"
    );
}

#[test]
fn test_default_if_empty_outside_select_many() {
    let err = translate_err(Query::from("User").default_if_empty(None));
    assert!(matches!(err, TranslateError::Unsupported(_)));
}
