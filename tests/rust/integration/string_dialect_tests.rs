/// String methods, custom functions and per-dialect output.
use std::sync::Arc;

use super::shop_schema::*;
use sqlweave::expression::builder::*;
use sqlweave::expression::MethodCall;
use sqlweave::translator::{FunctionVisitor, TranslateResult};
use sqlweave::{DialectSettings, Query, TranslateError, Value};
use test_case::test_case;

fn customers_where(body: impl FnOnce(&sqlweave::expression::ParameterExpr) -> sqlweave::Expr) -> Query {
    let c = customer("c");
    let predicate = body(&c);
    Query::from("Customer").filter(lambda([c], predicate))
}

#[test_case("Contains", "%bo%" ; "contains")]
#[test_case("StartsWith", "bo%" ; "starts with")]
#[test_case("EndsWith", "%bo" ; "ends with")]
fn test_like_with_constant_pattern(method: &str, pattern: &str) {
    let out = translate(customers_where(|c| {
        string_call(method, vec![m(c, "Name"), constant("bo")])
    }));
    assert!(out.sql.ends_with("WHERE t.Name LIKE @p0"), "{}", out.sql);
    assert_eq!(out.parameters.get("p0"), Some(&Value::String(pattern.to_string())));
}

#[test]
fn test_like_with_column_pattern_concatenates_wildcards() {
    let query = || {
        customers_where(|c| string_call("Contains", vec![m(c, "Name"), m(c, "Nickname")]))
    };
    let generic = translate(query());
    assert!(
        generic.sql.ends_with("WHERE t.Name LIKE ('%' || t.Nickname || '%')"),
        "{}",
        generic.sql
    );

    let mysql = translate_with(DialectSettings::mysql(), query());
    assert!(
        mysql.sql.ends_with("WHERE t.`Name` LIKE CONCAT('%', t.`Nickname`, '%')"),
        "{}",
        mysql.sql
    );
}

#[test]
fn test_null_like_pattern_is_unsupported() {
    let err = translate_err(customers_where(|c| {
        string_call("StartsWith", vec![m(c, "Name"), constant(Value::Null)])
    }));
    assert!(matches!(err, TranslateError::Unsupported(_)));
}

#[test]
fn test_is_null_or_empty() {
    let out = translate(customers_where(|c| string_call("IsNullOrEmpty", vec![m(c, "Email")])));
    assert!(out.sql.ends_with("WHERE (t.Email IS NULL OR t.Email = '')"), "{}", out.sql);
}

#[test]
fn test_upper_case_comparison() {
    let out = translate(customers_where(|c| {
        eq(string_call("ToUpper", vec![m(c, "Name")]), constant("BOB"))
    }));
    assert!(out.sql.ends_with("WHERE UPPER(t.Name) = @p0"), "{}", out.sql);
}

#[test]
fn test_substring_on_sql_server() {
    let c = customer("c");
    let out = translate_with(
        DialectSettings::sql_server(),
        Query::from("Customer").select(lambda(
            [c.clone()],
            string_call("Substring", vec![m(&c, "Name"), constant(1i64), constant(3i64)]),
        )),
    );
    assert_eq!(
        out.sql,
        "SELECT CASE WHEN t.[Name] IS NULL THEN NULL WHEN LEN(t.[Name]) > @p0 \
         THEN SUBSTRING(t.[Name], @p0 + 1, @p1) ELSE '' END AS [Value] FROM [Customer] t"
    );
}

#[test]
fn test_index_of_swaps_arguments_on_mysql() {
    let out = translate_with(
        DialectSettings::mysql(),
        customers_where(|c| {
            gt(
                string_call("IndexOf", vec![m(c, "Name"), constant("o")]),
                constant(0i64),
            )
        }),
    );
    assert!(
        out.sql
            .contains("CASE WHEN @p0 = '' THEN 0 ELSE LOCATE(@p0, t.`Name`) - 1 END > @p1"),
        "{}",
        out.sql
    );
}

#[test]
fn test_trim_with_characters_is_unsupported() {
    let err = translate_err(customers_where(|c| {
        eq(
            string_call("Trim", vec![m(c, "Name"), constant("x")]),
            constant("bob"),
        )
    }));
    assert!(matches!(err, TranslateError::Unsupported(_)));
}

#[test_case(DialectSettings::generic(), "SELECT t.Id, t.Name, t.Active FROM User t ORDER BY t.Name LIMIT 2 OFFSET 1" ; "generic")]
#[test_case(DialectSettings::postgres(), "SELECT t.\"Id\", t.\"Name\", t.\"Active\" FROM \"User\" t ORDER BY t.\"Name\" LIMIT 2 OFFSET 1" ; "postgres")]
#[test_case(DialectSettings::sql_server(), "SELECT t.[Id], t.[Name], t.[Active] FROM [User] t ORDER BY t.[Name] OFFSET 1 ROWS FETCH NEXT 2 ROWS ONLY" ; "sql server")]
fn test_pagination_per_dialect(dialect: DialectSettings, expected: &str) {
    let u = user("u");
    let query = Query::from("User")
        .order_by(lambda([u.clone()], m(&u, "Name")))
        .skip(1)
        .take(2);
    assert_eq!(translate_with(dialect, query).sql, expected);
}

#[test]
fn test_oracle_parameter_prefix() {
    let u = user("u");
    let out = translate_with(
        DialectSettings::oracle(),
        Query::from("User").filter(lambda([u.clone()], m(&u, "Active"))),
    );
    assert!(out.sql.ends_with("WHERE t.\"Active\" = :p0"), "{}", out.sql);
}

/// `SOUNDEX(x)` for a `Soundex` extension method.
struct SoundexVisitor;

impl FunctionVisitor for SoundexVisitor {
    fn visit(
        &self,
        call: &MethodCall,
        args: &[String],
        _dialect: &DialectSettings,
    ) -> Option<TranslateResult<String>> {
        if call.name != "Soundex" {
            return None;
        }
        Some(match args {
            [arg] => Ok(format!("SOUNDEX({})", arg)),
            _ => Err(TranslateError::unsupported("Soundex takes one argument")),
        })
    }
}

#[test]
fn test_registered_custom_function() {
    let mut translator = translator_for(DialectSettings::generic());
    translator.register_function(Arc::new(SoundexVisitor));
    let query = customers_where(|c| {
        eq(custom_call("Soundex", vec![m(c, "Name")]), constant("B100"))
    });
    let out = translator.translate(query.as_expr()).unwrap();
    assert!(out.sql.ends_with("WHERE SOUNDEX(t.Name) = @p0"), "{}", out.sql);
}

#[test]
fn test_unknown_custom_function_is_unsupported() {
    let err = translate_err(customers_where(|c| {
        eq(custom_call("Levenshtein", vec![m(c, "Name")]), constant(1i64))
    }));
    assert!(matches!(err, TranslateError::Unsupported(_)));
}
