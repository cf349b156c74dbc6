//! Fluent front end for building query expression trees.
//!
//! ```ignore
//! let u = ParameterExpr::entity("u", "User");
//! let query = Query::from("User")
//!     .filter(lambda([u.clone()], u.to_expr().member("Active")))
//!     .order_by(lambda([u.clone()], u.to_expr().member("Name")))
//!     .take(2);
//! ```

use super::{
    BinaryExpr, BinaryOp, Category, ConditionalExpr, Expr, ExprType, LambdaExpr, MemberBinding,
    MethodCall, NewExpr, ParameterExpr, ScalarKind, SwitchCase, SwitchExpr, UnaryExpr, UnaryOp,
    Value,
};

/// A query under construction. Every operator wraps the current tree as the
/// source argument of a new `QueryOperators` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    expr: Expr,
}

impl Query {
    /// Root query over the table mapped to `entity`.
    pub fn from(entity: impl Into<String>) -> Self {
        Self {
            expr: Expr::constant(Value::Source(entity.into())),
        }
    }

    pub fn from_expr(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    pub fn as_expr(&self) -> &Expr {
        &self.expr
    }

    /// Applies an arbitrary operator.
    pub fn call(self, name: &str, args: Vec<Expr>) -> Self {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(self.expr);
        all.extend(args);
        Self {
            expr: Expr::Call(MethodCall {
                category: Category::QueryOperators,
                name: name.to_string(),
                args: all,
                type_args: Vec::new(),
            }),
        }
    }

    pub fn filter(self, predicate: Expr) -> Self {
        self.call("Where", vec![predicate])
    }

    pub fn take_while(self, predicate: Expr) -> Self {
        self.call("TakeWhile", vec![predicate])
    }

    pub fn skip_while(self, predicate: Expr) -> Self {
        self.call("SkipWhile", vec![predicate])
    }

    pub fn select(self, selector: Expr) -> Self {
        self.call("Select", vec![selector])
    }

    pub fn order_by(self, key: Expr) -> Self {
        self.call("OrderBy", vec![key])
    }

    pub fn order_by_descending(self, key: Expr) -> Self {
        self.call("OrderByDescending", vec![key])
    }

    pub fn then_by(self, key: Expr) -> Self {
        self.call("ThenBy", vec![key])
    }

    pub fn then_by_descending(self, key: Expr) -> Self {
        self.call("ThenByDescending", vec![key])
    }

    pub fn group_by(self, key: Expr) -> Self {
        self.call("GroupBy", vec![key])
    }

    /// `GroupBy(key, (key, group) => result)`
    pub fn group_by_with(self, key: Expr, result: Expr) -> Self {
        self.call("GroupBy", vec![key, result])
    }

    pub fn join(self, inner: Query, outer_key: Expr, inner_key: Expr, result: Expr) -> Self {
        self.call("Join", vec![inner.expr, outer_key, inner_key, result])
    }

    /// `SelectMany(outer => collection, (outer, inner) => result)`
    pub fn select_many(self, collection: Expr, result: Expr) -> Self {
        self.call("SelectMany", vec![collection, result])
    }

    pub fn default_if_empty(self, fallback: Option<Expr>) -> Self {
        self.call("DefaultIfEmpty", fallback.into_iter().collect())
    }

    pub fn take(self, count: i64) -> Self {
        self.call("Take", vec![Expr::constant(count)])
    }

    pub fn skip(self, count: i64) -> Self {
        self.call("Skip", vec![Expr::constant(count)])
    }

    pub fn take_last(self, count: i64) -> Self {
        self.call("TakeLast", vec![Expr::constant(count)])
    }

    pub fn skip_last(self, count: i64) -> Self {
        self.call("SkipLast", vec![Expr::constant(count)])
    }

    pub fn element_at(self, index: i64) -> Self {
        self.call("ElementAt", vec![Expr::constant(index)])
    }

    pub fn element_at_or_default(self, index: i64) -> Self {
        self.call("ElementAtOrDefault", vec![Expr::constant(index)])
    }

    pub fn reverse(self) -> Self {
        self.call("Reverse", vec![])
    }

    pub fn distinct(self) -> Self {
        self.call("Distinct", vec![])
    }

    pub fn first(self) -> Self {
        self.call("First", vec![])
    }

    pub fn first_or_default(self) -> Self {
        self.call("FirstOrDefault", vec![])
    }

    pub fn single(self) -> Self {
        self.call("Single", vec![])
    }

    pub fn last(self) -> Self {
        self.call("Last", vec![])
    }

    pub fn last_or_default(self) -> Self {
        self.call("LastOrDefault", vec![])
    }

    pub fn count(self) -> Self {
        self.call("Count", vec![])
    }

    pub fn long_count(self) -> Self {
        self.call("LongCount", vec![])
    }

    pub fn sum(self, selector: Expr) -> Self {
        self.call("Sum", vec![selector])
    }

    pub fn min(self, selector: Expr) -> Self {
        self.call("Min", vec![selector])
    }

    pub fn max(self, selector: Expr) -> Self {
        self.call("Max", vec![selector])
    }

    pub fn average(self, selector: Expr) -> Self {
        self.call("Average", vec![selector])
    }

    pub fn any(self, predicate: Option<Expr>) -> Self {
        self.call("Any", predicate.into_iter().collect())
    }

    pub fn all(self, predicate: Expr) -> Self {
        self.call("All", vec![predicate])
    }

    pub fn contains(self, value: Expr) -> Self {
        self.call("Contains", vec![value])
    }

    pub fn union(self, other: Query) -> Self {
        self.call("Union", vec![other.expr])
    }

    pub fn concat(self, other: Query) -> Self {
        self.call("Concat", vec![other.expr])
    }

    pub fn except(self, other: Query) -> Self {
        self.call("Except", vec![other.expr])
    }

    pub fn intersect(self, other: Query) -> Self {
        self.call("Intersect", vec![other.expr])
    }

    pub fn cast(self, target: impl Into<String>) -> Self {
        self.typed_call("Cast", target.into())
    }

    pub fn of_type(self, target: impl Into<String>) -> Self {
        self.typed_call("OfType", target.into())
    }

    /// Attaches an execution timeout (seconds) to the generated statement.
    pub fn timeout(self, seconds: i64) -> Self {
        Self {
            expr: Expr::Call(MethodCall {
                category: Category::CustomExtension,
                name: "TimeOut".to_string(),
                args: vec![self.expr, Expr::constant(seconds)],
                type_args: Vec::new(),
            }),
        }
    }

    fn typed_call(self, name: &str, target: String) -> Self {
        Self {
            expr: Expr::Call(MethodCall {
                category: Category::QueryOperators,
                name: name.to_string(),
                args: vec![self.expr],
                type_args: vec![target],
            }),
        }
    }
}

impl From<Query> for Expr {
    fn from(query: Query) -> Self {
        query.expr
    }
}

/// Lambda parameter typed as the named entity.
pub fn param(name: &str, entity: &str) -> ParameterExpr {
    ParameterExpr::entity(name, entity)
}

/// Lambda parameter of a scalar type.
pub fn scalar_param(name: &str, kind: ScalarKind) -> ParameterExpr {
    ParameterExpr::new(name, ExprType::Scalar(kind))
}

pub fn member(owner: impl Into<Expr>, name: &str) -> Expr {
    owner.into().member(name)
}

pub fn constant(value: impl Into<Value>) -> Expr {
    Expr::constant(value)
}

pub fn lambda(params: impl IntoIterator<Item = ParameterExpr>, body: Expr) -> Expr {
    Expr::Lambda(LambdaExpr {
        params: params.into_iter().collect(),
        body: Box::new(body),
    })
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary(BinaryExpr {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn and(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::AndAlso, left, right)
}

pub fn or(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::OrElse, left, right)
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Equal, left, right)
}

pub fn ne(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::NotEqual, left, right)
}

pub fn gt(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::GreaterThan, left, right)
}

pub fn ge(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::GreaterThanOrEqual, left, right)
}

pub fn lt(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::LessThan, left, right)
}

pub fn le(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::LessThanOrEqual, left, right)
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Add, left, right)
}

pub fn coalesce(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Coalesce, left, right)
}

pub fn not(operand: Expr) -> Expr {
    unary(UnaryOp::Not, operand)
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    Expr::Unary(UnaryExpr {
        op,
        operand: Box::new(operand),
        target: None,
    })
}

pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
    Expr::Conditional(ConditionalExpr {
        test: Box::new(test),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
    })
}

pub fn switch(value: Expr, cases: Vec<(Vec<Expr>, Expr)>, default: Option<Expr>) -> Expr {
    Expr::Switch(SwitchExpr {
        value: Box::new(value),
        cases: cases
            .into_iter()
            .map(|(tests, body)| SwitchCase { tests, body })
            .collect(),
        default: default.map(Box::new),
    })
}

/// `new TypeName { member = expr, ... }`
pub fn new_object<S: Into<String>>(
    type_name: impl Into<String>,
    bindings: impl IntoIterator<Item = (S, Expr)>,
) -> Expr {
    Expr::New(NewExpr {
        type_name: type_name.into(),
        bindings: bindings
            .into_iter()
            .map(|(member, expr)| MemberBinding {
                member: member.into(),
                expr,
            })
            .collect(),
    })
}

fn call(category: Category, name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(MethodCall {
        category,
        name: name.to_string(),
        args,
        type_args: Vec::new(),
    })
}

/// String method; the receiver (or first static argument) goes first.
pub fn string_call(name: &str, args: Vec<Expr>) -> Expr {
    call(Category::StringOps, name, args)
}

pub fn enumerable_call(name: &str, args: Vec<Expr>) -> Expr {
    call(Category::EnumerableOps, name, args)
}

pub fn custom_call(name: &str, args: Vec<Expr>) -> Expr {
    call(Category::CustomExtension, name, args)
}

/// Sequence operator used inside a lambda body (`g.Count()`, `orders.Any(..)`).
pub fn query_call(name: &str, args: Vec<Expr>) -> Expr {
    call(Category::QueryOperators, name, args)
}
