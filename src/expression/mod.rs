//! Query expression tree
//!
//! The input of the compiler: an immutable tree produced by the query-building
//! front end (see [`builder::Query`]). Operators are method calls whose first
//! argument is the source sequence; lambdas carry typed parameters so the
//! translator can bind them to table aliases.
//!
//! The compiler only ever reads these nodes.

pub mod builder;
pub mod value;

use serde::{Deserialize, Serialize};

pub use builder::Query;
pub use value::{ScalarKind, Value};

/// Which family a method call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Sequence operators over queryables (`Where`, `Select`, `Take`, ...)
    QueryOperators,
    /// String instance and static helpers (`Contains`, `Substring`, ...)
    StringOps,
    /// Operators over in-memory collections (`Contains`, `Any`)
    EnumerableOps,
    /// Anything else; routed to the pluggable function visitors
    CustomExtension,
}

/// Static type of a lambda parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum ExprType {
    Entity(String),
    Scalar(ScalarKind),
    Nullable(ScalarKind),
    Anonymous(String),
    Grouping,
    Unknown,
}

impl ExprType {
    pub fn entity(name: impl Into<String>) -> Self {
        ExprType::Entity(name.into())
    }

    pub fn entity_name(&self) -> Option<&str> {
        match self {
            ExprType::Entity(name) => Some(name),
            _ => None,
        }
    }

    pub fn scalar_kind(&self) -> ScalarKind {
        match self {
            ExprType::Scalar(kind) | ExprType::Nullable(kind) => *kind,
            _ => ScalarKind::Unknown,
        }
    }
}

impl Default for ExprType {
    fn default() -> Self {
        ExprType::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub category: Category,
    pub name: String,
    #[serde(default)]
    pub args: Vec<Expr>,
    /// Generic type arguments (`Cast<T>`, `OfType<T>`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_args: Vec<String>,
}

impl MethodCall {
    /// The instance receiver or, for sequence operators, the source.
    pub fn receiver(&self) -> Option<&Expr> {
        self.args.first()
    }

    pub fn arg(&self, index: usize) -> Option<&Expr> {
        self.args.get(index)
    }

    pub fn is(&self, category: Category, name: &str) -> bool {
        self.category == category && self.name == name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAccess {
    pub owner: Box<Expr>,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterExpr {
    pub name: String,
    #[serde(default)]
    pub ty: ExprType,
}

impl ParameterExpr {
    pub fn new(name: impl Into<String>, ty: ExprType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// A parameter typed as the named entity.
    pub fn entity(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(name, ExprType::Entity(entity.into()))
    }

    pub fn to_expr(&self) -> Expr {
        Expr::Parameter(self.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// Short-circuit `&&`
    AndAlso,
    /// Short-circuit `||`
    OrElse,
    /// `&` (logical on booleans, bitwise on integers)
    And,
    /// `|` (logical on booleans, bitwise on integers)
    Or,
    ExclusiveOr,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// `??`
    Coalesce,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::AndAlso | BinaryOp::OrElse)
    }

    /// SQL spelling of comparison and arithmetic operators.
    pub fn sql_symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::AndAlso => "AND",
            BinaryOp::OrElse => "OR",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::ExclusiveOr => "^",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::Coalesce => "COALESCE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Negate,
    Convert,
    Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
    /// Target type of a `Convert`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ExprType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpr {
    pub test: Box<Expr>,
    pub if_true: Box<Expr>,
    pub if_false: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberBinding {
    pub member: String,
    pub expr: Expr,
}

/// Object construction: anonymous `new { .. }` or a member-initialized type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpr {
    pub type_name: String,
    #[serde(default)]
    pub bindings: Vec<MemberBinding>,
}

impl NewExpr {
    pub fn binding(&self, member: &str) -> Option<&Expr> {
        self.bindings
            .iter()
            .find(|b| b.member == member)
            .map(|b| &b.expr)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub params: Vec<ParameterExpr>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub tests: Vec<Expr>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchExpr {
    pub value: Box<Expr>,
    pub cases: Vec<SwitchCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Box<Expr>>,
}

/// A node of the query expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expr {
    Call(MethodCall),
    Member(MemberAccess),
    Constant { value: Value },
    Parameter(ParameterExpr),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Conditional(ConditionalExpr),
    New(NewExpr),
    Lambda(LambdaExpr),
    Switch(SwitchExpr),
}

/// Discriminant of [`Expr`], used as a key in the clause override tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Call,
    Member,
    Constant,
    Parameter,
    Binary,
    Unary,
    Conditional,
    New,
    Lambda,
    Switch,
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant {
            value: value.into(),
        }
    }

    pub fn null() -> Self {
        Expr::Constant { value: Value::Null }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Call(_) => NodeKind::Call,
            Expr::Member(_) => NodeKind::Member,
            Expr::Constant { .. } => NodeKind::Constant,
            Expr::Parameter(_) => NodeKind::Parameter,
            Expr::Binary(_) => NodeKind::Binary,
            Expr::Unary(_) => NodeKind::Unary,
            Expr::Conditional(_) => NodeKind::Conditional,
            Expr::New(_) => NodeKind::New,
            Expr::Lambda(_) => NodeKind::Lambda,
            Expr::Switch(_) => NodeKind::Switch,
        }
    }

    pub fn member(self, member: impl Into<String>) -> Self {
        Expr::Member(MemberAccess {
            owner: Box::new(self),
            member: member.into(),
        })
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expr::Constant { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self.strip_convert(), Expr::Constant { value: Value::Null })
    }

    pub fn as_bool_constant(&self) -> Option<bool> {
        self.strip_convert().as_constant().and_then(Value::as_bool)
    }

    /// Removes `Quote` wrappers around a lambda.
    pub fn as_lambda(&self) -> Option<&LambdaExpr> {
        match self {
            Expr::Lambda(lambda) => Some(lambda),
            Expr::Unary(UnaryExpr {
                op: UnaryOp::Quote,
                operand,
                ..
            }) => operand.as_lambda(),
            _ => None,
        }
    }

    /// Skips type conversions, which have no SQL spelling of their own.
    pub fn strip_convert(&self) -> &Expr {
        match self {
            Expr::Unary(UnaryExpr {
                op: UnaryOp::Convert,
                operand,
                ..
            }) => operand.strip_convert(),
            other => other,
        }
    }

    pub fn as_call(&self) -> Option<&MethodCall> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Follows the source argument of sequence operators down to the root.
    pub fn query_root(&self) -> Option<&str> {
        match self {
            Expr::Constant {
                value: Value::Source(entity),
            } => Some(entity),
            Expr::Call(call)
                if matches!(
                    call.category,
                    Category::QueryOperators | Category::CustomExtension
                ) =>
            {
                call.receiver().and_then(Expr::query_root)
            }
            _ => None,
        }
    }

    /// Whether this expression is a database query rather than an in-memory value.
    pub fn is_query(&self) -> bool {
        self.query_root().is_some()
    }
}

impl From<ParameterExpr> for Expr {
    fn from(param: ParameterExpr) -> Self {
        Expr::Parameter(param)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Constant { value }
    }
}
