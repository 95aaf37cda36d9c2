use super::{Path, Type, Value};
use indexmap::IndexMap;
use serde::de::{Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value-producing IR node. Only `Call` may have side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExprDoc", into = "ExprDoc")]
pub enum Expr {
    Get(Path),
    Literal(Value),
    Arith { op: ArithOp, operands: Vec<Expr> },
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    Logical { op: LogicalOp, operands: Vec<Expr> },
    Not(Box<Expr>),
    Abs(Box<Expr>),
    Length(Box<Expr>),
    In { item: Box<Expr>, array: Box<Expr> },
    Call(CallSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==", alias = "===")]
    Eq,
    #[serde(rename = "!=", alias = "!==")]
    Neq,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Neq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn keyword(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }
}

/// An invocation of a host-supplied function, shared by the `call` step and expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSpec {
    pub function: String,
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: IndexMap<String, Expr>,
    #[serde(default, rename = "async", alias = "isAsync")]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<Type>,
}

impl CallSpec {
    pub fn new(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            function: function.into(),
            args: args
                .into_iter()
                .enumerate()
                .map(|(i, e)| (format!("arg{}", i), e))
                .collect(),
            is_async: false,
            return_type: None,
        }
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn returning(mut self, ty: Type) -> Self {
        self.return_type = Some(ty);
        self
    }
}

/// Accepts call arguments as a named object or as a positional list.
fn deserialize_args<'de, D>(deserializer: D) -> Result<IndexMap<String, Expr>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ArgsVisitor;

    impl<'de> Visitor<'de> for ArgsVisitor {
        type Value = IndexMap<String, Expr>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object of named arguments or a list of positional arguments")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut args = IndexMap::new();
            while let Some(expr) = seq.next_element::<Expr>()? {
                args.insert(format!("arg{}", args.len()), expr);
            }
            Ok(args)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut args = IndexMap::new();
            while let Some((name, expr)) = map.next_entry::<String, Expr>()? {
                args.insert(name, expr);
            }
            Ok(args)
        }
    }

    deserializer.deserialize_any(ArgsVisitor)
}

// --- JSON representation ---

/// Expressions are tagged objects; bare JSON scalars and arrays are accepted as literals.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ExprDoc {
    Tagged(ExprRepr),
    Bare(Value),
}

impl TryFrom<ExprDoc> for Expr {
    type Error = String;

    fn try_from(doc: ExprDoc) -> Result<Self, Self::Error> {
        match doc {
            ExprDoc::Tagged(repr) => Expr::try_from(repr),
            ExprDoc::Bare(Value::Object(map)) => Err(format!(
                "expected an expression object with a single known tag, found keys [{}]",
                map.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
            )),
            ExprDoc::Bare(value) => Ok(Expr::Literal(value)),
        }
    }
}

impl From<Expr> for ExprDoc {
    fn from(expr: Expr) -> Self {
        ExprDoc::Tagged(ExprRepr::from(expr))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ExprRepr {
    Get(Path),
    #[serde(alias = "value")]
    Literal(Value),
    Add(Vec<Expr>),
    #[serde(alias = "subtract")]
    Sub(Vec<Expr>),
    #[serde(alias = "multiply")]
    Mul(Vec<Expr>),
    #[serde(alias = "divide")]
    Div(Vec<Expr>),
    Mod(Vec<Expr>),
    Compare(CompareRepr),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Abs(AbsRepr),
    Length(Box<Expr>),
    In(InRepr),
    Call(CallSpec),
    /// Grouping wrapper (`{"expr": {...}}`) kept for older flow documents.
    #[serde(skip_serializing)]
    Expr(Box<Expr>),
}

#[derive(Serialize, Deserialize)]
struct CompareRepr {
    left: Box<Expr>,
    op: CompareOp,
    right: Box<Expr>,
}

/// `abs` takes `{"value": expr}`, or the operand directly.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AbsRepr {
    Wrapped { value: Box<Expr> },
    Bare(Box<Expr>),
}

#[derive(Serialize, Deserialize)]
struct InRepr {
    #[serde(alias = "value")]
    item: Box<Expr>,
    array: Box<Expr>,
}

impl TryFrom<ExprRepr> for Expr {
    type Error = String;

    fn try_from(repr: ExprRepr) -> Result<Self, Self::Error> {
        let arith = |op: ArithOp, operands: Vec<Expr>| {
            if operands.is_empty() {
                Err(format!("'{}' requires at least one operand", op.symbol()))
            } else {
                Ok(Expr::Arith { op, operands })
            }
        };
        let logical = |op: LogicalOp, operands: Vec<Expr>| {
            if operands.is_empty() {
                Err(format!("'{}' requires at least one operand", op.keyword()))
            } else {
                Ok(Expr::Logical { op, operands })
            }
        };
        match repr {
            ExprRepr::Get(path) => Ok(Expr::Get(path)),
            ExprRepr::Literal(value) => Ok(Expr::Literal(value)),
            ExprRepr::Add(ops) => arith(ArithOp::Add, ops),
            ExprRepr::Sub(ops) => arith(ArithOp::Sub, ops),
            ExprRepr::Mul(ops) => arith(ArithOp::Mul, ops),
            ExprRepr::Div(ops) => arith(ArithOp::Div, ops),
            ExprRepr::Mod(ops) => arith(ArithOp::Mod, ops),
            ExprRepr::Compare(c) => Ok(Expr::Compare {
                left: c.left,
                op: c.op,
                right: c.right,
            }),
            ExprRepr::And(ops) => logical(LogicalOp::And, ops),
            ExprRepr::Or(ops) => logical(LogicalOp::Or, ops),
            ExprRepr::Not(e) => Ok(Expr::Not(e)),
            ExprRepr::Abs(AbsRepr::Wrapped { value } | AbsRepr::Bare(value)) => Ok(Expr::Abs(value)),
            ExprRepr::Length(e) => Ok(Expr::Length(e)),
            ExprRepr::In(i) => Ok(Expr::In {
                item: i.item,
                array: i.array,
            }),
            ExprRepr::Call(spec) => Ok(Expr::Call(spec)),
            ExprRepr::Expr(inner) => Ok(*inner),
        }
    }
}

impl From<Expr> for ExprRepr {
    fn from(expr: Expr) -> Self {
        match expr {
            Expr::Get(path) => ExprRepr::Get(path),
            Expr::Literal(value) => ExprRepr::Literal(value),
            Expr::Arith { op, operands } => match op {
                ArithOp::Add => ExprRepr::Add(operands),
                ArithOp::Sub => ExprRepr::Sub(operands),
                ArithOp::Mul => ExprRepr::Mul(operands),
                ArithOp::Div => ExprRepr::Div(operands),
                ArithOp::Mod => ExprRepr::Mod(operands),
            },
            Expr::Compare { left, op, right } => ExprRepr::Compare(CompareRepr { left, op, right }),
            Expr::Logical { op, operands } => match op {
                LogicalOp::And => ExprRepr::And(operands),
                LogicalOp::Or => ExprRepr::Or(operands),
            },
            Expr::Not(e) => ExprRepr::Not(e),
            Expr::Abs(value) => ExprRepr::Abs(AbsRepr::Wrapped { value }),
            Expr::Length(e) => ExprRepr::Length(e),
            Expr::In { item, array } => ExprRepr::In(InRepr { item, array }),
            Expr::Call(spec) => ExprRepr::Call(spec),
        }
    }
}

/// Tags accepted for expression objects in a flow document.
pub(crate) const EXPR_TAGS: &[&str] = &[
    "get", "literal", "value", "add", "sub", "subtract", "mul", "multiply", "div", "divide",
    "mod", "compare", "and", "or", "not", "abs", "length", "in", "call", "expr",
];

impl Expr {
    pub fn get(path: impl Into<Path>) -> Self {
        Expr::Get(path.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn arith(op: ArithOp, operands: Vec<Expr>) -> Self {
        Expr::Arith { op, operands }
    }

    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn logical(op: LogicalOp, operands: Vec<Expr>) -> Self {
        Expr::Logical { op, operands }
    }

    pub fn call(spec: CallSpec) -> Self {
        Expr::Call(spec)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Expr::Get(_) => "get",
            Expr::Literal(_) => "literal",
            Expr::Arith { .. } => "arith",
            Expr::Compare { .. } => "compare",
            Expr::Logical { .. } => "logical",
            Expr::Not(_) => "not",
            Expr::Abs(_) => "abs",
            Expr::Length(_) => "length",
            Expr::In { .. } => "in",
            Expr::Call(_) => "call",
        }
    }

    /// Whether evaluating this expression may suspend on an asynchronous call.
    pub fn has_async_call(&self) -> bool {
        match self {
            Expr::Call(spec) => spec.is_async || spec.args.values().any(Expr::has_async_call),
            Expr::Arith { operands, .. } | Expr::Logical { operands, .. } => {
                operands.iter().any(Expr::has_async_call)
            }
            Expr::Compare { left, right, .. } => left.has_async_call() || right.has_async_call(),
            Expr::In { item, array } => item.has_async_call() || array.has_async_call(),
            Expr::Not(e) | Expr::Abs(e) | Expr::Length(e) => e.has_async_call(),
            Expr::Get(_) | Expr::Literal(_) => false,
        }
    }

    /// Collects every call made by this expression, innermost first.
    pub fn collect_calls<'a>(&'a self, calls: &mut Vec<&'a CallSpec>) {
        match self {
            Expr::Call(spec) => {
                for arg in spec.args.values() {
                    arg.collect_calls(calls);
                }
                calls.push(spec);
            }
            Expr::Arith { operands, .. } | Expr::Logical { operands, .. } => {
                for operand in operands {
                    operand.collect_calls(calls);
                }
            }
            Expr::Compare { left, right, .. } => {
                left.collect_calls(calls);
                right.collect_calls(calls);
            }
            Expr::In { item, array } => {
                item.collect_calls(calls);
                array.collect_calls(calls);
            }
            Expr::Not(e) | Expr::Abs(e) | Expr::Length(e) => e.collect_calls(calls),
            Expr::Get(_) | Expr::Literal(_) => {}
        }
    }
}
