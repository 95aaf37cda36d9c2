use super::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of types a flow variable can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    String,
    #[serde(alias = "int", alias = "uint")]
    Integer,
    #[serde(alias = "float")]
    Number,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "dict", alias = "mapping")]
    Object,
    Array,
    Address,
}

impl Type {
    pub const ALL: [Type; 7] = [
        Type::String,
        Type::Integer,
        Type::Number,
        Type::Boolean,
        Type::Object,
        Type::Array,
        Type::Address,
    ];

    /// Infers a type from the structure of a runtime value.
    /// `null` has no type of its own and is reported as `Object`.
    pub fn of(value: &Value) -> Type {
        match value {
            Value::Integer(_) => Type::Integer,
            Value::Number(_) => Type::Number,
            Value::Bool(_) => Type::Boolean,
            Value::String(_) => Type::String,
            Value::Array(_) => Type::Array,
            Value::Object(_) | Value::Null => Type::Object,
        }
    }

    /// The value a declared-but-unassigned variable of this type starts with.
    pub fn zero_value(self) -> Value {
        match self {
            Type::String | Type::Address => Value::String(String::new()),
            Type::Integer => Value::Integer(0),
            Type::Number => Value::Number(0.0),
            Type::Boolean => Value::Bool(false),
            Type::Object => Value::Object(IndexMap::new()),
            Type::Array => Value::Array(Vec::new()),
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Integer | Type::Number)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Type::String => "string",
            Type::Integer => "integer",
            Type::Number => "number",
            Type::Boolean => "boolean",
            Type::Object => "object",
            Type::Array => "array",
            Type::Address => "address",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
