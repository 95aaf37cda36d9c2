//! Type names and zero values per target language.

use crate::backend::Lang;
use crate::ir::Type;

/// How `ty` is spelled in `lang`.
pub fn type_name(ty: Type, lang: Lang) -> &'static str {
    match (lang, ty) {
        (Lang::Python, Type::String | Type::Address) => "str",
        (Lang::Python, Type::Integer) => "int",
        (Lang::Python, Type::Number) => "float",
        (Lang::Python, Type::Boolean) => "bool",
        (Lang::Python, Type::Object) => "dict",
        (Lang::Python, Type::Array) => "list",

        (Lang::Javascript, Type::String | Type::Address) => "string",
        (Lang::Javascript, Type::Integer | Type::Number) => "number",
        (Lang::Javascript, Type::Boolean) => "boolean",
        (Lang::Javascript, Type::Object) => "object",
        (Lang::Javascript, Type::Array) => "Array",

        (Lang::Rust, Type::String | Type::Address) => "String",
        (Lang::Rust, Type::Integer) => "i32",
        (Lang::Rust, Type::Number) => "f64",
        (Lang::Rust, Type::Boolean) => "bool",
        (Lang::Rust, Type::Object) => "HashMap<String, i32>",
        (Lang::Rust, Type::Array) => "Vec<i32>",

        (Lang::Solidity, Type::String) => "string",
        // No native floating point.
        (Lang::Solidity, Type::Integer | Type::Number) => "uint256",
        (Lang::Solidity, Type::Boolean) => "bool",
        (Lang::Solidity, Type::Object) => "mapping",
        (Lang::Solidity, Type::Array) => "uint256[]",
        (Lang::Solidity, Type::Address) => "address",
    }
}

/// The literal a declared-but-unassigned variable starts with.
///
/// Solidity has none: its declarations are zero-initialised by the language.
pub fn zero_value(ty: Type, lang: Lang) -> Option<&'static str> {
    let zero = match (lang, ty) {
        (Lang::Solidity, _) => return None,

        (Lang::Python, Type::String | Type::Address) => "''",
        (Lang::Python, Type::Integer) => "0",
        (Lang::Python, Type::Number) => "0.0",
        (Lang::Python, Type::Boolean) => "False",
        (Lang::Python, Type::Object) => "{}",
        (Lang::Python, Type::Array) => "[]",

        (Lang::Javascript, Type::String | Type::Address) => "''",
        (Lang::Javascript, Type::Integer | Type::Number) => "0",
        (Lang::Javascript, Type::Boolean) => "false",
        (Lang::Javascript, Type::Object) => "{}",
        (Lang::Javascript, Type::Array) => "[]",

        (Lang::Rust, Type::String | Type::Address) => "String::new()",
        (Lang::Rust, Type::Integer) => "0",
        (Lang::Rust, Type::Number) => "0.0",
        (Lang::Rust, Type::Boolean) => "false",
        (Lang::Rust, Type::Object) => "HashMap::new()",
        (Lang::Rust, Type::Array) => "Vec::new()",
    };
    Some(zero)
}

/// Whether values of `ty` are cloned rather than copied in generated Rust.
pub(crate) fn is_owned(ty: Type) -> bool {
    matches!(
        ty,
        Type::String | Type::Address | Type::Object | Type::Array
    )
}
