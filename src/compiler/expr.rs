use super::types::is_owned;
use crate::backend::Lang;
use crate::error::FlowError;
use crate::ir::{
    ArithOp, CallSpec, CompareOp, ERROR_BINDING, Expr, LogicalOp, Path, Segment, Type, Value,
};
use ahash::AHashMap;
use indexmap::IndexMap;

/// Renders expressions to source text for every target language.
///
/// Types follow the evaluator: `div` and any `number` operand promote arithmetic
/// to `number`, comparisons and membership are `boolean`. Values reached through a
/// nested path, and untyped call results, are taken to be `integer`, matching the
/// integer collections of the type table.
///
/// Rendered text is memoised per expression node and language. The cache is
/// dropped whenever a new variable is declared.
#[derive(Debug, Default)]
pub struct ExprCompiler {
    env: IndexMap<String, Type>,
    cache: AHashMap<(usize, Lang), (String, Type)>,
}

impl ExprCompiler {
    pub fn new(env: IndexMap<String, Type>) -> Self {
        Self {
            env,
            cache: AHashMap::new(),
        }
    }

    /// Makes `name` visible to later expressions. An existing declaration wins.
    pub fn declare(&mut self, name: &str, ty: Type) -> bool {
        if self.env.contains_key(name) {
            return false;
        }
        self.env.insert(name.to_string(), ty);
        self.cache.clear();
        true
    }

    pub fn lookup(&self, name: &str) -> Option<Type> {
        self.env.get(name).copied()
    }

    /// The type `expr` evaluates to, without rendering it.
    pub fn infer(&self, expr: &Expr) -> Result<Type, FlowError> {
        Ok(match expr {
            Expr::Get(path) => self.path_type(path)?,
            Expr::Literal(value) => Type::of(value),
            Expr::Arith { op, operands } => {
                let mut ty = Type::Integer;
                for operand in operands {
                    if self.infer(operand)? == Type::Number {
                        ty = Type::Number;
                    }
                }
                if *op == ArithOp::Div { Type::Number } else { ty }
            }
            Expr::Compare { .. } | Expr::Logical { .. } | Expr::Not(_) | Expr::In { .. } => {
                Type::Boolean
            }
            Expr::Abs(inner) => self.infer(inner)?,
            Expr::Length(_) => Type::Integer,
            Expr::Call(spec) => spec.return_type.unwrap_or(Type::Integer),
        })
    }

    fn path_type(&self, path: &Path) -> Result<Type, FlowError> {
        let root = self
            .lookup(path.root())
            .ok_or_else(|| FlowError::UnknownVariable(path.root().to_string()))?;
        if path.root() == ERROR_BINDING {
            return Ok(match path.keys() {
                [] => Type::Object,
                [Segment::Key(k)] if k == "message" || k == "kind" => Type::String,
                [Segment::Key(k)] if k == "stepIndex" => Type::Integer,
                _ => return Err(FlowError::UnknownVariable(path.to_string())),
            });
        }
        Ok(if path.is_simple() { root } else { Type::Integer })
    }

    /// Renders `expr` for `lang` and reports its type.
    pub fn render(&mut self, expr: &Expr, lang: Lang) -> Result<(String, Type), FlowError> {
        let key = (expr as *const Expr as usize, lang);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }
        let ty = self.infer(expr)?;
        let code = self.render_uncached(expr, ty, lang)?;
        self.cache.insert(key, (code.clone(), ty));
        Ok((code, ty))
    }

    pub fn render_code(&mut self, expr: &Expr, lang: Lang) -> Result<String, FlowError> {
        self.render(expr, lang).map(|(code, _)| code)
    }

    /// Renders `expr` where a `boolean` is required.
    ///
    /// A known non-boolean type is rejected for every target. When the type is
    /// only assumed (nested paths, untyped calls) the dynamic targets check the
    /// value at run time instead.
    pub fn render_bool(
        &mut self,
        expr: &Expr,
        lang: Lang,
        operation: &str,
    ) -> Result<String, FlowError> {
        let (code, ty) = self.render(expr, lang)?;
        if ty == Type::Boolean {
            return Ok(code);
        }
        if is_static(lang) || !is_assumed(expr) {
            return Err(FlowError::type_mismatch(operation, "boolean", ty));
        }
        Ok(match lang {
            Lang::Python => format!("_bool({}, {})", code, string_literal(operation, lang)),
            _ => format!("__bool({}, {})", code, string_literal(operation, lang)),
        })
    }

    fn render_uncached(&mut self, expr: &Expr, ty: Type, lang: Lang) -> Result<String, FlowError> {
        match expr {
            Expr::Get(path) => self.render_get(path, lang),
            Expr::Literal(value) => literal(value, lang),
            Expr::Arith { op, operands } => self.render_arith(*op, operands, ty, lang),
            Expr::Compare { left, op, right } => self.render_compare(left, *op, right, lang),
            Expr::Logical { op, operands } => {
                let parts = operands
                    .iter()
                    .map(|operand| self.render_bool(operand, lang, op.keyword()))
                    .collect::<Result<Vec<_>, _>>()?;
                let joiner = match (lang, op) {
                    (Lang::Python, LogicalOp::And) => " and ",
                    (Lang::Python, LogicalOp::Or) => " or ",
                    (_, LogicalOp::And) => " && ",
                    (_, LogicalOp::Or) => " || ",
                };
                Ok(format!("({})", parts.join(joiner)))
            }
            Expr::Not(inner) => {
                let inner = self.render_bool(inner, lang, "not")?;
                Ok(match lang {
                    Lang::Python => format!("(not {})", inner),
                    _ => format!("(!{})", inner),
                })
            }
            Expr::Abs(inner) => {
                let (code, inner_ty) = self.render(inner, lang)?;
                match (lang, inner_ty) {
                    (Lang::Python, Type::Integer | Type::Number) => Ok(format!("abs({})", code)),
                    (Lang::Javascript, Type::Integer | Type::Number) => {
                        Ok(format!("Math.abs({})", code))
                    }
                    (Lang::Rust, Type::Integer) => Ok(format!("i32::abs({})", code)),
                    (Lang::Rust, Type::Number) => Ok(format!("f64::abs({})", code)),
                    // Solidity integers are unsigned.
                    (Lang::Solidity, Type::Integer | Type::Number) => Ok(code),
                    (_, other) => Err(FlowError::type_mismatch("abs", "integer or number", other)),
                }
            }
            Expr::Length(inner) => {
                let (code, inner_ty) = self.render_borrowed(inner, lang)?;
                match (lang, inner_ty) {
                    (Lang::Python, _) => Ok(format!("len({})", code)),
                    (Lang::Javascript, _) => Ok(format!("{}.length", code)),
                    (Lang::Rust, Type::String | Type::Address) => {
                        Ok(format!("({}.chars().count() as i32)", code))
                    }
                    (Lang::Rust, Type::Array) => Ok(format!("({}.len() as i32)", code)),
                    (Lang::Solidity, Type::String) => Ok(format!("bytes({}).length", code)),
                    (Lang::Solidity, Type::Array) => Ok(format!("{}.length", code)),
                    (_, other) => Err(FlowError::type_mismatch("length", "array or string", other)),
                }
            }
            Expr::In { item, array } => {
                let item = self.render_code(item, lang)?;
                let (array, array_ty) = self.render_borrowed(array, lang)?;
                if is_static(lang) && array_ty != Type::Array {
                    return Err(FlowError::type_mismatch("in", "array", array_ty));
                }
                Ok(match lang {
                    Lang::Python => format!("({} in {})", item, array),
                    Lang::Javascript => format!("{}.includes({})", array, item),
                    Lang::Rust => format!("{}.contains(&{})", array, item),
                    Lang::Solidity => format!("_contains({}, {})", array, item),
                })
            }
            Expr::Call(spec) => self.render_call(spec, lang),
        }
    }

    /// Like [`render`](Self::render) but without the clone generated Rust
    /// puts on owned values, for operands that are only borrowed.
    fn render_borrowed(&mut self, expr: &Expr, lang: Lang) -> Result<(String, Type), FlowError> {
        match expr {
            Expr::Get(path) if lang == Lang::Rust && path.is_simple() => {
                let ty = self.infer(expr)?;
                Ok((ident(path.root(), lang), ty))
            }
            _ => self.render(expr, lang),
        }
    }

    /// Renders a variable path that is not itself an expression node of the flow,
    /// such as a loop source.
    pub fn render_path(&self, path: &Path, lang: Lang) -> Result<(String, Type), FlowError> {
        Ok((self.render_get(path, lang)?, self.path_type(path)?))
    }

    fn render_get(&self, path: &Path, lang: Lang) -> Result<String, FlowError> {
        let ty = self.path_type(path)?;
        let root = ident(path.root(), lang);
        if path.root() == ERROR_BINDING && !path.is_simple() {
            return Ok(caught_field(&root, path, lang));
        }

        match lang {
            Lang::Python | Lang::Javascript => {
                let mut code = root;
                for key in path.keys() {
                    code.push_str(&format!("[{}]", segment(key, lang)));
                }
                Ok(code)
            }
            Lang::Rust => match path.keys() {
                [] if is_owned(ty) => Ok(format!("{}.clone()", root)),
                [] => Ok(root),
                [key] => Ok(format!(
                    "*{}.get({}).ok_or_else(|| FlowError::UnknownVariable({}.to_string()))?",
                    root,
                    match key {
                        Segment::Index(i) => i.to_string(),
                        Segment::Key(k) => string_literal(k, Lang::Rust),
                    },
                    string_literal(&path.to_string(), Lang::Rust)
                )),
                _ => Err(too_deep(path, lang)),
            },
            Lang::Solidity => match path.keys() {
                [] => Ok(root),
                [key] => Ok(format!("{}[{}]", root, segment(key, lang))),
                _ => Err(too_deep(path, lang)),
            },
        }
    }

    fn render_arith(
        &mut self,
        op: ArithOp,
        operands: &[Expr],
        ty: Type,
        lang: Lang,
    ) -> Result<String, FlowError> {
        let mut parts = Vec::with_capacity(operands.len());
        for operand in operands {
            let (code, operand_ty) = self.render(operand, lang)?;
            if is_static(lang) && !operand_ty.is_numeric() {
                return Err(FlowError::type_mismatch(op.symbol(), "integer or number", operand_ty));
            }
            // Generated Rust mixes i32 and f64 only through explicit casts.
            let code = if lang == Lang::Rust && ty == Type::Number && operand_ty == Type::Integer {
                format!("({} as f64)", code)
            } else {
                code
            };
            parts.push(code);
        }

        let helper = match (lang, op) {
            (Lang::Python, ArithOp::Div) => Some(("_div(", ")")),
            (Lang::Python, ArithOp::Mod) => Some(("_mod(", ")")),
            (Lang::Javascript, ArithOp::Div) => Some(("__div(", ")")),
            (Lang::Javascript, ArithOp::Mod) => Some(("__mod(", ")")),
            (Lang::Rust, ArithOp::Div) => Some(("flow_div(", ")?")),
            (Lang::Rust, ArithOp::Mod) => Some(("flow_rem(", ")?")),
            _ => None,
        };
        let mut iter = parts.into_iter();
        let first = iter.next().unwrap_or_default();
        let rest: Vec<String> = iter.collect();
        if rest.is_empty() {
            return Ok(first);
        }
        Ok(match helper {
            Some((open, close)) => rest
                .into_iter()
                .fold(first, |acc, rhs| format!("{}{}, {}{}", open, acc, rhs, close)),
            None => {
                let sep = format!(" {} ", op.symbol());
                format!("({}{}{})", first, sep, rest.join(&sep))
            }
        })
    }

    fn render_compare(
        &mut self,
        left: &Expr,
        op: CompareOp,
        right: &Expr,
        lang: Lang,
    ) -> Result<String, FlowError> {
        let (mut l, lt) = self.render(left, lang)?;
        let (mut r, rt) = self.render(right, lang)?;
        let symbol = match (lang, op) {
            (Lang::Javascript, CompareOp::Eq) => "===",
            (Lang::Javascript, CompareOp::Neq) => "!==",
            _ => op.symbol(),
        };

        match lang {
            Lang::Rust => {
                if lt.is_numeric() && rt.is_numeric() && lt != rt {
                    if lt == Type::Integer {
                        l = format!("({} as f64)", l);
                    } else {
                        r = format!("({} as f64)", r);
                    }
                } else if lt != rt && !(is_text(lt) && is_text(rt)) {
                    return Err(FlowError::type_mismatch(op.symbol(), lt.as_str(), rt));
                }
            }
            Lang::Solidity if is_text(lt) || is_text(rt) => {
                if !op.is_equality() {
                    return Err(FlowError::compile(
                        lang,
                        "strings cannot be ordered in solidity",
                    ));
                }
                return Ok(format!(
                    "(keccak256(bytes({})) {} keccak256(bytes({})))",
                    l, symbol, r
                ));
            }
            _ => {}
        }
        Ok(format!("({} {} {})", l, symbol, r))
    }

    /// Renders a host call, for `call` steps as well as call expressions.
    pub fn render_call(&mut self, spec: &CallSpec, lang: Lang) -> Result<String, FlowError> {
        let args = spec
            .args
            .values()
            .map(|arg| self.render_code(arg, lang))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let call = format!("{}({})", spec.function, args);
        Ok(match (lang, spec.is_async) {
            (Lang::Python | Lang::Javascript, true) => format!("(await {})", call),
            (Lang::Python | Lang::Javascript, false) | (Lang::Solidity, _) => call,
            (Lang::Rust, true) => format!("{}.await?", call),
            (Lang::Rust, false) => format!("{}?", call),
        })
    }
}

/// Whether the inferred type of `expr` is a default rather than a declaration.
fn is_assumed(expr: &Expr) -> bool {
    match expr {
        Expr::Get(path) => !path.is_simple() && path.root() != ERROR_BINDING,
        Expr::Call(spec) => spec.return_type.is_none(),
        _ => false,
    }
}

/// Whether the target checks operand types at compile time.
pub(crate) fn is_static(lang: Lang) -> bool {
    matches!(lang, Lang::Rust | Lang::Solidity)
}

fn is_text(ty: Type) -> bool {
    matches!(ty, Type::String | Type::Address)
}

/// The identifier a flow variable is emitted as.
pub fn ident(name: &str, lang: Lang) -> String {
    match (lang, name) {
        // `error` is a keyword there.
        (Lang::Solidity, ERROR_BINDING) => "failure".to_string(),
        _ => name.to_string(),
    }
}

/// An index or key in the subscript syntax of `lang`.
pub(crate) fn segment(key: &Segment, lang: Lang) -> String {
    match key {
        Segment::Index(i) => i.to_string(),
        Segment::Key(k) => string_literal(k, lang),
    }
}

fn caught_field(root: &str, path: &Path, lang: Lang) -> String {
    let field = path.keys().first().map(|k| k.to_string()).unwrap_or_default();
    match lang {
        Lang::Python | Lang::Javascript => format!("{}[{}]", root, string_literal(&field, lang)),
        Lang::Rust if field == "stepIndex" => format!("{}.step_index", root),
        Lang::Rust => format!("{}.{}.clone()", root, field),
        Lang::Solidity => format!("{}.{}", root, field),
    }
}

fn too_deep(path: &Path, lang: Lang) -> FlowError {
    FlowError::compile(
        lang,
        format!(
            "path '{}' is nested deeper than one key, which {} collections cannot hold",
            path, lang
        ),
    )
}

/// A string literal in the syntax of `lang`.
pub fn string_literal(s: &str, lang: Lang) -> String {
    match lang {
        Lang::Rust => format!("{:?}", s),
        _ => serde_json::Value::String(s.to_string()).to_string(),
    }
}

/// Renders a literal value. Rust and Solidity only accept values their type table can hold.
pub fn literal(value: &Value, lang: Lang) -> Result<String, FlowError> {
    let unsupported = |what: &str| {
        FlowError::compile(lang, format!("{} literal '{}' is not supported", what, value))
    };
    Ok(match (lang, value) {
        (Lang::Python, Value::Null) => "None".to_string(),
        (Lang::Javascript, Value::Null) => "null".to_string(),
        (_, Value::Null) => return Err(unsupported("null")),

        (Lang::Python, Value::Bool(true)) => "True".to_string(),
        (Lang::Python, Value::Bool(false)) => "False".to_string(),
        (_, Value::Bool(b)) => b.to_string(),

        (Lang::Rust, Value::Integer(i)) if i32::try_from(*i).is_err() => {
            return Err(unsupported("out of range integer"));
        }
        (Lang::Solidity, Value::Integer(i)) if *i < 0 => return Err(unsupported("negative")),
        (_, Value::Integer(i)) => i.to_string(),

        (Lang::Python | Lang::Rust, Value::Number(n)) => format!("{:?}", n),
        (Lang::Javascript, Value::Number(n)) => n.to_string(),
        (Lang::Solidity, Value::Number(n)) if n.fract() == 0.0 && *n >= 0.0 => {
            format!("{}", *n as u64)
        }
        (Lang::Solidity, Value::Number(_)) => return Err(unsupported("fractional")),

        (Lang::Rust, Value::String(s)) => format!("String::from({})", string_literal(s, lang)),
        (_, Value::String(s)) => string_literal(s, lang),

        (Lang::Python | Lang::Javascript, Value::Array(items)) => {
            let items = items
                .iter()
                .map(|item| literal(item, lang))
                .collect::<Result<Vec<_>, _>>()?;
            format!("[{}]", items.join(", "))
        }
        (Lang::Rust, Value::Array(items)) if items.is_empty() => "Vec::new()".to_string(),
        (Lang::Rust, Value::Array(items)) => {
            if !items.iter().all(|item| matches!(item, Value::Integer(_))) {
                return Err(unsupported("non-integer array"));
            }
            let items = items
                .iter()
                .map(|item| literal(item, lang))
                .collect::<Result<Vec<_>, _>>()?;
            format!("vec![{}]", items.join(", "))
        }
        (Lang::Python | Lang::Javascript, Value::Object(map)) => {
            let entries = map
                .iter()
                .map(|(k, v)| Ok(format!("{}: {}", string_literal(k, lang), literal(v, lang)?)))
                .collect::<Result<Vec<_>, FlowError>>()?;
            format!("{{{}}}", entries.join(", "))
        }
        (Lang::Rust, Value::Object(map)) if map.is_empty() => "HashMap::new()".to_string(),
        (Lang::Rust, Value::Object(map)) => {
            if !map.values().all(|v| matches!(v, Value::Integer(_))) {
                return Err(unsupported("non-integer object"));
            }
            let entries = map
                .iter()
                .map(|(k, v)| {
                    Ok(format!(
                        "(String::from({}), {})",
                        string_literal(k, lang),
                        literal(v, lang)?
                    ))
                })
                .collect::<Result<Vec<_>, FlowError>>()?;
            format!("HashMap::from([{}])", entries.join(", "))
        }
        (Lang::Solidity, Value::Array(_)) => return Err(unsupported("array")),
        (Lang::Solidity, Value::Object(_)) => return Err(unsupported("object")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler() -> ExprCompiler {
        let mut env = IndexMap::new();
        env.insert("x".to_string(), Type::Integer);
        env.insert("rate".to_string(), Type::Number);
        env.insert("name".to_string(), Type::String);
        env.insert("items".to_string(), Type::Array);
        ExprCompiler::new(env)
    }

    fn parse(json: serde_json::Value) -> Expr {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn square_renders_in_every_language() {
        let expr = parse(serde_json::json!({"mul": [{"get": "x"}, {"get": "x"}]}));
        let mut c = compiler();
        for lang in Lang::ALL {
            let (code, ty) = c.render(&expr, lang).unwrap();
            assert_eq!(code, "(x * x)");
            assert_eq!(ty, Type::Integer);
        }
    }

    #[test]
    fn division_goes_through_checked_helpers() {
        let expr = parse(serde_json::json!({"div": [{"get": "x"}, 2]}));
        let mut c = compiler();
        assert_eq!(c.render_code(&expr, Lang::Python).unwrap(), "_div(x, 2)");
        assert_eq!(c.render_code(&expr, Lang::Javascript).unwrap(), "__div(x, 2)");
        assert_eq!(
            c.render_code(&expr, Lang::Rust).unwrap(),
            "flow_div((x as f64), (2 as f64))?"
        );
        assert_eq!(c.render(&expr, Lang::Solidity).unwrap().1, Type::Number);
    }

    #[test]
    fn equality_is_strict_in_javascript() {
        let expr = parse(serde_json::json!({"compare": {"left": {"get": "x"}, "op": "==", "right": 3}}));
        let mut c = compiler();
        assert_eq!(c.render_code(&expr, Lang::Javascript).unwrap(), "(x === 3)");
        assert_eq!(c.render_code(&expr, Lang::Python).unwrap(), "(x == 3)");
    }

    #[test]
    fn solidity_compares_strings_by_hash() {
        let expr = parse(serde_json::json!({"compare": {"left": {"get": "name"}, "op": "==", "right": "bob"}}));
        let code = compiler().render_code(&expr, Lang::Solidity).unwrap();
        assert_eq!(code, "(keccak256(bytes(name)) == keccak256(bytes(\"bob\")))");
    }

    #[test]
    fn rust_promotes_integers_when_mixing() {
        let expr = parse(serde_json::json!({"add": [{"get": "x"}, {"get": "rate"}]}));
        let (code, ty) = compiler().render(&expr, Lang::Rust).unwrap();
        assert_eq!(code, "((x as f64) + rate)");
        assert_eq!(ty, Type::Number);
    }

    #[test]
    fn length_and_membership_use_builtins() {
        let len = parse(serde_json::json!({"length": {"get": "items"}}));
        let member = parse(serde_json::json!({"in": {"item": 2, "array": {"get": "items"}}}));
        let mut c = compiler();
        assert_eq!(c.render_code(&len, Lang::Python).unwrap(), "len(items)");
        assert_eq!(c.render_code(&len, Lang::Rust).unwrap(), "(items.len() as i32)");
        assert_eq!(c.render_code(&member, Lang::Javascript).unwrap(), "items.includes(2)");
        assert_eq!(c.render_code(&member, Lang::Rust).unwrap(), "items.contains(&2)");
    }

    #[test]
    fn declared_non_booleans_are_rejected_by_every_target() {
        let expr = parse(serde_json::json!({"and": [{"get": "x"}, true]}));
        let mut c = compiler();
        for lang in Lang::ALL {
            let err = c.render(&expr, lang).unwrap_err();
            assert!(matches!(err, FlowError::TypeMismatch { .. }), "{:?}", lang);
        }
    }

    #[test]
    fn assumed_operands_are_checked_at_run_time() {
        let expr = parse(serde_json::json!({"not": {"get": ["items", 0]}}));
        let mut c = compiler();
        assert_eq!(c.render_code(&expr, Lang::Python).unwrap(), "(not _bool(items[0], \"not\"))");
        assert_eq!(c.render_code(&expr, Lang::Javascript).unwrap(), "(!__bool(items[0], \"not\"))");
        assert!(matches!(c.render(&expr, Lang::Rust), Err(FlowError::TypeMismatch { .. })));
    }

    #[test]
    fn abs_follows_the_operand_type() {
        let int = parse(serde_json::json!({"abs": {"value": {"sub": [0, {"get": "x"}]}}}));
        let float = parse(serde_json::json!({"abs": {"get": "rate"}}));
        let mut c = compiler();
        assert_eq!(c.render(&int, Lang::Python).unwrap(), ("abs((0 - x))".to_string(), Type::Integer));
        assert_eq!(c.render_code(&int, Lang::Rust).unwrap(), "i32::abs((0 - x))");
        assert_eq!(c.render_code(&float, Lang::Javascript).unwrap(), "Math.abs(rate)");
        assert_eq!(c.render(&float, Lang::Rust).unwrap(), ("f64::abs(rate)".to_string(), Type::Number));
        let text = parse(serde_json::json!({"abs": {"get": "name"}}));
        assert!(matches!(c.render(&text, Lang::Python), Err(FlowError::TypeMismatch { .. })));
    }

    #[test]
    fn undeclared_names_are_unknown() {
        let expr = parse(serde_json::json!({"get": "missing"}));
        let err = compiler().render(&expr, Lang::Python).unwrap_err();
        assert_eq!(err, FlowError::UnknownVariable("missing".to_string()));
    }

    #[test]
    fn null_has_no_rust_literal() {
        assert_eq!(literal(&Value::Null, Lang::Python).unwrap(), "None");
        assert!(matches!(
            literal(&Value::Null, Lang::Rust),
            Err(FlowError::CompileError { .. })
        ));
    }
}
