use super::{Backend, Lang, appends, contains_step, host_functions, is_async_map};
use crate::compiler::{CodeWriter, Unit, string_literal, type_name, zero_value};
use crate::diagnostics::LogLevel;
use crate::error::FlowError;
use crate::ir::{ERROR_BINDING, Expr, LogPart, Path, Segment, Step, Type};
use heck::ToSnakeCase;
use itertools::Itertools;

const LANG: Lang = Lang::Rust;

const PRELUDE: &str = r#"#[derive(Debug, Clone, PartialEq)]
pub enum FlowError {
    AssertionFailed(String),
    Arithmetic(String),
    UnknownVariable(String),
    ExternalCall(String),
}

impl FlowError {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::AssertionFailed(_) => "AssertionFailed",
            FlowError::Arithmetic(_) => "ArithmeticError",
            FlowError::UnknownVariable(_) => "UnknownVariable",
            FlowError::ExternalCall(_) => "ExternalCallError",
        }
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::AssertionFailed(message) => write!(f, "{}", message),
            FlowError::Arithmetic(message) => write!(f, "Arithmetic error: {}", message),
            FlowError::UnknownVariable(name) => write!(f, "Unknown variable '{}'", name),
            FlowError::ExternalCall(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for FlowError {}

/// The value bound to `error` when a `try` body fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaughtError {
    pub message: String,
    pub step_index: i32,
    pub kind: String,
}

impl CaughtError {
    pub fn new(error: &FlowError, step_index: i32) -> Self {
        Self {
            message: error.to_string(),
            step_index,
            kind: error.kind().to_string(),
        }
    }
}

impl fmt::Display for CaughtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"message\": {:?}, \"stepIndex\": {}, \"kind\": {:?}}}",
            self.message, self.step_index, self.kind
        )
    }
}

fn flow_div(a: f64, b: f64) -> Result<f64, FlowError> {
    if b == 0.0 {
        return Err(FlowError::Arithmetic("division by zero".to_string()));
    }
    Ok(a / b)
}

fn flow_rem<T>(a: T, b: T) -> Result<T, FlowError>
where
    T: std::ops::Rem<Output = T> + PartialEq + Default + Copy,
{
    if b == T::default() {
        return Err(FlowError::Arithmetic("modulo by zero".to_string()));
    }
    Ok(a % b)
}"#;

/// Emits a Rust module with one (possibly `async`) function returning
/// `Result<Option<T>, FlowError>`.
///
/// Generated code depends on `rayon` for synchronous `map` steps and on
/// `futures` for asynchronous ones. Host functions must be in scope with the
/// signature `fn(args..) -> Result<T, FlowError>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustBackend;

impl Backend for RustBackend {
    fn lang(&self) -> Lang {
        LANG
    }

    fn generate(&self, unit: &mut Unit<'_>) -> Result<String, FlowError> {
        let flow = unit.flow;
        let name = flow.name.to_snake_case();
        let is_async = flow.has_async_call();
        let parallel = contains_step(&flow.steps, &|step| match step {
            Step::Map { body, .. } => !(is_async && is_async_map(body)),
            _ => false,
        });

        let mut w = CodeWriter::new("    ");
        w.line(format!("//! Generated from flow {}.", string_literal(&flow.name, LANG)));
        let hosts = host_functions(flow);
        if !hosts.is_empty() {
            w.line("//!");
            w.line(format!("//! Host functions expected in scope: {}", hosts.keys().join(", ")));
        }
        w.blank();
        w.line("#[allow(unused_imports)]");
        w.line("use std::collections::HashMap;");
        w.line("use std::fmt;");
        if parallel {
            w.line("use rayon::prelude::*;");
        }
        w.blank();
        w.lines(PRELUDE);
        w.blank();

        let params: Vec<String> = unit
            .scope
            .params
            .iter()
            .map(|(param, ty)| format!("mut {}: {}", param, type_name(*ty, LANG)))
            .collect();
        let output = match unit.scope.return_type {
            Some(ty) => format!("Result<Option<{}>, FlowError>", type_name(ty, LANG)),
            None => "Result<(), FlowError>".to_string(),
        };
        let tail = if unit.scope.return_type.is_some() {
            "Ok(None)"
        } else {
            "Ok(())"
        };
        let keyword = if is_async { "pub async fn" } else { "pub fn" };

        w.line("#[allow(unused_mut, unused_variables, unused_assignments, unreachable_code, non_snake_case)]");
        let mut emitter = Emitter {
            unit,
            frames: vec![(Frame::Function, is_async)],
        };
        w.block(
            format!("{} {}({}) -> {} {{", keyword, name, params.join(", "), output),
            Some("}"),
            |w| {
                let locals: Vec<(String, Type)> = emitter
                    .unit
                    .scope
                    .locals
                    .iter()
                    .map(|(n, t)| (n.clone(), *t))
                    .collect();
                declare_locals(w, &locals);
                emitter.steps(w, &flow.steps)?;
                w.line(tail);
                Ok::<_, FlowError>(())
            },
        )?;
        Ok(w.finish())
    }
}

fn declare_locals(w: &mut CodeWriter, locals: &[(String, Type)]) {
    for (local, ty) in locals {
        if local == ERROR_BINDING {
            w.line(format!("let mut {} = CaughtError::default();", local));
        } else {
            w.line(format!(
                "let mut {}: {} = {};",
                local,
                type_name(*ty, LANG),
                zero_value(*ty, LANG).unwrap_or("Default::default()")
            ));
        }
    }
}

fn integer_element(ty: Type, holder: &str) -> Result<(), FlowError> {
    if ty == Type::Integer {
        return Ok(());
    }
    Err(FlowError::compile(
        LANG,
        format!("'{}' holds integers and cannot store a {} value", holder, ty),
    ))
}

/// Where a `return` step lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Function,
    /// One element of a `map`; returns its result directly.
    Task,
    /// A `try` body; returns `Ok(Some(value))` to the match after it.
    Try,
}

struct Emitter<'u, 'f> {
    unit: &'u mut Unit<'f>,
    /// Each frame with whether `.await` is allowed in it.
    frames: Vec<(Frame, bool)>,
}

impl Emitter<'_, '_> {
    fn frame(&self) -> Frame {
        self.frames.last().map(|(frame, _)| *frame).unwrap_or(Frame::Function)
    }

    fn in_async(&self) -> bool {
        self.frames.last().is_some_and(|(_, is_async)| *is_async)
    }

    /// The `T` of `Option<T>` a `try` body produces when it returns.
    fn try_result_type(&self) -> String {
        for (frame, _) in self.frames.iter().rev() {
            match frame {
                Frame::Try => continue,
                Frame::Task => return "i32".to_string(),
                Frame::Function => break,
            }
        }
        self.unit
            .scope
            .return_type
            .map(|ty| type_name(ty, LANG).to_string())
            .unwrap_or_else(|| "()".to_string())
    }

    fn steps(&mut self, w: &mut CodeWriter, steps: &[Step]) -> Result<(), FlowError> {
        steps.iter().try_for_each(|step| self.step(w, step))
    }

    /// Renders `expr` converted to `target` where Rust needs an explicit cast.
    fn value(&mut self, expr: &Expr, target: Option<Type>) -> Result<String, FlowError> {
        let (code, ty) = self.unit.exprs.render(expr, LANG)?;
        Ok(match (target, ty) {
            (Some(Type::Number), Type::Integer) => format!("({} as f64)", code),
            _ => code,
        })
    }

    /// Renders a value stored into a collection, which holds `i32` only.
    fn element(&mut self, expr: &Expr, holder: &str) -> Result<String, FlowError> {
        let (code, ty) = self.unit.exprs.render(expr, LANG)?;
        integer_element(ty, holder)?;
        Ok(code)
    }

    fn assign(&mut self, w: &mut CodeWriter, name: &str, expr: &Expr) -> Result<(), FlowError> {
        if appends(self.unit.flow, name) {
            let value = self.element(expr, name)?;
            w.line(format!("{}.push({});", name, value));
        } else {
            let target = self.unit.exprs.lookup(name);
            let value = self.value(expr, target)?;
            w.line(format!("{} = {};", name, value));
        }
        Ok(())
    }

    fn step(&mut self, w: &mut CodeWriter, step: &Step) -> Result<(), FlowError> {
        match step {
            Step::Let(bindings) => {
                for (name, expr) in bindings {
                    self.assign(w, name, expr)?;
                }
            }
            Step::Set { target, value } => {
                if target.is_simple() {
                    self.assign(w, target.root(), value)?;
                } else {
                    self.set_nested(w, target, value)?;
                }
            }
            Step::If {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.condition(condition)?;
                let close = if otherwise.is_empty() { Some("}") } else { None };
                w.block(format!("if {} {{", condition), close, |w| self.steps(w, then))?;
                if !otherwise.is_empty() {
                    w.block("} else {", Some("}"), |w| self.steps(w, otherwise))?;
                }
            }
            Step::ForEach {
                source,
                alias,
                body,
            } => {
                let source = self.array_source(source, "forEach")?;
                w.block(
                    format!("for mut {} in {} {{", alias, source),
                    Some("}"),
                    |w| self.steps(w, body),
                )?;
            }
            Step::Map {
                source,
                alias,
                body,
                target,
            } => self.map(w, step, source, alias, body, target)?,
            Step::Try { body, catch } => match catch {
                None => self.steps(w, body)?,
                Some(catch) => self.try_catch(w, body, catch)?,
            },
            Step::Assert { condition, message } => {
                let condition = self.unit.exprs.render_bool(condition, LANG, "assert")?;
                w.block(format!("if !{} {{", condition), Some("}"), |w| {
                    w.line(format!(
                        "return Err(FlowError::AssertionFailed(String::from({})));",
                        string_literal(message, LANG)
                    ));
                    Ok::<_, FlowError>(())
                })?;
            }
            Step::Log { level, message } => self.log(w, *level, message)?,
            Step::Call(call) => {
                let code = self.unit.exprs.render_call(&call.call, LANG)?;
                match &call.target {
                    Some(target) if appends(self.unit.flow, target) => {
                        integer_element(call.call.return_type.unwrap_or(Type::Integer), target)?;
                        w.line(format!("{}.push({});", target, code));
                    }
                    Some(target) => w.line(format!("{} = {};", target, code)),
                    None => w.line(format!("{};", code)),
                }
            }
            Step::Return(value) => match self.frame() {
                Frame::Task => {
                    let value = self.value(value, Some(Type::Integer))?;
                    w.line(format!("return Ok({});", value));
                }
                Frame::Function | Frame::Try => {
                    let return_type = self.unit.scope.return_type;
                    let value = self.value(value, return_type)?;
                    w.line(format!("return Ok(Some({}));", value));
                }
            },
        }
        Ok(())
    }

    /// Non-boolean conditions are converted with the interpreter's truthiness rules.
    fn condition(&mut self, condition: &Expr) -> Result<String, FlowError> {
        let (code, ty) = self.unit.exprs.render(condition, LANG)?;
        if ty == Type::Boolean {
            return Ok(code);
        }
        self.unit
            .warn(&format!("rust: 'if' condition is {}, using truthiness", ty));
        Ok(match ty {
            Type::Integer => format!("({} != 0)", code),
            Type::Number => format!("({} != 0.0)", code),
            _ => format!("!{}.is_empty()", code),
        })
    }

    fn array_source(&self, source: &Path, step: &str) -> Result<String, FlowError> {
        let (code, ty) = self.unit.exprs.render_path(source, LANG)?;
        if ty != Type::Array {
            return Err(FlowError::type_mismatch(
                format!("{} over {}", step, source),
                Type::Array.as_str(),
                ty,
            ));
        }
        Ok(code)
    }

    fn set_nested(&mut self, w: &mut CodeWriter, target: &Path, value: &Expr) -> Result<(), FlowError> {
        let root = target.root();
        let value = self.element(value, root)?;
        let root_ty = self
            .unit
            .exprs
            .lookup(root)
            .ok_or_else(|| FlowError::UnknownVariable(root.to_string()))?;
        match (root_ty, target.keys()) {
            (Type::Object, [key]) => w.line(format!(
                "{}.insert(String::from({}), {});",
                root,
                string_literal(&key.to_string(), LANG),
                value
            )),
            (Type::Array, [Segment::Index(index)]) => {
                w.line(format!("{}[{}] = {};", root, index, value));
            }
            (Type::Array, [_]) => {
                return Err(FlowError::compile(
                    LANG,
                    format!("'{}' cannot be indexed by a key", root),
                ));
            }
            (Type::Object | Type::Array, _) => {
                return Err(FlowError::compile(
                    LANG,
                    format!(
                        "path '{}' is nested deeper than one key, which rust collections cannot hold",
                        target
                    ),
                ));
            }
            (other, _) => {
                return Err(FlowError::type_mismatch(
                    format!("set {}", target),
                    "object or array",
                    other,
                ));
            }
        }
        Ok(())
    }

    fn log(&mut self, w: &mut CodeWriter, level: LogLevel, message: &[LogPart]) -> Result<(), FlowError> {
        let mut pieces = Vec::with_capacity(message.len());
        let mut args = Vec::new();
        for part in message {
            match part {
                LogPart::Text(value) => {
                    pieces.push(value.to_string().replace('{', "{{").replace('}', "}}"));
                }
                LogPart::Expr(expr) => {
                    let (code, ty) = self.unit.exprs.render(expr, LANG)?;
                    let caught = matches!(expr, Expr::Get(path) if path.root() == ERROR_BINDING && path.is_simple());
                    pieces.push(match ty {
                        Type::Array | Type::Object if !caught => "{:?}".to_string(),
                        _ => "{}".to_string(),
                    });
                    args.push(code);
                }
            }
        }
        let mut call = string_literal(&pieces.join(" "), LANG);
        for arg in args {
            call.push_str(", ");
            call.push_str(&arg);
        }
        w.line(format!("tracing::{}!({});", level.as_str(), call));
        Ok(())
    }

    fn map(
        &mut self,
        w: &mut CodeWriter,
        step: &Step,
        source: &Path,
        alias: &str,
        body: &[Step],
        target: &str,
    ) -> Result<(), FlowError> {
        let scope = self.unit.scope.map(step).cloned().unwrap_or_default();
        if scope.result_type != Type::Integer {
            return Err(FlowError::compile(
                LANG,
                format!(
                    "map into '{}' yields {} values, but rust arrays hold integers",
                    target, scope.result_type
                ),
            ));
        }
        let source = self.array_source(source, "map")?;
        let awaited = self.in_async() && is_async_map(body);
        let locals: Vec<(String, Type)> = scope
            .locals
            .iter()
            .map(|(n, t)| (n.clone(), *t))
            .collect();

        self.frames.push((Frame::Task, awaited));
        let result = if awaited {
            w.line(format!(
                "{} = futures::future::try_join_all({}.into_iter().map(|{}| {{",
                target, source, alias
            ));
            w.indent();
            for name in &scope.captured {
                w.line(format!("let {} = {}.clone();", name, name));
            }
            let result = w.block("async move {", Some("}"), |w| {
                w.line(format!("let mut {} = {};", alias, alias));
                for name in &scope.captured {
                    w.line(format!("let mut {} = {};", name, name));
                }
                declare_locals(w, &locals);
                self.steps(w, body)?;
                w.line(format!("Ok::<i32, FlowError>({})", alias));
                Ok::<_, FlowError>(())
            });
            w.dedent();
            w.line("}))");
            w.line(".await?;");
            result
        } else {
            let result = w.block(
                format!(
                    "{} = {}.into_par_iter().map(|{}| -> Result<i32, FlowError> {{",
                    target, source, alias
                ),
                None,
                |w| {
                    w.line(format!("let mut {} = {};", alias, alias));
                    for name in &scope.written {
                        w.line(format!("let mut {} = {}.clone();", name, name));
                    }
                    declare_locals(w, &locals);
                    self.steps(w, body)?;
                    w.line(format!("Ok({})", alias));
                    Ok::<_, FlowError>(())
                },
            );
            w.line("})");
            w.line(".collect::<Result<Vec<_>, FlowError>>()?;");
            result
        };
        self.frames.pop();
        result
    }

    /// A `try` body runs inside an immediately invoked closure (or an awaited
    /// async block) so `?` stops at the body. The match that follows binds
    /// `error` on failure and forwards any `return` to the enclosing frame.
    fn try_catch(&mut self, w: &mut CodeWriter, body: &[Step], catch: &[Step]) -> Result<(), FlowError> {
        let id = self.unit.next_id();
        let counter = format!("__step_{}", id);
        let result = format!("__result_{}", id);
        let result_type = self.try_result_type();
        let is_async = self.in_async();

        w.line(format!("let mut {}: i32 = 0;", counter));
        let open = if is_async {
            format!("let {} = async {{", result)
        } else {
            format!(
                "let {} = (|| -> Result<Option<{}>, FlowError> {{",
                result, result_type
            )
        };
        self.frames.push((Frame::Try, is_async));
        let outcome = w.block(open, None, |w| {
            for (index, inner) in body.iter().enumerate() {
                w.line(format!("{} = {};", counter, index));
                self.step(w, inner)?;
            }
            if is_async {
                w.line(format!("Ok::<Option<{}>, FlowError>(None)", result_type));
            } else {
                w.line("Ok(None)");
            }
            Ok::<_, FlowError>(())
        });
        self.frames.pop();
        outcome?;
        w.line(if is_async { "}.await;" } else { "})();" });

        let forward = match self.frame() {
            Frame::Task => Some("return Ok(__value)"),
            Frame::Try => Some("return Ok(Some(__value))"),
            Frame::Function if self.unit.scope.return_type.is_some() => {
                Some("return Ok(Some(__value))")
            }
            Frame::Function => None,
        };
        w.block(format!("match {} {{", result), Some("}"), |w| {
            match forward {
                Some(forward) => {
                    w.line(format!("Ok(Some(__value)) => {},", forward));
                    w.line("Ok(None) => {}");
                }
                None => w.line("Ok(_) => {}"),
            }
            w.block("Err(__error) => {", Some("}"), |w| {
                w.line(format!(
                    "{} = CaughtError::new(&__error, {});",
                    ERROR_BINDING, counter
                ));
                self.steps(w, catch)
            })
        })
    }
}
