use super::{Backend, Lang, appends, host_functions, is_async_map};
use crate::compiler::{CodeWriter, Unit, literal, segment, string_literal, zero_value};
use crate::diagnostics::LogLevel;
use crate::error::FlowError;
use crate::ir::{ERROR_BINDING, Expr, LogPart, Path, Step, Type};
use heck::ToLowerCamelCase;
use itertools::Itertools;

const LANG: Lang = Lang::Javascript;

const HELPERS: &str = r#"export class FlowError extends Error {
  constructor(kind, message) {
    super(message);
    this.kind = kind;
  }
}

function __div(a, b) {
  if (b === 0) throw new FlowError("ArithmeticError", "Arithmetic error: division by zero");
  return a / b;
}

function __mod(a, b) {
  if (b === 0) throw new FlowError("ArithmeticError", "Arithmetic error: modulo by zero");
  return a % b;
}

function __caught(e, stepIndex) {
  if (e instanceof FlowError) return { message: e.message, stepIndex, kind: e.kind };
  if (e instanceof ReferenceError) return { message: e.message, stepIndex, kind: "UnknownVariable" };
  if (e instanceof TypeError) return { message: e.message, stepIndex, kind: "TypeMismatch" };
  const message = e instanceof Error ? e.message : String(e);
  return { message, stepIndex, kind: "ExternalCallError" };
}

function __bool(value, operation) {
  if (typeof value === "boolean") return value;
  const found = value === null ? "null" : Array.isArray(value) ? "array" : typeof value;
  throw new FlowError("TypeMismatch", `Type mismatch during '${operation}': expected boolean, but found ${found}`);
}

function __fmt(value, nested = false) {
  if (value === null || value === undefined) return "null";
  if (typeof value === "string") return nested ? JSON.stringify(value) : value;
  if (Array.isArray(value)) return "[" + value.map((v) => __fmt(v, true)).join(", ") + "]";
  if (typeof value === "object") {
    return "{" + Object.entries(value).map(([k, v]) => JSON.stringify(k) + ": " + __fmt(v, true)).join(", ") + "}";
  }
  return String(value);
}"#;

/// Emits an ES module exporting one (possibly `async`) function.
///
/// Entry variables arrive as a single destructured object, so callers pass
/// `{ x: 5 }` and anything omitted takes its initial or zero value.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavascriptBackend;

impl Backend for JavascriptBackend {
    fn lang(&self) -> Lang {
        LANG
    }

    fn generate(&self, unit: &mut Unit<'_>) -> Result<String, FlowError> {
        let flow = unit.flow;
        let name = flow.name.to_lower_camel_case();
        let is_async = flow.has_async_call();

        let mut w = CodeWriter::new("  ");
        w.line(format!("// Generated from flow {}.", string_literal(&flow.name, LANG)));
        let hosts = host_functions(flow);
        if !hosts.is_empty() {
            w.line(format!("// Host functions expected in scope: {}", hosts.keys().join(", ")));
        }
        w.blank();
        w.lines(HELPERS);
        w.blank();

        let mut params = Vec::new();
        for (param, ty) in &unit.scope.params {
            let value = match flow.initial_context.get(param) {
                Some(value) => literal(value, LANG)?,
                None => zero_value(*ty, LANG).unwrap_or("null").to_string(),
            };
            params.push(format!("{} = {}", param, value));
        }
        let signature = if params.is_empty() {
            String::new()
        } else {
            format!("{{ {} }} = {{}}", params.join(", "))
        };
        let keyword = if is_async {
            "export async function"
        } else {
            "export function"
        };

        let mut emitter = Emitter { unit, is_async };
        w.block(
            format!("{} {}({}) {{", keyword, name, signature),
            Some("}"),
            |w| {
                let locals: Vec<(String, Type)> = emitter
                    .unit
                    .scope
                    .locals
                    .iter()
                    .map(|(n, t)| (n.clone(), *t))
                    .collect();
                for (local, ty) in locals {
                    w.line(format!(
                        "let {} = {};",
                        local,
                        zero_value(ty, LANG).unwrap_or("null")
                    ));
                }
                emitter.steps(w, &flow.steps)
            },
        )?;
        Ok(w.finish())
    }
}

struct Emitter<'u, 'f> {
    unit: &'u mut Unit<'f>,
    is_async: bool,
}

impl Emitter<'_, '_> {
    fn expr(&mut self, expr: &Expr) -> Result<String, FlowError> {
        self.unit.exprs.render_code(expr, LANG)
    }

    fn steps(&mut self, w: &mut CodeWriter, steps: &[Step]) -> Result<(), FlowError> {
        steps.iter().try_for_each(|step| self.step(w, step))
    }

    fn assign(&mut self, w: &mut CodeWriter, name: &str, value: String) {
        if appends(self.unit.flow, name) {
            w.line(format!("{}.push({});", name, value));
        } else {
            w.line(format!("{} = {};", name, value));
        }
    }

    fn step(&mut self, w: &mut CodeWriter, step: &Step) -> Result<(), FlowError> {
        match step {
            Step::Let(bindings) => {
                for (name, expr) in bindings {
                    let value = self.expr(expr)?;
                    self.assign(w, name, value);
                }
            }
            Step::Set { target, value } => {
                let value = self.expr(value)?;
                if target.is_simple() {
                    self.assign(w, target.root(), value);
                } else {
                    w.line(format!("{} = {};", nested_target(target), value));
                }
            }
            Step::If {
                condition,
                then,
                otherwise,
            } => {
                let (code, ty) = self.unit.exprs.render(condition, LANG)?;
                if ty != Type::Boolean {
                    self.unit
                        .warn(&format!("javascript: 'if' condition is {}, using truthiness", ty));
                }
                let close = if otherwise.is_empty() { Some("}") } else { None };
                w.block(format!("if ({}) {{", code), close, |w| self.steps(w, then))?;
                if !otherwise.is_empty() {
                    w.block("} else {", Some("}"), |w| self.steps(w, otherwise))?;
                }
            }
            Step::ForEach {
                source,
                alias,
                body,
            } => {
                let source = self.unit.exprs.render_path(source, LANG)?.0;
                w.block(
                    format!("for (let {} of [...{}]) {{", alias, source),
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
                Some(catch) => {
                    let id = self.unit.next_id();
                    let counter = format!("__step_{}", id);
                    w.line(format!("let {} = 0;", counter));
                    w.block("try {", None, |w| {
                        for (index, inner) in body.iter().enumerate() {
                            w.line(format!("{} = {};", counter, index));
                            self.step(w, inner)?;
                        }
                        Ok::<_, FlowError>(())
                    })?;
                    w.block(format!("}} catch (__e{}) {{", id), Some("}"), |w| {
                        w.line(format!(
                            "{} = __caught(__e{}, {});",
                            ERROR_BINDING, id, counter
                        ));
                        self.steps(w, catch)
                    })?;
                }
            },
            Step::Assert { condition, message } => {
                let condition = self.unit.exprs.render_bool(condition, LANG, "assert")?;
                w.line(format!(
                    "if (!{}) throw new FlowError(\"AssertionFailed\", {});",
                    condition,
                    string_literal(message, LANG)
                ));
            }
            Step::Log { level, message } => {
                let parts = message
                    .iter()
                    .map(|part| match part {
                        LogPart::Expr(expr) => {
                            self.expr(expr).map(|code| format!("__fmt({})", code))
                        }
                        LogPart::Text(value) => Ok(string_literal(&value.to_string(), LANG)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                w.line(format!(
                    "console.{}([{}].join(\" \"));",
                    console_method(*level),
                    parts.join(", ")
                ));
            }
            Step::Call(call) => {
                let code = self.unit.exprs.render_call(&call.call, LANG)?;
                match &call.target {
                    Some(target) => self.assign(w, target, code),
                    None => w.line(format!("{};", code)),
                }
            }
            Step::Return(value) => {
                let value = self.expr(value)?;
                w.line(format!("return {};", value));
            }
        }
        Ok(())
    }

    /// Each element runs in a nested function that receives cloned copies of the
    /// outer variables it writes.
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
        let source = self.unit.exprs.render_path(source, LANG)?.0;
        let task = format!("__map_{}", self.unit.next_id());
        let awaited = self.is_async && is_async_map(body);

        let mut params = vec![alias.to_string()];
        params.extend(scope.written.iter().cloned());
        let keyword = if awaited { "async function" } else { "function" };
        w.block(
            format!("{} {}({}) {{", keyword, task, params.join(", ")),
            Some("}"),
            |w| {
                for (local, ty) in &scope.locals {
                    w.line(format!(
                        "let {} = {};",
                        local,
                        zero_value(*ty, LANG).unwrap_or("null")
                    ));
                }
                self.steps(w, body)?;
                w.line(format!("return {};", alias));
                Ok::<_, FlowError>(())
            },
        )?;

        let mut args = vec!["structuredClone(__item)".to_string()];
        args.extend(
            scope
                .written
                .iter()
                .map(|name| format!("structuredClone({})", name)),
        );
        let call = format!("{}({})", task, args.join(", "));
        if awaited {
            w.line(format!(
                "{} = await Promise.all([...{}].map((__item) => {}));",
                target, source, call
            ));
        } else {
            w.line(format!(
                "{} = [...{}].map((__item) => {});",
                target, source, call
            ));
        }
        Ok(())
    }
}

fn nested_target(path: &Path) -> String {
    let keys = path.keys();
    let mut code = path.root().to_string();
    for (depth, key) in keys.iter().enumerate() {
        if depth + 1 == keys.len() {
            code.push_str(&format!("[{}]", segment(key, LANG)));
        } else {
            code = format!("({}[{}] ??= {{}})", code, segment(key, LANG));
        }
    }
    code
}

fn console_method(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}
