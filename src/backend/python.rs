use super::{Backend, Lang, appends, contains_step, host_functions, is_async_map};
use crate::compiler::{CodeWriter, Unit, literal, segment, string_literal, zero_value};
use crate::diagnostics::LogLevel;
use crate::error::FlowError;
use crate::ir::{ERROR_BINDING, Expr, LogPart, Path, Step, Type, Value};
use heck::ToSnakeCase;
use itertools::Itertools;

const LANG: Lang = Lang::Python;

const HELPERS: &str = r#"class FlowError(Exception):
    def __init__(self, kind, message):
        super().__init__(message)
        self.kind = kind
        self.message = message


def _caught(exc, step_index):
    if isinstance(exc, FlowError):
        kind, message = exc.kind, exc.message
    elif isinstance(exc, ZeroDivisionError):
        kind, message = "ArithmeticError", "Arithmetic error: division by zero"
    elif isinstance(exc, (KeyError, IndexError, NameError)):
        kind, message = "UnknownVariable", f"Unknown variable {exc}"
    elif isinstance(exc, TypeError):
        kind, message = "TypeMismatch", str(exc)
    else:
        kind, message = "ExternalCallError", str(exc)
    return {"message": message, "stepIndex": step_index, "kind": kind}


def _div(a, b):
    if b == 0:
        raise FlowError("ArithmeticError", "Arithmetic error: division by zero")
    return a / b


def _mod(a, b):
    if b == 0:
        raise FlowError("ArithmeticError", "Arithmetic error: modulo by zero")
    r = abs(a) % abs(b)
    return r if a >= 0 else -r


def _bool(value, operation):
    if isinstance(value, bool):
        return value
    found = type(value).__name__
    raise FlowError(
        "TypeMismatch",
        f"Type mismatch during '{operation}': expected boolean, but found {found}",
    )


def _fmt(value, nested=False):
    if value is None:
        return "null"
    if isinstance(value, bool):
        return "true" if value else "false"
    if isinstance(value, float) and value.is_integer():
        return str(int(value))
    if isinstance(value, str):
        return json.dumps(value) if nested else value
    if isinstance(value, list):
        return "[" + ", ".join(_fmt(v, True) for v in value) + "]"
    if isinstance(value, dict):
        return "{" + ", ".join(json.dumps(k) + ": " + _fmt(v, True) for k, v in value.items()) + "}"
    return str(value)"#;

/// Emits a Python module with one (possibly `async`) function.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonBackend;

impl Backend for PythonBackend {
    fn lang(&self) -> Lang {
        LANG
    }

    fn generate(&self, unit: &mut Unit<'_>) -> Result<String, FlowError> {
        let flow = unit.flow;
        let name = flow.name.to_snake_case();
        let is_async = flow.has_async_call();
        let has_map = contains_step(&flow.steps, &|s| matches!(s, Step::Map { .. }));

        let mut w = CodeWriter::new("    ");
        w.line(format!("\"\"\"Generated from flow {}.\"\"\"", string_literal(&flow.name, LANG)));
        w.blank();
        if is_async {
            w.line("import asyncio");
        }
        if has_map {
            w.line("import copy");
        }
        w.line("import json");
        w.line("import logging");
        if has_map {
            w.line("from concurrent.futures import ThreadPoolExecutor");
        }
        w.blank();
        w.line(format!("_log = logging.getLogger(\"jsonflow.{}\")", name));
        let hosts = host_functions(flow);
        if !hosts.is_empty() {
            w.line(format!("# Host functions resolved from module globals: {}", hosts.keys().join(", ")));
        }
        w.blank();
        w.lines(HELPERS);
        w.blank();

        let mut params = Vec::new();
        let mut late_defaults = Vec::new();
        for (param, ty) in &unit.scope.params {
            let initial = flow.initial_context.get(param);
            match ty {
                Type::Array | Type::Object => {
                    params.push(format!("{}=None", param));
                    let value = match initial {
                        Some(value) => literal(value, LANG)?,
                        None => zero_value(*ty, LANG).unwrap_or("None").to_string(),
                    };
                    late_defaults.push((param.clone(), value));
                }
                _ => {
                    let value = match initial {
                        Some(value) => literal(value, LANG)?,
                        None => zero_value(*ty, LANG).unwrap_or("None").to_string(),
                    };
                    params.push(format!("{}={}", param, value));
                }
            }
        }

        let def = if is_async { "async def" } else { "def" };
        let mut emitter = Emitter { unit, is_async };
        w.block(format!("{} {}({}):", def, name, params.join(", ")), None, |w| {
            for (param, value) in &late_defaults {
                w.line(format!("if {} is None:", param));
                w.indent();
                w.line(format!("{} = {}", param, value));
                w.dedent();
            }
            let locals: Vec<(String, Type)> = emitter
                .unit
                .scope
                .locals
                .iter()
                .map(|(n, t)| (n.clone(), *t))
                .collect();
            for (local, ty) in locals {
                w.line(format!("{} = {}", local, zero_value(ty, LANG).unwrap_or("None")));
            }
            let mark = w.len();
            emitter.steps(w, &flow.steps)?;
            if w.len() == mark && late_defaults.is_empty() {
                w.line("pass");
            }
            Ok::<_, FlowError>(())
        })?;
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

    /// A nested body, with `pass` when it renders to nothing.
    fn body(&mut self, w: &mut CodeWriter, open: String, steps: &[Step]) -> Result<(), FlowError> {
        w.block(open, None, |w| {
            let mark = w.len();
            self.steps(w, steps)?;
            if w.len() == mark {
                w.line("pass");
            }
            Ok(())
        })
    }

    fn assign(&mut self, w: &mut CodeWriter, name: &str, value: String) {
        if appends(self.unit.flow, name) {
            w.line(format!("{}.append({})", name, value));
        } else {
            w.line(format!("{} = {}", name, value));
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
                    w.line(format!("{} = {}", nested_target(target), value));
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
                        .warn(&format!("python: 'if' condition is {}, using truthiness", ty));
                }
                self.body(w, format!("if {}:", code), then)?;
                if !otherwise.is_empty() {
                    self.body(w, "else:".to_string(), otherwise)?;
                }
            }
            Step::ForEach {
                source,
                alias,
                body,
            } => {
                let source = self.unit.exprs.render_path(source, LANG)?.0;
                let shadows = self.unit.scope.params.contains_key(alias)
                    || self.unit.scope.locals.contains_key(alias);
                let saved = format!("_saved_{}", self.unit.next_id());
                if shadows {
                    w.line(format!("{} = {}", saved, alias));
                }
                self.body(w, format!("for {} in list({}):", alias, source), body)?;
                if shadows {
                    w.line(format!("{} = {}", alias, saved));
                }
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
                    let counter = format!("_step_{}", id);
                    w.line(format!("{} = 0", counter));
                    w.block("try:", None, |w| {
                        if body.is_empty() {
                            w.line("pass");
                        }
                        for (index, inner) in body.iter().enumerate() {
                            w.line(format!("{} = {}", counter, index));
                            self.step(w, inner)?;
                        }
                        Ok::<_, FlowError>(())
                    })?;
                    w.block(format!("except Exception as _exc_{}:", id), None, |w| {
                        w.line(format!("{} = _caught(_exc_{}, {})", ERROR_BINDING, id, counter));
                        self.steps(w, catch)
                    })?;
                }
            },
            Step::Assert { condition, message } => {
                let condition = self.unit.exprs.render_bool(condition, LANG, "assert")?;
                w.block(format!("if not {}:", condition), None, |w| {
                    w.line(format!(
                        "raise FlowError(\"AssertionFailed\", {})",
                        string_literal(message, LANG)
                    ));
                    Ok::<_, FlowError>(())
                })?;
            }
            Step::Log { level, message } => {
                let parts = message
                    .iter()
                    .map(|part| match part {
                        LogPart::Expr(expr) => self.expr(expr).map(|code| format!("_fmt({})", code)),
                        LogPart::Text(value) => Ok(text(value)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                w.line(format!(
                    "_log.{}(\" \".join([{}]))",
                    log_method(*level),
                    parts.join(", ")
                ));
            }
            Step::Call(call) => {
                let code = self.unit.exprs.render_call(&call.call, LANG)?;
                match &call.target {
                    Some(target) => self.assign(w, target, code),
                    None => w.line(code),
                }
            }
            Step::Return(value) => {
                let value = self.expr(value)?;
                w.line(format!("return {}", value));
            }
        }
        Ok(())
    }

    /// Each element runs in a nested function over private copies of the outer
    /// variables it writes, so tasks never observe each other.
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
        let id = self.unit.next_id();
        let task = format!("_map_{}", id);
        let awaited = self.is_async && is_async_map(body);

        let mut params = vec![alias.to_string()];
        params.extend(scope.written.iter().cloned());
        let def = if awaited { "async def" } else { "def" };
        w.block(format!("{} {}({}):", def, task, params.join(", ")), None, |w| {
            for (local, ty) in &scope.locals {
                w.line(format!("{} = {}", local, zero_value(*ty, LANG).unwrap_or("None")));
            }
            self.steps(w, body)?;
            w.line(format!("return {}", alias));
            Ok::<_, FlowError>(())
        })?;

        let mut args = vec!["copy.deepcopy(_item)".to_string()];
        args.extend(scope.written.iter().map(|name| format!("copy.deepcopy({})", name)));
        let call = format!("{}({})", task, args.join(", "));
        if awaited {
            w.line(format!(
                "{} = list(await asyncio.gather(*({} for _item in list({}))))",
                target, call, source
            ));
        } else {
            w.block("with ThreadPoolExecutor() as _pool:", None, |w| {
                w.line(format!(
                    "{} = list(_pool.map(lambda _item: {}, list({})))",
                    target, call, source
                ));
                Ok::<_, FlowError>(())
            })?;
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
            code = format!("{}.setdefault({}, {{}})", code, segment(key, LANG));
        }
    }
    code
}

fn text(value: &Value) -> String {
    string_literal(&value.to_string(), LANG)
}

fn log_method(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warning",
        LogLevel::Error => "error",
    }
}
