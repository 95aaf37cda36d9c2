use super::{Backend, Lang, appends, contains_step, host_functions};
use crate::compiler::{CodeWriter, Unit, ident, literal, segment, string_literal, type_name};
use crate::error::FlowError;
use crate::ir::{ArithOp, ERROR_BINDING, Expr, LogPart, Path, STEP_TAGS, Step, Type, Value};
use heck::{ToLowerCamelCase, ToUpperCamelCase};

const LANG: Lang = Lang::Solidity;

const TO_STRING: &str = r#"function _toString(uint256 value) internal pure returns (string memory) {
    if (value == 0) {
        return "0";
    }
    uint256 digits;
    for (uint256 v = value; v != 0; v /= 10) {
        digits++;
    }
    bytes memory buffer = new bytes(digits);
    while (value != 0) {
        digits -= 1;
        buffer[digits] = bytes1(uint8(48 + (value % 10)));
        value /= 10;
    }
    return string(buffer);
}"#;

const CONTAINS: &str = r#"function _contains(uint256[] memory items, uint256 item) internal pure returns (bool) {
    for (uint256 i = 0; i < items.length; i++) {
        if (items[i] == item) {
            return true;
        }
    }
    return false;
}"#;

/// Emits a Solidity contract with one public function.
///
/// Object and Array entry variables live in contract storage; scalars are
/// function parameters. Host calls become `internal virtual` declarations, which
/// makes the contract `abstract`. Failures revert, except inside a `try` body,
/// where failing assertions and zero divisors are recorded in a `FlowFailure`
/// and skip the rest of the body. Host calls cannot appear in a `try` body.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolidityBackend;

impl Backend for SolidityBackend {
    fn lang(&self) -> Lang {
        LANG
    }

    fn default_allowed_ops(&self) -> Vec<&'static str> {
        STEP_TAGS
            .into_iter()
            .filter(|tag| !matches!(*tag, "map" | "try"))
            .collect()
    }

    fn generate(&self, unit: &mut Unit<'_>) -> Result<String, FlowError> {
        let flow = unit.flow;
        let contract = flow.name.to_upper_camel_case();
        let function = flow.name.to_lower_camel_case();
        let hosts = host_functions(flow);
        let catches = contains_step(&flow.steps, &|step| {
            matches!(step, Step::Try { catch: Some(_), .. })
        });

        let mut state = Vec::new();
        let mut params = Vec::new();
        for (name, ty) in &unit.scope.params {
            match ty {
                Type::Object | Type::Array => state.push((name.clone(), *ty)),
                _ => params.push(format!("{} {}", declared_type(*ty, true)?, name)),
            }
        }
        let returns = match unit.scope.return_type {
            Some(ty) => format!(" returns ({})", declared_type(ty, true)?),
            None => String::new(),
        };

        let mut w = CodeWriter::new("    ");
        w.line("// SPDX-License-Identifier: MIT");
        w.line("pragma solidity ^0.8.0;");
        w.blank();
        w.line(format!("// Generated from flow {}.", string_literal(&flow.name, LANG)));
        let keyword = if hosts.is_empty() {
            "contract"
        } else {
            "abstract contract"
        };
        w.line(format!("{} {} {{", keyword, contract));
        w.indent();
        w.line("event Log(string level, string message);");
        if catches {
            w.blank();
            w.block("struct FlowFailure {", Some("}"), |w| {
                w.line("string message;");
                w.line("uint256 stepIndex;");
                w.line("string kind;");
                Ok::<_, FlowError>(())
            })?;
        }

        if !state.is_empty() {
            w.blank();
            for (name, ty) in &state {
                let decl = match ty {
                    Type::Object => "mapping(string => uint256)",
                    _ => "uint256[]",
                };
                w.line(format!("{} public {};", decl, name));
            }
            let mut init = Vec::new();
            for (name, _) in &state {
                match flow.initial_context.get(name) {
                    Some(Value::Object(entries)) => {
                        for (key, value) in entries {
                            init.push(format!(
                                "{}[{}] = {};",
                                name,
                                string_literal(key, LANG),
                                literal(value, LANG)?
                            ));
                        }
                    }
                    Some(Value::Array(items)) => {
                        for item in items {
                            init.push(format!("{}.push({});", name, literal(item, LANG)?));
                        }
                    }
                    _ => {}
                }
            }
            if !init.is_empty() {
                w.blank();
                w.block("constructor() {", Some("}"), |w| {
                    init.iter().for_each(|line| w.line(line));
                    Ok::<_, FlowError>(())
                })?;
            }
        }

        if !hosts.is_empty() {
            w.blank();
            for (name, call) in &hosts {
                let args = call
                    .args
                    .iter()
                    .map(|(arg, expr)| {
                        let ty = unit.exprs.infer(expr)?;
                        Ok(format!("{} {}", declared_type(ty, true)?, arg))
                    })
                    .collect::<Result<Vec<_>, FlowError>>()?;
                let ret = declared_type(call.return_type.unwrap_or(Type::Integer), true)?;
                w.line(format!(
                    "function {}({}) internal virtual returns ({});",
                    name,
                    args.join(", "),
                    ret
                ));
            }
        }

        // The body goes to its own writer first so the helpers it needs are known.
        let mut body = CodeWriter::new("    ");
        body.indent();
        let mut emitter = Emitter {
            unit,
            guards: Vec::new(),
            tasks: Vec::new(),
        };
        body.block(
            format!("function {}({}) public{} {{", function, params.join(", "), returns),
            Some("}"),
            |w| {
                let locals: Vec<(String, Type)> = emitter
                    .unit
                    .scope
                    .locals
                    .iter()
                    .map(|(n, t)| (n.clone(), *t))
                    .collect();
                declare_locals(w, &locals)?;
                emitter.steps(w, &flow.steps)
            },
        )?;
        let body = body.finish();

        w.blank();
        w.dedent();
        w.lines(body.trim_end());
        w.indent();
        for (marker, helper) in [("_toString(", TO_STRING), ("_contains(", CONTAINS)] {
            if body.contains(marker) {
                w.blank();
                w.lines(helper);
            }
        }
        w.dedent();
        w.line("}");
        Ok(w.finish())
    }
}

/// How a value of `ty` is declared in a parameter, return or local slot.
fn declared_type(ty: Type, memory: bool) -> Result<String, FlowError> {
    match ty {
        Type::Object => Err(FlowError::compile(
            LANG,
            "objects can only live in contract storage",
        )),
        Type::String | Type::Array if memory => Ok(format!("{} memory", type_name(ty, LANG))),
        _ => Ok(type_name(ty, LANG).to_string()),
    }
}

fn declare_locals(w: &mut CodeWriter, locals: &[(String, Type)]) -> Result<(), FlowError> {
    for (local, ty) in locals {
        if local == ERROR_BINDING {
            w.line(format!("FlowFailure memory {};", ident(local, LANG)));
        } else {
            w.line(format!("{} {};", declared_type(*ty, true)?, local));
        }
    }
    Ok(())
}

/// An active `try` body: its id and the index of the body step being rendered.
#[derive(Debug, Clone, Copy)]
struct Guard {
    id: usize,
    step: usize,
}

/// An active `map` loop.
#[derive(Debug, Clone)]
struct Task {
    out: String,
    index: String,
    /// `forEach` loops opened inside the task body.
    loops: usize,
}

struct Emitter<'u, 'f> {
    unit: &'u mut Unit<'f>,
    guards: Vec<Guard>,
    tasks: Vec<Task>,
}

impl Emitter<'_, '_> {
    fn expr(&mut self, expr: &Expr) -> Result<String, FlowError> {
        self.unit.exprs.render_code(expr, LANG)
    }

    /// Inside a `try` body every step is skipped once a failure has been recorded.
    fn steps(&mut self, w: &mut CodeWriter, steps: &[Step]) -> Result<(), FlowError> {
        for step in steps {
            match self.guards.last().copied() {
                Some(guard) => self.guarded_step(w, guard, step)?,
                None => self.step(w, step)?,
            }
        }
        Ok(())
    }

    /// One step of a `try` body. Zero divisors are recorded as failures before
    /// the step runs, since a revert could not be caught.
    fn guarded_step(&mut self, w: &mut CodeWriter, guard: Guard, step: &Step) -> Result<(), FlowError> {
        let mut calls = Vec::new();
        for expr in step.expressions() {
            expr.collect_calls(&mut calls);
        }
        if matches!(step, Step::Call(_)) || !calls.is_empty() {
            return Err(FlowError::compile(
                LANG,
                "host calls inside a try body cannot be caught",
            ));
        }
        let open = format!("if (!__failed_{}) {{", guard.id);
        match step {
            // Later bindings may divide by earlier ones.
            Step::Let(bindings) if bindings.len() > 1 => {
                for (name, expr) in bindings {
                    self.check_divisors(w, guard, expr)?;
                    w.block(open.clone(), Some("}"), |w| self.bind(w, name, expr))?;
                }
                Ok(())
            }
            _ => {
                for expr in step.expressions() {
                    self.check_divisors(w, guard, expr)?;
                }
                w.block(open, Some("}"), |w| self.step(w, step))
            }
        }
    }

    fn check_divisors(&mut self, w: &mut CodeWriter, guard: Guard, expr: &Expr) -> Result<(), FlowError> {
        let mut found = Vec::new();
        divisors(expr, &mut found);
        for (op, divisor) in found {
            let code = self.expr(divisor)?;
            let what = if op == ArithOp::Div { "division" } else { "modulo" };
            w.block(
                format!("if (!__failed_{} && {} == 0) {{", guard.id, code),
                Some("}"),
                |w| {
                    w.line(format!("__failed_{} = true;", guard.id));
                    w.line(format!(
                        "__failure_{} = FlowFailure(\"Arithmetic error: {} by zero\", {}, \"ArithmeticError\");",
                        guard.id, what, guard.step
                    ));
                    Ok::<_, FlowError>(())
                },
            )?;
        }
        Ok(())
    }

    /// Storage collections hold `uint256`, so only numbers can be stored in them.
    fn assign(&mut self, w: &mut CodeWriter, name: &str, value: String, ty: Type) -> Result<(), FlowError> {
        if appends(self.unit.flow, name) {
            numeric_element(ty, name)?;
            w.line(format!("{}.push({});", name, value));
        } else {
            w.line(format!("{} = {};", ident(name, LANG), value));
        }
        Ok(())
    }

    fn bind(&mut self, w: &mut CodeWriter, name: &str, expr: &Expr) -> Result<(), FlowError> {
        let (value, ty) = self.unit.exprs.render(expr, LANG)?;
        self.assign(w, name, value, ty)
    }

    fn step(&mut self, w: &mut CodeWriter, step: &Step) -> Result<(), FlowError> {
        match step {
            Step::Let(bindings) => {
                for (name, expr) in bindings {
                    self.bind(w, name, expr)?;
                }
            }
            Step::Set { target, value } => {
                let (value, ty) = self.unit.exprs.render(value, LANG)?;
                match target.keys() {
                    [] => self.assign(w, target.root(), value, ty)?,
                    [key] => {
                        numeric_element(ty, target.root())?;
                        w.line(format!(
                            "{}[{}] = {};",
                            ident(target.root(), LANG),
                            segment(key, LANG),
                            value
                        ));
                    }
                    _ => {
                        return Err(FlowError::compile(
                            LANG,
                            format!("path '{}' is nested deeper than one key", target),
                        ));
                    }
                }
            }
            Step::If {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.condition(condition)?;
                let close = if otherwise.is_empty() { Some("}") } else { None };
                w.block(format!("if ({}) {{", condition), close, |w| self.steps(w, then))?;
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
                let index = format!("__i_{}", self.unit.next_id());
                if let Some(task) = self.tasks.last_mut() {
                    task.loops += 1;
                }
                let result = w.block(
                    format!(
                        "for (uint256 {i} = 0; {i} < {s}.length; {i}++) {{",
                        i = index,
                        s = source
                    ),
                    Some("}"),
                    |w| {
                        w.line(format!("uint256 {} = {}[{}];", alias, source, index));
                        self.steps(w, body)
                    },
                );
                if let Some(task) = self.tasks.last_mut() {
                    task.loops -= 1;
                }
                result?;
            }
            Step::Map {
                source,
                alias,
                body,
                target,
            } => self.map(w, step, source, alias, body, target)?,
            Step::Try { body, catch } => match catch {
                None => self.steps(w, body)?,
                Some(catch) => self.guarded(w, body, catch)?,
            },
            Step::Assert { condition, message } => {
                let condition = self.unit.exprs.render_bool(condition, LANG, "assert")?;
                let message = string_literal(message, LANG);
                match self.guards.last().copied() {
                    None => w.line(format!("require({}, {});", condition, message)),
                    Some(guard) => {
                        w.block(format!("if (!{}) {{", condition), Some("}"), |w| {
                            w.line(format!("__failed_{} = true;", guard.id));
                            w.line(format!(
                                "__failure_{} = FlowFailure({}, {}, \"AssertionFailed\");",
                                guard.id, message, guard.step
                            ));
                            Ok::<_, FlowError>(())
                        })?;
                    }
                }
            }
            Step::Log { level, message } => {
                let parts = message
                    .iter()
                    .map(|part| match part {
                        LogPart::Text(value) => Ok(string_literal(&value.to_string(), LANG)),
                        LogPart::Expr(expr) => self.printable(expr),
                    })
                    .collect::<Result<Vec<_>, _>>()?
                    .join(", \" \", ");
                w.line(format!(
                    "emit Log(\"{}\", string(abi.encodePacked({})));",
                    level.as_str(),
                    parts
                ));
            }
            Step::Call(call) => {
                let code = self.unit.exprs.render_call(&call.call, LANG)?;
                match &call.target {
                    Some(target) => {
                        let ty = call.call.return_type.unwrap_or(Type::Integer);
                        self.assign(w, target, code, ty)?;
                    }
                    None => w.line(format!("{};", code)),
                }
            }
            Step::Return(value) => {
                let value = self.expr(value)?;
                match self.tasks.last() {
                    Some(task) if task.loops > 0 => {
                        return Err(FlowError::compile(
                            LANG,
                            "'return' inside a loop nested in a map body is not supported",
                        ));
                    }
                    Some(task) => {
                        w.line(format!("{}[{}] = {};", task.out, task.index, value));
                        w.line("continue;");
                    }
                    None => w.line(format!("return {};", value)),
                }
            }
        }
        Ok(())
    }

    fn condition(&mut self, condition: &Expr) -> Result<String, FlowError> {
        let (code, ty) = self.unit.exprs.render(condition, LANG)?;
        if ty == Type::Boolean {
            return Ok(code);
        }
        self.unit
            .warn(&format!("solidity: 'if' condition is {}, using truthiness", ty));
        Ok(match ty {
            Type::String => format!("bytes({}).length != 0", code),
            Type::Array => format!("{}.length != 0", code),
            Type::Address => format!("{} != address(0)", code),
            _ => format!("{} != 0", code),
        })
    }

    /// An expression converted to a `string` for `abi.encodePacked`.
    fn printable(&mut self, expr: &Expr) -> Result<String, FlowError> {
        let (code, ty) = self.unit.exprs.render(expr, LANG)?;
        match ty {
            Type::String => Ok(code),
            Type::Integer | Type::Number => Ok(format!("_toString({})", code)),
            Type::Boolean => Ok(format!("({} ? \"true\" : \"false\")", code)),
            Type::Address => Ok(format!("_toString(uint256(uint160({})))", code)),
            Type::Array | Type::Object => Err(FlowError::compile(
                LANG,
                format!("cannot log a value of type {}", ty),
            )),
        }
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

    /// Runs elements one after another into a fresh memory array. A failing
    /// element reverts the whole call, so the target is never partially written.
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
        if let Some(name) = scope.written.first() {
            return Err(FlowError::compile(
                LANG,
                format!("map body writes outer variable '{}'", name),
            ));
        }
        let source = self.array_source(source, "map")?;
        let id = self.unit.next_id();
        let task = Task {
            out: format!("__out_{}", id),
            index: format!("__i_{}", id),
            loops: 0,
        };
        let locals: Vec<(String, Type)> = scope
            .locals
            .iter()
            .map(|(n, t)| (n.clone(), *t))
            .collect();

        w.line(format!(
            "uint256[] memory {} = new uint256[]({}.length);",
            task.out, source
        ));
        let open = format!(
            "for (uint256 {i} = 0; {i} < {s}.length; {i}++) {{",
            i = task.index,
            s = source
        );
        let (out, index) = (task.out.clone(), task.index.clone());
        self.tasks.push(task);
        let result = w.block(open, Some("}"), |w| {
            w.line(format!("uint256 {} = {}[{}];", alias, source, index));
            declare_locals(w, &locals)?;
            self.steps(w, body)?;
            w.line(format!("{}[{}] = {};", out, index, alias));
            Ok::<_, FlowError>(())
        });
        self.tasks.pop();
        result?;
        w.line(format!("{} = {};", ident(target, LANG), out));
        Ok(())
    }

    fn guarded(&mut self, w: &mut CodeWriter, body: &[Step], catch: &[Step]) -> Result<(), FlowError> {
        let id = self.unit.next_id();
        w.line(format!("bool __failed_{} = false;", id));
        w.line(format!("FlowFailure memory __failure_{};", id));
        for (index, step) in body.iter().enumerate() {
            let guard = Guard { id, step: index };
            self.guards.push(guard);
            let result = self.guarded_step(w, guard, step);
            self.guards.pop();
            result?;
        }
        w.block(format!("if (__failed_{}) {{", id), Some("}"), |w| {
            w.line(format!("{} = __failure_{};", ident(ERROR_BINDING, LANG), id));
            self.steps(w, catch)
        })
    }
}

fn numeric_element(ty: Type, holder: &str) -> Result<(), FlowError> {
    if ty.is_numeric() {
        return Ok(());
    }
    Err(FlowError::compile(
        LANG,
        format!("'{}' holds uint256 values and cannot store a {} value", holder, ty),
    ))
}

/// Every `div` and `mod` divisor in `expr`, innermost first.
fn divisors<'a>(expr: &'a Expr, found: &mut Vec<(ArithOp, &'a Expr)>) {
    match expr {
        Expr::Get(_) | Expr::Literal(_) => {}
        Expr::Arith { op, operands } => {
            operands.iter().for_each(|operand| divisors(operand, found));
            if matches!(op, ArithOp::Div | ArithOp::Mod) {
                for divisor in operands.iter().skip(1) {
                    if !matches!(divisor, Expr::Literal(value) if value.as_f64().is_some_and(|n| n != 0.0)) {
                        found.push((*op, divisor));
                    }
                }
            }
        }
        Expr::Logical { operands, .. } => operands.iter().for_each(|operand| divisors(operand, found)),
        Expr::Compare { left, right, .. } => {
            divisors(left, found);
            divisors(right, found);
        }
        Expr::In { item, array } => {
            divisors(item, found);
            divisors(array, found);
        }
        Expr::Not(inner) | Expr::Abs(inner) | Expr::Length(inner) => divisors(inner, found),
        Expr::Call(spec) => spec.args.values().for_each(|arg| divisors(arg, found)),
    }
}
