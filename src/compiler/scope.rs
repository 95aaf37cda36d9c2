use super::ExprCompiler;
use crate::error::FlowError;
use crate::ir::{ERROR_BINDING, Expr, Flow, LogPart, Step, Type};
use ahash::AHashMap;
use indexmap::{IndexMap, IndexSet};

/// Variables a `map` body owns or borrows from the code around it.
#[derive(Debug, Clone)]
pub struct MapScope {
    /// Names first assigned inside the body. Private to each task.
    pub locals: IndexMap<String, Type>,
    /// Outer variables the body reads or writes.
    pub captured: IndexSet<String>,
    /// Outer variables the body writes. Each task works on its own copy.
    pub written: IndexSet<String>,
    /// Type of a task's result: its `return` value, else the alias.
    pub result_type: Type,
}

impl Default for MapScope {
    fn default() -> Self {
        Self {
            locals: IndexMap::new(),
            captured: IndexSet::new(),
            written: IndexSet::new(),
            result_type: Type::Integer,
        }
    }
}

/// Declarations for one generated function, gathered before any code is written.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Entry variables, passed in by the caller.
    pub params: IndexMap<String, Type>,
    /// Names first assigned outside any `map` body, declared at function entry.
    pub locals: IndexMap<String, Type>,
    /// Keyed by the address of the `map` step.
    maps: AHashMap<usize, MapScope>,
    /// Type of the value the function returns, if any step returns.
    pub return_type: Option<Type>,
}

impl Scope {
    pub fn map(&self, step: &Step) -> Option<&MapScope> {
        self.maps.get(&step_key(step))
    }

    /// Walks the whole flow, declaring every variable it finds with `exprs`.
    pub fn discover(flow: &Flow, exprs: &mut ExprCompiler) -> Result<Scope, FlowError> {
        let params: IndexMap<String, Type> = flow
            .entry_variables()
            .into_iter()
            .map(|(name, ty)| (name.to_string(), ty))
            .collect();
        for (name, ty) in &params {
            exprs.declare(name, *ty);
        }

        let mut walker = Walker {
            exprs,
            frames: vec![Frame::function(&params)],
            maps: AHashMap::new(),
            return_type: None,
            out_of_scope: IndexSet::new(),
        };
        walker.steps(&flow.steps)?;

        let Walker {
            frames,
            maps,
            return_type,
            ..
        } = walker;
        let locals = frames
            .into_iter()
            .next()
            .map(|frame| frame.locals)
            .unwrap_or_default();
        Ok(Scope {
            params,
            locals,
            maps,
            return_type,
        })
    }
}

fn step_key(step: &Step) -> usize {
    step as *const Step as usize
}

struct Frame {
    /// Set for `map` bodies.
    map: Option<usize>,
    known: IndexSet<String>,
    locals: IndexMap<String, Type>,
    result_type: Option<Type>,
}

impl Frame {
    fn function(params: &IndexMap<String, Type>) -> Self {
        Self {
            map: None,
            known: params.keys().cloned().collect(),
            locals: IndexMap::new(),
            result_type: None,
        }
    }
}

struct Walker<'a> {
    exprs: &'a mut ExprCompiler,
    frames: Vec<Frame>,
    maps: AHashMap<usize, MapScope>,
    return_type: Option<Type>,
    /// Loop variables whose loop has ended.
    out_of_scope: IndexSet<String>,
}

impl Walker<'_> {
    fn steps(&mut self, steps: &[Step]) -> Result<(), FlowError> {
        steps.iter().try_for_each(|step| self.step(step))
    }

    fn step(&mut self, step: &Step) -> Result<(), FlowError> {
        match step {
            Step::Let(bindings) => {
                for (name, expr) in bindings {
                    let ty = self.read(expr)?;
                    self.assign(name, ty)?;
                }
            }
            Step::Set { target, value } => {
                let ty = self.read(value)?;
                if target.is_simple() {
                    self.assign(target.root(), ty)?;
                } else {
                    self.visible(target.root())?;
                    self.touch(target.root(), true);
                }
            }
            Step::If {
                condition,
                then,
                otherwise,
            } => {
                self.read(condition)?;
                self.steps(then)?;
                self.steps(otherwise)?;
            }
            Step::ForEach {
                source,
                alias,
                body,
            } => {
                self.visible(source.root())?;
                self.touch(source.root(), false);
                let bound = self.bind_loop_variable(alias);
                self.steps(body)?;
                if bound {
                    self.current().known.shift_remove(alias.as_str());
                    self.out_of_scope.insert(alias.clone());
                }
            }
            Step::Map {
                source,
                alias,
                body,
                target,
            } => {
                self.visible(source.root())?;
                self.touch(source.root(), false);
                let key = step_key(step);
                self.maps.insert(key, MapScope::default());
                let mut frame = Frame {
                    map: Some(key),
                    known: IndexSet::new(),
                    locals: IndexMap::new(),
                    result_type: None,
                };
                frame.known.insert(alias.clone());
                self.out_of_scope.shift_remove(alias.as_str());
                self.frames.push(frame);
                self.exprs.declare(alias, Type::Integer);
                self.steps(body)?;

                if let Some(frame) = self.frames.pop() {
                    if let Some(scope) = self.maps.get_mut(&key) {
                        scope.locals = frame.locals;
                        scope.result_type = frame.result_type.unwrap_or(Type::Integer);
                    }
                }
                if !self.frames.iter().any(|frame| frame.known.contains(alias.as_str())) {
                    self.out_of_scope.insert(alias.clone());
                }
                self.assign(target, Type::Array)?;
            }
            Step::Try { body, catch } => {
                self.steps(body)?;
                if let Some(catch) = catch {
                    self.assign(ERROR_BINDING, Type::Object)?;
                    self.steps(catch)?;
                }
            }
            Step::Assert { condition, .. } => {
                self.read(condition)?;
            }
            Step::Log { message, .. } => {
                for part in message {
                    if let LogPart::Expr(expr) = part {
                        self.read(expr)?;
                    }
                }
            }
            Step::Call(call) => {
                for arg in call.call.args.values() {
                    self.read(arg)?;
                }
                if let Some(target) = &call.target {
                    self.assign(target, call.call.return_type.unwrap_or(Type::Integer))?;
                }
            }
            Step::Return(value) => {
                let ty = self.read(value)?;
                let frame = self.current();
                if frame.map.is_some() {
                    frame.result_type.get_or_insert(ty);
                } else {
                    self.return_type.get_or_insert(ty);
                }
            }
        }
        Ok(())
    }

    fn current(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Records the variables `expr` reads and returns its type.
    fn read(&mut self, expr: &Expr) -> Result<Type, FlowError> {
        let mut roots = Vec::new();
        collect_roots(expr, &mut roots);
        for root in roots {
            self.visible(&root)?;
            self.touch(&root, false);
        }
        self.exprs.infer(expr)
    }

    /// Fails for a loop variable read after its loop.
    fn visible(&self, name: &str) -> Result<(), FlowError> {
        if self.out_of_scope.contains(name)
            && !self.frames.iter().any(|frame| frame.known.contains(name))
        {
            return Err(FlowError::UnknownVariable(name.to_string()));
        }
        Ok(())
    }

    fn assign(&mut self, name: &str, ty: Type) -> Result<(), FlowError> {
        if self.frames.iter().any(|frame| frame.known.contains(name)) {
            self.touch(name, true);
            return Ok(());
        }
        if self.out_of_scope.shift_remove(name) && self.exprs.lookup(name) != Some(ty) {
            // The loop already declared the name as an integer.
            return Err(FlowError::type_mismatch(format!("assign '{}'", name), "integer", ty));
        }
        let frame = self.current();
        frame.known.insert(name.to_string());
        frame.locals.insert(name.to_string(), ty);
        self.exprs.declare(name, ty);
        Ok(())
    }

    /// Returns whether `alias` is new to every enclosing frame.
    fn bind_loop_variable(&mut self, alias: &str) -> bool {
        if self.frames.iter().any(|frame| frame.known.contains(alias)) {
            return false;
        }
        self.out_of_scope.shift_remove(alias);
        self.current().known.insert(alias.to_string());
        self.exprs.declare(alias, Type::Integer);
        true
    }

    /// Marks `name` as used by every `map` body between its owner and the current frame.
    fn touch(&mut self, name: &str, write: bool) {
        for frame in self.frames.iter().rev() {
            if frame.known.contains(name) {
                return;
            }
            if let Some(scope) = frame.map.and_then(|key| self.maps.get_mut(&key)) {
                scope.captured.insert(name.to_string());
                if write {
                    scope.written.insert(name.to_string());
                }
            }
        }
    }
}

fn collect_roots(expr: &Expr, roots: &mut Vec<String>) {
    match expr {
        Expr::Get(path) => roots.push(path.root().to_string()),
        Expr::Literal(_) => {}
        Expr::Arith { operands, .. } | Expr::Logical { operands, .. } => {
            for operand in operands {
                collect_roots(operand, roots);
            }
        }
        Expr::Compare { left, right, .. } => {
            collect_roots(left, roots);
            collect_roots(right, roots);
        }
        Expr::In { item, array } => {
            collect_roots(item, roots);
            collect_roots(array, roots);
        }
        Expr::Not(inner) | Expr::Abs(inner) | Expr::Length(inner) => collect_roots(inner, roots),
        Expr::Call(spec) => {
            for arg in spec.args.values() {
                collect_roots(arg, roots);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discover(flow: serde_json::Value) -> (Flow, Scope) {
        let flow = Flow::from_value(flow).unwrap();
        let mut exprs = ExprCompiler::default();
        let scope = Scope::discover(&flow, &mut exprs).unwrap();
        (flow, scope)
    }

    #[test]
    fn locals_are_hoisted_with_inferred_types() {
        let (_, scope) = discover(serde_json::json!({
            "schema": {"inputs": {"x": "integer"}},
            "steps": [
                {"let": {"half": {"div": [{"get": "x"}, 2]}}},
                {"if": {"condition": true, "then": [{"set": {"target": "flag", "value": true}}]}},
                {"return": {"get": "half"}}
            ]
        }));
        assert_eq!(scope.locals.get("half"), Some(&Type::Number));
        assert_eq!(scope.locals.get("flag"), Some(&Type::Boolean));
        assert_eq!(scope.return_type, Some(Type::Number));
    }

    #[test]
    fn map_bodies_keep_their_own_locals() {
        let (flow, scope) = discover(serde_json::json!({
            "schema": {"context": {"numbers": "array", "total": "integer"}},
            "steps": [{"map": {
                "source": "numbers", "as": "n", "target": "doubled",
                "body": [
                    {"let": {"twice": {"mul": [{"get": "n"}, 2]}}},
                    {"set": {"target": "total", "value": {"get": "twice"}}},
                    {"return": {"get": "twice"}}
                ]
            }}]
        }));
        let map = scope.map(&flow.steps[0]).unwrap();
        assert!(map.locals.contains_key("twice"));
        assert!(map.written.contains("total"));
        assert!(!scope.locals.contains_key("twice"));
        assert_eq!(scope.locals.get("doubled"), Some(&Type::Array));
        assert_eq!(scope.return_type, None);
        assert_eq!(map.result_type, Type::Integer);
        assert_eq!(MapScope::default().result_type, Type::Integer);
    }

    #[test]
    fn loop_variables_end_with_their_loop() {
        let flow = Flow::from_value(serde_json::json!({
            "schema": {"context": {"numbers": "array"}},
            "steps": [
                {"forEach": {"source": "numbers", "as": "n", "body": []}},
                {"return": {"get": "n"}}
            ]
        }))
        .unwrap();
        let err = Scope::discover(&flow, &mut ExprCompiler::default()).unwrap_err();
        assert_eq!(err, FlowError::UnknownVariable("n".to_string()));
    }

    #[test]
    fn loop_variables_can_be_rebound_later() {
        let (_, scope) = discover(serde_json::json!({
            "schema": {"context": {"numbers": "array"}},
            "steps": [
                {"forEach": {"source": "numbers", "as": "n", "body": []}},
                {"let": {"n": 4}},
                {"forEach": {"source": "numbers", "as": "m", "body": [
                    {"set": {"target": "n", "value": {"get": "m"}}}
                ]}},
                {"return": {"get": "n"}}
            ]
        }));
        assert_eq!(scope.locals.get("n"), Some(&Type::Integer));
        assert_eq!(scope.return_type, Some(Type::Integer));
    }
}
