use super::expression::EXPR_TAGS;
use super::step::STEP_TAGS;
use super::{CallSpec, Step, Type, Value};
use crate::error::FlowError;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Name reserved for the value a `try` step binds on its catch path.
pub const ERROR_BINDING: &str = "error";

/// A complete IR document: declared variables, their starting values and the steps to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default, rename = "context")]
    pub initial_context: IndexMap<String, Value>,
    pub steps: Vec<Step>,
}

fn default_name() -> String {
    "Workflow".to_string()
}

/// Declared types of the flow's inputs and context entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, deserialize_with = "type_map")]
    pub inputs: IndexMap<String, Type>,
    #[serde(default, deserialize_with = "type_map")]
    pub context: IndexMap<String, Type>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TypeDecl {
    Token(Type),
    Described {
        #[serde(rename = "type")]
        ty: Type,
    },
}

fn type_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<IndexMap<String, Type>, D::Error> {
    let decls = IndexMap::<String, TypeDecl>::deserialize(deserializer)?;
    Ok(decls
        .into_iter()
        .map(|(name, decl)| match decl {
            TypeDecl::Token(ty) | TypeDecl::Described { ty } => (name, ty),
        })
        .collect())
}

impl Schema {
    /// The declared type of `name`. Context declarations take precedence over inputs.
    pub fn declared(&self, name: &str) -> Option<Type> {
        self.context
            .get(name)
            .or_else(|| self.inputs.get(name))
            .copied()
    }

    /// Inputs followed by context entries, each name once.
    pub fn entries(&self) -> IndexMap<&str, Type> {
        let mut entries = IndexMap::new();
        for (name, ty) in self.inputs.iter().chain(self.context.iter()) {
            entries.entry(name.as_str()).or_insert(*ty);
        }
        entries
    }
}

impl Flow {
    /// Parses and validates a flow document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, FlowError> {
        let document: serde_json::Value =
            serde_json::from_str(text).map_err(|e| FlowError::MalformedIR(e.to_string()))?;
        Self::from_value(document)
    }

    /// Builds a flow from an already parsed JSON document.
    ///
    /// Unknown step or expression tags are reported as `UnsupportedOperation`
    /// before any typed decoding happens, so they never surface as a generic shape error.
    pub fn from_value(document: serde_json::Value) -> Result<Self, FlowError> {
        let Some(object) = document.as_object() else {
            return Err(FlowError::MalformedIR(
                "a flow document must be a JSON object".to_string(),
            ));
        };
        match object.get("steps") {
            Some(serde_json::Value::Array(steps)) => scan_steps(steps)?,
            Some(_) => {
                return Err(FlowError::MalformedIR("'steps' must be an array".to_string()));
            }
            None => {
                return Err(FlowError::MalformedIR(
                    "missing required field 'steps'".to_string(),
                ));
            }
        }

        let flow: Flow =
            serde_json::from_value(document).map_err(|e| FlowError::MalformedIR(e.to_string()))?;
        flow.validate()?;
        Ok(flow)
    }

    /// Pre-flight checks that cannot be expressed in the document shape.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.schema.declared(ERROR_BINDING).is_some() {
            return Err(reserved("declared in the schema"));
        }
        fn check(steps: &[Step]) -> Result<(), FlowError> {
            for step in steps {
                let target = match step {
                    Step::Let(bindings) if bindings.contains_key(ERROR_BINDING) => Some("let"),
                    Step::Set { target, .. } if target.root() == ERROR_BINDING => Some("set"),
                    Step::Map { target, .. } if target == ERROR_BINDING => Some("map"),
                    Step::Call(call) if call.target.as_deref() == Some(ERROR_BINDING) => {
                        Some("call")
                    }
                    _ => None,
                };
                if let Some(tag) = target {
                    return Err(reserved(&format!("used as a '{}' target", tag)));
                }
                for body in step.children() {
                    check(body)?;
                }
            }
            Ok(())
        }
        check(&self.steps)
    }

    /// Variables a compiled flow receives as parameters: inputs then context entries.
    pub fn entry_variables(&self) -> IndexMap<&str, Type> {
        self.schema.entries()
    }

    pub fn has_async_call(&self) -> bool {
        self.steps.iter().any(Step::has_async_call)
    }

    /// Every call in the flow, in document order.
    pub fn calls(&self) -> Vec<&CallSpec> {
        let mut calls = Vec::new();
        for step in &self.steps {
            step.collect_calls(&mut calls);
        }
        calls
    }
}

fn reserved(detail: &str) -> FlowError {
    FlowError::MalformedIR(format!("'{}' is reserved and cannot be {}", ERROR_BINDING, detail))
}

// --- Structural tag scan ---

fn single_tag<'a>(
    node: &'a serde_json::Value,
    what: &str,
) -> Result<Option<(&'a str, &'a serde_json::Value)>, FlowError> {
    let Some(object) = node.as_object() else {
        return Ok(None);
    };
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((tag, body)), None) => Ok(Some((tag.as_str(), body))),
        (None, _) => Err(FlowError::MalformedIR(format!("empty {} object", what))),
        (Some(_), Some(_)) => Err(FlowError::MalformedIR(format!(
            "{} object must have exactly one tag, found [{}]",
            what,
            object.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        ))),
    }
}

fn scan_steps(steps: &[serde_json::Value]) -> Result<(), FlowError> {
    steps.iter().try_for_each(scan_step)
}

/// Bodies may be a single step object or a list of them.
fn scan_body(body: Option<&serde_json::Value>) -> Result<(), FlowError> {
    match body {
        Some(serde_json::Value::Array(steps)) => scan_steps(steps),
        Some(step @ serde_json::Value::Object(_)) => scan_step(step),
        _ => Ok(()),
    }
}

fn scan_step(step: &serde_json::Value) -> Result<(), FlowError> {
    let Some((tag, body)) = single_tag(step, "step")? else {
        return Err(FlowError::MalformedIR(format!(
            "a step must be an object, found {}",
            step
        )));
    };
    if !STEP_TAGS.contains(&tag) {
        return Err(FlowError::UnsupportedOperation(tag.to_string()));
    }
    match tag {
        "let" => {
            if let Some(bindings) = body.as_object() {
                bindings.values().try_for_each(scan_expr)?;
            }
        }
        "return" => scan_expr(body)?,
        "set" | "assert" => {
            for field in ["value", "condition"] {
                if let Some(expr) = body.get(field) {
                    scan_expr(expr)?;
                }
            }
        }
        "if" => {
            if let Some(condition) = body.get("condition") {
                scan_expr(condition)?;
            }
            scan_body(body.get("then"))?;
            scan_body(body.get("else"))?;
        }
        "forEach" | "map" => scan_body(body.get("body"))?,
        "try" => {
            scan_body(body.get("body"))?;
            scan_body(body.get("catch"))?;
        }
        "log" => {
            if let Some(serde_json::Value::Array(parts)) = body.get("message") {
                parts
                    .iter()
                    .filter(|part| part.is_object())
                    .try_for_each(scan_expr)?;
            }
        }
        "call" => scan_args(body.get("args"))?,
        _ => {}
    }
    Ok(())
}

fn scan_args(args: Option<&serde_json::Value>) -> Result<(), FlowError> {
    match args {
        Some(serde_json::Value::Object(named)) => named.values().try_for_each(scan_expr),
        Some(serde_json::Value::Array(positional)) => positional.iter().try_for_each(scan_expr),
        _ => Ok(()),
    }
}

fn scan_expr(expr: &serde_json::Value) -> Result<(), FlowError> {
    // Bare scalars and arrays are literals.
    let Some((tag, body)) = single_tag(expr, "expression")? else {
        return Ok(());
    };
    if !EXPR_TAGS.contains(&tag) {
        return Err(FlowError::UnsupportedOperation(tag.to_string()));
    }
    match tag {
        "add" | "sub" | "subtract" | "mul" | "multiply" | "div" | "divide" | "mod" | "and"
        | "or" => {
            if let Some(operands) = body.as_array() {
                operands.iter().try_for_each(scan_expr)?;
            }
        }
        "compare" => {
            for side in ["left", "right"] {
                if let Some(operand) = body.get(side) {
                    scan_expr(operand)?;
                }
            }
        }
        "in" => {
            for field in ["item", "value", "array"] {
                if let Some(operand) = body.get(field) {
                    scan_expr(operand)?;
                }
            }
        }
        "not" | "length" | "expr" => scan_expr(body)?,
        "abs" => scan_expr(body.get("value").unwrap_or(body))?,
        "call" => scan_args(body.get("args"))?,
        _ => {}
    }
    Ok(())
}
