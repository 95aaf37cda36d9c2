//! The variable store a flow run reads from and writes to.

use crate::error::FlowError;
use crate::ir::{Flow, Path, Schema, Segment, Type, Value};
use indexmap::IndexMap;
use std::sync::Arc;

/// Named bindings plus the schema that decides how writes behave.
///
/// Writes to a single-name path whose declared type is `array` append instead
/// of overwriting. The decision reads the declared type, never the current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    schema: Arc<Schema>,
    values: IndexMap<String, Value>,
}

impl Context {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            values: IndexMap::new(),
        }
    }

    /// Starting state of a run: declared variables at their zero values, then the
    /// flow's initial context, then caller inputs.
    pub fn seeded(flow: &Flow, inputs: IndexMap<String, Value>) -> Self {
        let mut context = Self::new(Arc::new(flow.schema.clone()));
        for (name, ty) in flow.schema.entries() {
            context.values.insert(name.to_string(), ty.zero_value());
        }
        for (name, value) in flow.initial_context.iter() {
            context.values.insert(name.clone(), value.clone());
        }
        context.values.extend(inputs);
        context
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn declared_type(&self, name: &str) -> Option<Type> {
        self.schema.declared(name)
    }

    /// Looks up a path, failing with `UnknownVariable` when any segment is absent.
    pub fn lookup(&self, path: &Path) -> Result<&Value, FlowError> {
        let missing = || FlowError::UnknownVariable(path.to_string());
        let mut current = self.values.get(path.root()).ok_or_else(missing)?;
        for segment in path.keys() {
            current = match (current, segment) {
                (Value::Object(map), Segment::Key(key)) => map.get(key),
                (Value::Object(map), Segment::Index(i)) => map.get(&i.to_string()),
                (Value::Array(items), Segment::Index(i)) => items.get(*i),
                (Value::Array(items), Segment::Key(key)) => {
                    key.parse::<usize>().ok().and_then(|i| items.get(i))
                }
                _ => None,
            }
            .ok_or_else(missing)?;
        }
        Ok(current)
    }

    pub fn resolve(&self, path: &Path) -> Result<Value, FlowError> {
        self.lookup(path).cloned()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Writes `value` at `path`, appending for declared arrays and creating
    /// intermediate objects on demand.
    pub fn set(&mut self, path: &Path, value: Value) -> Result<(), FlowError> {
        if path.is_simple() {
            return self.assign(path.root(), value);
        }

        let keys = path.keys();
        let mut current = self
            .values
            .entry(path.root().to_string())
            .or_insert_with(|| Value::Object(IndexMap::new()));
        for (depth, segment) in keys.iter().enumerate() {
            let last = depth + 1 == keys.len();
            current = match current {
                Value::Object(map) => {
                    let key = segment.to_string();
                    if last {
                        map.insert(key, value);
                        return Ok(());
                    }
                    map.entry(key)
                        .or_insert_with(|| Value::Object(IndexMap::new()))
                }
                Value::Array(items) => {
                    let index = match segment {
                        Segment::Index(i) => Some(*i),
                        Segment::Key(key) => key.parse::<usize>().ok(),
                    }
                    .filter(|i| *i <= items.len())
                    .ok_or_else(|| FlowError::UnknownVariable(path.to_string()))?;
                    if index == items.len() {
                        items.push(Value::Object(IndexMap::new()));
                    }
                    if last {
                        items[index] = value;
                        return Ok(());
                    }
                    &mut items[index]
                }
                other => {
                    return Err(FlowError::type_mismatch(
                        format!("set {}", path),
                        "object or array",
                        Type::of(other),
                    ));
                }
            };
        }
        Ok(())
    }

    /// Writes a top-level variable under the declared-type rule.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), FlowError> {
        if self.declared_type(name) == Some(Type::Array) {
            let slot = self
                .values
                .entry(name.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            return match slot {
                Value::Array(items) => {
                    items.push(value);
                    Ok(())
                }
                other => Err(FlowError::type_mismatch(
                    format!("append to {}", name),
                    Type::Array.as_str(),
                    Type::of(other),
                )),
            };
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Overwrites a top-level binding regardless of its declared type and returns the
    /// value it replaced. Used for loop aliases, map targets and the caught `error`.
    pub fn bind(&mut self, name: &str, value: Value) -> Option<Value> {
        self.values.insert(name.to_string(), value)
    }

    /// Removes a binding, keeping the order of the remaining entries.
    pub fn unbind(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    /// Puts back whatever `bind` displaced.
    pub(crate) fn restore(&mut self, name: &str, previous: Option<Value>) {
        match previous {
            Some(value) => {
                self.values.insert(name.to_string(), value);
            }
            None => {
                self.values.shift_remove(name);
            }
        }
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> IndexMap<String, Value> {
        self.values
    }

    /// The bindings as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(name, value)| (name.clone(), value.clone().into()))
                .collect(),
        )
    }
}
