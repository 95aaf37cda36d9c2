//! Common test utilities: flow fixtures and input helpers.
use jsonflow::prelude::*;

/// `result = x * x; return result`
#[allow(dead_code)]
pub const SQUARE_FLOW: &str = r#"{
    "name": "Square",
    "schema": {"context": {"x": "integer", "result": "integer"}},
    "steps": [
        {"set": {"target": "result", "value": {"mul": [{"get": "x"}, {"get": "x"}]}}},
        {"return": {"get": "result"}}
    ]
}"#;

/// Appends every element of `numbers` to the array-declared `collected`.
#[allow(dead_code)]
pub const COLLECT_FLOW: &str = r#"{
    "name": "Collect",
    "schema": {"context": {"numbers": "array", "collected": "array", "count": "integer"}},
    "context": {"numbers": [3, 1, 2]},
    "steps": [
        {"forEach": {"source": "numbers", "as": "n", "body": [
            {"set": {"target": "collected", "value": {"get": "n"}}},
            {"set": {"target": "count", "value": {"add": [{"get": "count"}, 1]}}}
        ]}},
        {"return": {"get": "collected"}}
    ]
}"#;

/// Doubles each element in parallel.
#[allow(dead_code)]
pub const DOUBLE_FLOW: &str = r#"{
    "name": "Double All",
    "schema": {"context": {"numbers": "array"}},
    "context": {"numbers": [1, 2, 3, 4, 5, 6, 7, 8]},
    "steps": [
        {"map": {"source": "numbers", "as": "n", "target": "doubled", "body": [
            {"return": {"mul": [{"get": "n"}, 2]}}
        ]}},
        {"return": {"get": "doubled"}}
    ]
}"#;

/// One element divides by zero; the catch path records the failure.
#[allow(dead_code)]
pub const FAILING_MAP_FLOW: &str = r#"{
    "name": "Reciprocals",
    "schema": {"context": {"numbers": "array", "status": "string"}},
    "context": {"numbers": [1, 2, 0, 4]},
    "steps": [
        {"try": {
            "body": [
                {"map": {"source": "numbers", "as": "n", "target": "inverted", "body": [
                    {"return": {"div": [100, {"get": "n"}]}}
                ]}}
            ],
            "catch": [
                {"set": {"target": "status", "value": {"get": ["error", "kind"]}}}
            ]
        }},
        {"return": {"get": "status"}}
    ]
}"#;

/// A withdrawal guarded by an assertion inside a `try`.
#[allow(dead_code)]
pub const WITHDRAW_FLOW: &str = r#"{
    "name": "withdraw",
    "schema": {
        "inputs": {"amount": "integer"},
        "context": {"balance": "integer", "message": "string"}
    },
    "context": {"balance": 50},
    "steps": [
        {"try": {
            "body": [
                {"log": {"level": "info", "message": ["withdrawing", {"get": "amount"}]}},
                {"assert": {"condition": {"compare": {"left": {"get": "balance"}, "op": ">=", "right": {"get": "amount"}}}, "message": "insufficient funds"}},
                {"set": {"target": "balance", "value": {"sub": [{"get": "balance"}, {"get": "amount"}]}}}
            ],
            "catch": [
                {"set": {"target": "message", "value": {"get": ["error", "message"]}}},
                {"return": {"get": ["error", "stepIndex"]}}
            ]
        }},
        {"return": {"get": "balance"}}
    ]
}"#;

/// Calls a host function on each element.
#[allow(dead_code)]
pub const PRICE_FLOW: &str = r#"{
    "name": "Total Price",
    "schema": {"context": {"items": "array", "total": "integer"}},
    "context": {"items": [2, 3]},
    "steps": [
        {"forEach": {"source": "items", "as": "item", "body": [
            {"call": {"function": "price_of", "args": {"item": {"get": "item"}}, "target": "price", "returnType": "integer"}},
            {"set": {"target": "total", "value": {"add": [{"get": "total"}, {"get": "price"}]}}}
        ]}},
        {"return": {"get": "total"}}
    ]
}"#;

#[allow(dead_code)]
pub fn load(json: &str) -> Flow {
    Flow::from_json(json).expect("fixture flow should load")
}

#[allow(dead_code)]
pub fn inputs(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[allow(dead_code)]
pub fn ints(values: &[i64]) -> Value {
    Value::Array(values.iter().map(|v| Value::Integer(*v)).collect())
}
