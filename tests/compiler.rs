//! Compiler and backend tests
//!
//! Checks the shape of generated source per target and the whitelist gate.
//!
mod common;
use common::*;
use jsonflow::prelude::*;
use std::sync::Arc;

#[cfg(test)]
mod backend_tests {
    use super::*;

    #[test]
    fn test_python_square() {
        let source = jsonflow::compile(&load(SQUARE_FLOW), Lang::Python).unwrap();

        assert!(source.contains("def square(x=0, result=0):"));
        assert!(source.contains("class FlowError(Exception):"));
        assert!(source.contains("return result"));
    }

    #[test]
    fn test_javascript_square() {
        let source = jsonflow::compile(&load(SQUARE_FLOW), Lang::Javascript).unwrap();

        assert!(source.contains("export function square({ x = 0, result = 0 } = {}) {"));
        assert!(source.contains("return result;"));
    }

    #[test]
    fn test_rust_square() {
        let source = jsonflow::compile(&load(SQUARE_FLOW), Lang::Rust).unwrap();

        assert!(source.contains(
            "pub fn square(mut x: i32, mut result: i32) -> Result<Option<i32>, FlowError> {"
        ));
        assert!(source.contains("pub enum FlowError"));
        assert!(!source.contains("use rayon::prelude::*;"));
    }

    #[test]
    fn test_solidity_square() {
        let source = jsonflow::compile(&load(SQUARE_FLOW), Lang::Solidity).unwrap();

        assert!(source.starts_with("// SPDX-License-Identifier"));
        assert!(source.contains("contract Square {"));
        assert!(source.contains("function square("));
        assert!(source.contains("return result;"));
    }

    #[test]
    fn test_array_context_appends_in_every_target() {
        let flow = load(COLLECT_FLOW);
        let compiler = Compiler::default();

        let python = compiler.compile(&flow, Lang::Python).unwrap();
        assert!(python.contains("collected.append(n)"));
        let javascript = compiler.compile(&flow, Lang::Javascript).unwrap();
        assert!(javascript.contains("collected.push(n);"));
        let rust = compiler.compile(&flow, Lang::Rust).unwrap();
        assert!(rust.contains("collected.push(n);"));
        let solidity = compiler.compile(&flow, Lang::Solidity).unwrap();
        assert!(solidity.contains("collected.push(n);"));
    }

    #[test]
    fn test_map_uses_each_targets_parallelism() {
        let flow = load(DOUBLE_FLOW);
        let compiler = Compiler::default();

        let python = compiler.compile(&flow, Lang::Python).unwrap();
        assert!(python.contains("ThreadPoolExecutor"));
        let rust = compiler.compile(&flow, Lang::Rust).unwrap();
        assert!(rust.contains("use rayon::prelude::*;"));
        assert!(rust.contains("into_par_iter()"));
    }

    #[test]
    fn test_try_catch_binds_error() {
        let flow = load(WITHDRAW_FLOW);

        let python = jsonflow::compile(&flow, Lang::Python).unwrap();
        assert!(python.contains("error = _caught("));
        let javascript = jsonflow::compile(&flow, Lang::Javascript).unwrap();
        assert!(javascript.contains("error = __caught("));
        let rust = jsonflow::compile(&flow, Lang::Rust).unwrap();
        assert!(rust.contains("CaughtError::new(&__error"));
    }

    #[test]
    fn test_async_call_makes_function_async() {
        let flow = Flow::from_json(
            r#"{"name": "fetch total", "steps": [
                {"call": {"function": "fetch_rate", "args": [3], "async": true, "target": "rate", "returnType": "integer"}},
                {"return": {"get": "rate"}}
            ]}"#,
        )
        .unwrap();

        let python = jsonflow::compile(&flow, Lang::Python).unwrap();
        assert!(python.contains("async def fetch_total("));
        let javascript = jsonflow::compile(&flow, Lang::Javascript).unwrap();
        assert!(javascript.contains("export async function fetchTotal("));
        let rust = jsonflow::compile(&flow, Lang::Rust).unwrap();
        assert!(rust.contains("pub async fn fetch_total("));
    }

    #[test]
    fn test_non_boolean_condition_warns_at_compile_time() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"count": "integer", "seen": "boolean"}},
                "steps": [{"if": {"condition": {"get": "count"}, "then": {"set": {"target": "seen", "value": true}}}}]
            }"#,
        )
        .unwrap();
        let sink = Arc::new(MemorySink::new());
        let compiler = Compiler::builder().sink(sink.clone()).build();

        compiler.compile(&flow, Lang::Javascript).unwrap();
        assert_eq!(sink.messages_at(LogLevel::Warn).len(), 1);
    }
}

#[cfg(test)]
mod whitelist_tests {
    use super::*;

    #[test]
    fn test_solidity_rejects_map() {
        let error = jsonflow::compile(&load(DOUBLE_FLOW), Lang::Solidity).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::BackendUnsupported);
        assert!(error.to_string().contains("map"));
    }

    #[test]
    fn test_allowed_ops_override_admits_map() {
        let compiler = Compiler::builder()
            .with_allowed_ops(Lang::Solidity, ["set", "map", "return"])
            .build();

        let source = compiler.compile(&load(DOUBLE_FLOW), Lang::Solidity).unwrap();
        assert!(source.contains("new uint256[]("));
    }

    #[test]
    fn test_allowed_ops_override_can_narrow() {
        let compiler = Compiler::builder()
            .with_allowed_ops(Lang::Python, ["return"])
            .build();

        let error = compiler.compile(&load(SQUARE_FLOW), Lang::Python).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::BackendUnsupported);
    }

    #[test]
    fn test_skip_whitelist() {
        let compiler = Compiler::builder().skip_whitelist(true).build();
        assert!(compiler.compile(&load(DOUBLE_FLOW), Lang::Solidity).is_ok());
    }

    #[test]
    fn test_unregistered_backend_is_compile_error() {
        let compiler = Compiler::builder().without_backend(Lang::Rust).build();

        assert_eq!(compiler.languages(), vec![Lang::Javascript, Lang::Python, Lang::Solidity]);
        let error = compiler.compile(&load(SQUARE_FLOW), Lang::Rust).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CompileError);
    }

    #[test]
    fn test_backend_limits_surface_as_compile_errors() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"ledger": "object"}},
                "steps": [{"set": {"target": ["ledger", "alice", "balance"], "value": 1}}]
            }"#,
        )
        .unwrap();

        let error = jsonflow::compile(&flow, Lang::Solidity).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CompileError);
    }
}

#[cfg(test)]
mod golden_tests {
    use super::*;

    fn generate(fixture: &str, lang: Lang) -> String {
        let compiler = Compiler::builder().skip_whitelist(true).build();
        compiler.compile(&load(fixture), lang).unwrap()
    }

    #[test]
    fn test_square_matches_golden_sources() {
        assert_eq!(generate(SQUARE_FLOW, Lang::Python), include_str!("golden/square.py"));
        assert_eq!(generate(SQUARE_FLOW, Lang::Javascript), include_str!("golden/square.js"));
        assert_eq!(generate(SQUARE_FLOW, Lang::Rust), include_str!("golden/square.rs"));
        assert_eq!(generate(SQUARE_FLOW, Lang::Solidity), include_str!("golden/square.sol"));
    }

    #[test]
    fn test_double_matches_golden_sources() {
        assert_eq!(generate(DOUBLE_FLOW, Lang::Python), include_str!("golden/double_all.py"));
        assert_eq!(generate(DOUBLE_FLOW, Lang::Javascript), include_str!("golden/double_all.js"));
        assert_eq!(generate(DOUBLE_FLOW, Lang::Rust), include_str!("golden/double_all.rs"));
        assert_eq!(generate(DOUBLE_FLOW, Lang::Solidity), include_str!("golden/double_all.sol"));
    }

    #[test]
    fn test_withdraw_matches_golden_sources() {
        assert_eq!(generate(WITHDRAW_FLOW, Lang::Python), include_str!("golden/withdraw.py"));
        assert_eq!(generate(WITHDRAW_FLOW, Lang::Javascript), include_str!("golden/withdraw.js"));
        assert_eq!(generate(WITHDRAW_FLOW, Lang::Rust), include_str!("golden/withdraw.rs"));
        assert_eq!(generate(WITHDRAW_FLOW, Lang::Solidity), include_str!("golden/withdraw.sol"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        for fixture in [SQUARE_FLOW, DOUBLE_FLOW, WITHDRAW_FLOW, COLLECT_FLOW] {
            for lang in Lang::ALL {
                assert_eq!(generate(fixture, lang), generate(fixture, lang));
            }
        }
    }
}

#[cfg(test)]
mod typing_tests {
    use super::*;

    #[test]
    fn test_logical_operands_on_integers_are_rejected() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"x": "integer"}},
                "steps": [{"return": {"and": [{"get": "x"}, true]}}]
            }"#,
        )
        .unwrap();

        for lang in Lang::ALL {
            let error = jsonflow::compile(&flow, lang).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::TypeMismatch, "{}", lang);
        }
        let run = jsonflow::execute(&flow, IndexMap::new()).unwrap_err();
        assert_eq!(run.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_nested_logical_operands_are_checked_when_run() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"flags": "object", "seen": "boolean"}},
                "steps": [
                    {"assert": {"condition": {"get": ["flags", "ready"]}, "message": "not ready"}},
                    {"set": {"target": "seen", "value": {"not": {"get": ["flags", "on"]}}}}
                ]
            }"#,
        )
        .unwrap();

        let python = jsonflow::compile(&flow, Lang::Python).unwrap();
        assert!(python.contains("def _bool(value, operation):"));
        assert!(python.contains("if not _bool(flags[\"ready\"], \"assert\"):"));
        assert!(python.contains("seen = (not _bool(flags[\"on\"], \"not\"))"));
        let javascript = jsonflow::compile(&flow, Lang::Javascript).unwrap();
        assert!(javascript.contains("seen = (!__bool(flags[\"on\"], \"not\"));"));
    }

    #[test]
    fn test_typed_targets_only_store_integers_in_collections() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"logs": "array", "totals": "object"}},
                "steps": [
                    {"set": {"target": "logs", "value": "approved"}},
                    {"set": {"target": ["totals", "day"], "value": 1}}
                ]
            }"#,
        )
        .unwrap();

        for lang in [Lang::Rust, Lang::Solidity] {
            let error = jsonflow::compile(&flow, lang).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::CompileError, "{}", lang);
            assert!(error.to_string().contains("logs"));
        }
        let python = jsonflow::compile(&flow, Lang::Python).unwrap();
        assert!(python.contains("logs.append(\"approved\")"));
    }

    #[test]
    fn test_typed_targets_reject_text_under_a_key() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"totals": "object"}},
                "steps": [{"set": {"target": ["totals", "note"], "value": "late"}}]
            }"#,
        )
        .unwrap();

        for lang in [Lang::Rust, Lang::Solidity] {
            let error = jsonflow::compile(&flow, lang).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::CompileError, "{}", lang);
        }
    }

    #[test]
    fn test_loop_variable_is_unknown_after_the_loop() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"numbers": "array"}},
                "steps": [
                    {"forEach": {"source": "numbers", "as": "n", "body": []}},
                    {"return": {"get": "n"}}
                ]
            }"#,
        )
        .unwrap();

        for lang in Lang::ALL {
            let error = jsonflow::compile(&flow, lang).unwrap_err();
            assert_eq!(error, FlowError::UnknownVariable("n".to_string()));
        }
    }
}

#[cfg(test)]
mod solidity_try_tests {
    use super::*;

    const DIVIDE_FLOW: &str = r#"{
        "name": "divide",
        "schema": {"inputs": {"n": "integer"}, "context": {"q": "number", "status": "string"}},
        "steps": [
            {"try": {
                "body": [{"let": {"q": {"div": [10, {"get": "n"}]}}}],
                "catch": [{"set": {"target": "status", "value": {"get": ["error", "kind"]}}}]
            }}
        ]
    }"#;

    #[test]
    fn test_zero_divisor_is_recorded_as_failure() {
        let compiler = Compiler::builder().skip_whitelist(true).build();
        let source = compiler.compile(&load(DIVIDE_FLOW), Lang::Solidity).unwrap();

        assert!(source.contains("if (!__failed_0 && n == 0) {"));
        assert!(source.contains(
            "__failure_0 = FlowFailure(\"Arithmetic error: division by zero\", 0, \"ArithmeticError\");"
        ));

        let run = jsonflow::execute(&load(DIVIDE_FLOW), inputs(&[("n", Value::Integer(0))])).unwrap();
        assert_eq!(run.context.get("status"), Some(&Value::from("ArithmeticError")));
    }

    #[test]
    fn test_modulo_checks_each_divisor() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"inputs": {"a": "integer", "b": "integer"}, "context": {"r": "integer"}},
                "steps": [{"try": {
                    "body": [{"set": {"target": "r", "value": {"mod": [100, {"get": "a"}, {"get": "b"}]}}}],
                    "catch": [{"set": {"target": "r", "value": 0}}]
                }}]
            }"#,
        )
        .unwrap();
        let compiler = Compiler::builder().skip_whitelist(true).build();
        let source = compiler.compile(&flow, Lang::Solidity).unwrap();

        assert!(source.contains("if (!__failed_0 && a == 0) {"));
        assert!(source.contains("if (!__failed_0 && b == 0) {"));
        assert!(source.contains("\"Arithmetic error: modulo by zero\""));
    }

    #[test]
    fn test_host_calls_in_try_body_are_rejected() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"status": "string"}},
                "steps": [{"try": {
                    "body": [{"call": {"function": "ping", "args": [], "target": "reply", "returnType": "integer"}}],
                    "catch": [{"set": {"target": "status", "value": "down"}}]
                }}]
            }"#,
        )
        .unwrap();
        let compiler = Compiler::builder().skip_whitelist(true).build();

        let error = compiler.compile(&flow, Lang::Solidity).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CompileError);
        assert!(error.to_string().contains("host calls"));
        assert!(compiler.compile(&flow, Lang::Python).is_ok());
    }
}
