//! Interpreter tests
//!
//! Runs fixture flows end to end and checks results and final context.
//!
mod common;
use common::*;
use jsonflow::prelude::*;
use std::sync::Arc;

#[cfg(test)]
mod interpreter_tests {
    use super::*;

    #[test]
    fn test_square_returns_product() {
        let flow = load(SQUARE_FLOW);
        let run = jsonflow::execute(&flow, inputs(&[("x", Value::Integer(7))])).unwrap();

        assert_eq!(run.result, Some(Value::Integer(49)));
        assert_eq!(run.context.get("result"), Some(&Value::Integer(49)));
    }

    #[test]
    fn test_zero_values_seed_undeclared_inputs() {
        let flow = load(SQUARE_FLOW);
        let run = jsonflow::execute(&flow, IndexMap::new()).unwrap();
        assert_eq!(run.result, Some(Value::Integer(0)));
    }

    #[test]
    fn test_set_on_array_appends() {
        let flow = load(COLLECT_FLOW);
        let run = jsonflow::execute(&flow, IndexMap::new()).unwrap();

        assert_eq!(run.result, Some(ints(&[3, 1, 2])));
        assert_eq!(run.context.get("count"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_inputs_override_initial_context() {
        let flow = load(COLLECT_FLOW);
        let run = jsonflow::execute(&flow, inputs(&[("numbers", ints(&[9]))])).unwrap();
        assert_eq!(run.result, Some(ints(&[9])));
    }

    #[test]
    fn test_map_preserves_source_order() {
        let flow = load(DOUBLE_FLOW);
        let interpreter = Interpreter::builder().map_threads(4).build();
        let run = interpreter.execute(&flow, IndexMap::new()).unwrap();

        assert_eq!(run.result, Some(ints(&[2, 4, 6, 8, 10, 12, 14, 16])));
        assert_eq!(run.context.get("numbers"), Some(&ints(&[1, 2, 3, 4, 5, 6, 7, 8])));
    }

    #[test]
    fn test_failed_map_leaves_target_unset() {
        let flow = load(FAILING_MAP_FLOW);
        let run = jsonflow::execute(&flow, IndexMap::new()).unwrap();

        assert_eq!(run.result, Some(Value::from("ArithmeticError")));
        assert!(run.context.get("inverted").is_none());
    }

    #[test]
    fn test_failed_map_without_try_propagates() {
        let flow = load(FAILING_MAP_FLOW);
        let Step::Try { body, .. } = &flow.steps[0] else {
            panic!("fixture starts with a try step");
        };
        let bare = Flow {
            steps: body.clone(),
            ..flow.clone()
        };

        let error = jsonflow::execute(&bare, IndexMap::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ArithmeticError);
    }

    #[test]
    fn test_try_completes_without_error() {
        let flow = load(WITHDRAW_FLOW);
        let run = jsonflow::execute(&flow, inputs(&[("amount", Value::Integer(20))])).unwrap();

        assert_eq!(run.result, Some(Value::Integer(30)));
        assert_eq!(run.context.get("message"), Some(&Value::from("")));
    }

    #[test]
    fn test_catch_sees_message_and_step_index() {
        let flow = load(WITHDRAW_FLOW);
        let run = jsonflow::execute(&flow, inputs(&[("amount", Value::Integer(80))])).unwrap();

        // The assertion is the second step of the try body.
        assert_eq!(run.result, Some(Value::Integer(1)));
        assert_eq!(run.context.get("message"), Some(&Value::from("insufficient funds")));
        assert_eq!(run.context.get("balance"), Some(&Value::Integer(50)));
    }

    #[test]
    fn test_try_without_catch_reraises() {
        let flow = Flow::from_json(
            r#"{"steps": [
                {"try": {"body": [{"assert": {"condition": false, "message": "nope"}}]}}
            ]}"#,
        )
        .unwrap();

        let error = jsonflow::execute(&flow, IndexMap::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AssertionFailed);
        assert_eq!(error.to_string(), "nope");
    }

    #[test]
    fn test_return_inside_loop_ends_run() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"numbers": "array"}},
                "context": {"numbers": [4, 9, 12]},
                "steps": [
                    {"forEach": {"source": "numbers", "as": "n", "body": [
                        {"if": {
                            "condition": {"compare": {"left": {"get": "n"}, "op": ">", "right": 5}},
                            "then": [{"return": {"get": "n"}}]
                        }}
                    ]}},
                    {"return": -1}
                ]
            }"#,
        )
        .unwrap();

        let run = jsonflow::execute(&flow, IndexMap::new()).unwrap();
        assert_eq!(run.result, Some(Value::Integer(9)));
    }

    #[test]
    fn test_non_boolean_condition_warns() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"count": "integer", "seen": "boolean"}},
                "context": {"count": 2},
                "steps": [
                    {"if": {"condition": {"get": "count"}, "then": {"set": {"target": "seen", "value": true}}}}
                ]
            }"#,
        )
        .unwrap();
        let sink = Arc::new(MemorySink::new());
        let interpreter = Interpreter::builder().sink(sink.clone()).build();

        let run = interpreter.execute(&flow, IndexMap::new()).unwrap();

        assert_eq!(run.context.get("seen"), Some(&Value::Bool(true)));
        let warnings = sink.messages_at(LogLevel::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("truthiness"));
    }

    #[test]
    fn test_log_step_reaches_sink() {
        let flow = load(WITHDRAW_FLOW);
        let sink = Arc::new(MemorySink::new());
        let interpreter = Interpreter::builder().sink(sink.clone()).build();

        interpreter
            .execute(&flow, inputs(&[("amount", Value::Integer(5))]))
            .unwrap();

        assert_eq!(sink.messages_at(LogLevel::Info), vec!["withdrawing 5".to_string()]);
    }

    #[test]
    fn test_large_whole_numbers_log_every_digit() {
        let flow = Flow::from_json(
            r#"{"steps": [{"log": {"level": "info", "message": ["v", 1e20, -0.0, 2.5]}}]}"#,
        )
        .unwrap();
        let sink = Arc::new(MemorySink::new());
        let interpreter = Interpreter::builder().sink(sink.clone()).build();

        interpreter.execute(&flow, IndexMap::new()).unwrap();
        assert_eq!(
            sink.messages_at(LogLevel::Info),
            vec!["v 100000000000000000000 0 2.5".to_string()]
        );
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let interpreter = Interpreter::builder().map_threads(4).build();
        for (fixture, input) in [
            (DOUBLE_FLOW, IndexMap::new()),
            (FAILING_MAP_FLOW, IndexMap::new()),
            (WITHDRAW_FLOW, inputs(&[("amount", Value::Integer(80))])),
        ] {
            let flow = load(fixture);
            let first = interpreter.execute(&flow, input.clone()).unwrap();
            let second = interpreter.execute(&flow, input).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_abs_keeps_integer_results() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"inputs": {"delta": "integer"}},
                "steps": [{"return": {"abs": {"value": {"get": "delta"}}}}]
            }"#,
        )
        .unwrap();
        let run = jsonflow::execute(&flow, inputs(&[("delta", Value::Integer(-12))])).unwrap();
        assert_eq!(run.result, Some(Value::Integer(12)));

        let error = jsonflow::execute(&flow, inputs(&[("delta", Value::Integer(i64::MIN))]))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ArithmeticError);
    }

    #[test]
    fn test_logical_operators_reject_integers() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"x": "integer"}},
                "context": {"x": 1},
                "steps": [{"return": {"and": [{"get": "x"}, true]}}]
            }"#,
        )
        .unwrap();
        let error = jsonflow::execute(&flow, IndexMap::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_loop_variable_is_gone_after_the_loop() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"numbers": "array"}},
                "context": {"numbers": [1, 2]},
                "steps": [
                    {"forEach": {"source": "numbers", "as": "n", "body": []}},
                    {"return": {"get": "n"}}
                ]
            }"#,
        )
        .unwrap();
        let error = jsonflow::execute(&flow, IndexMap::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnknownVariable);
    }

    #[test]
    fn test_nested_set_creates_objects() {
        let flow = Flow::from_json(
            r#"{
                "schema": {"context": {"balances": "object"}},
                "steps": [
                    {"set": {"target": ["balances", "alice"], "value": 10}},
                    {"return": {"get": ["balances", "alice"]}}
                ]
            }"#,
        )
        .unwrap();

        let run = jsonflow::execute(&flow, IndexMap::new()).unwrap();
        assert_eq!(run.result, Some(Value::Integer(10)));
    }

    #[test]
    fn test_unknown_variable_fails() {
        let flow = Flow::from_json(r#"{"steps": [{"return": {"get": "missing"}}]}"#).unwrap();
        let error = jsonflow::execute(&flow, IndexMap::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnknownVariable);
    }

    #[test]
    fn test_host_calls_through_resolver() {
        let flow = load(PRICE_FLOW);
        let resolver = FnResolver::new().register("price_of", |args| match args.first() {
            Some(Value::Integer(item)) => Ok(Value::Integer(item * 10)),
            _ => Ok(Value::Integer(0)),
        });
        let interpreter = Interpreter::builder().resolver(Arc::new(resolver)).build();

        let run = interpreter.execute(&flow, IndexMap::new()).unwrap();
        assert_eq!(run.result, Some(Value::Integer(50)));
    }

    #[test]
    fn test_missing_host_function_is_external_error() {
        let flow = load(PRICE_FLOW);
        let error = jsonflow::execute(&flow, IndexMap::new()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ExternalCallError);
    }

    #[test]
    fn test_async_call_is_awaited() {
        let flow = Flow::from_json(
            r#"{"steps": [
                {"call": {"function": "fetch_rate", "args": [3], "async": true, "target": "rate"}},
                {"return": {"get": "rate"}}
            ]}"#,
        )
        .unwrap();
        let resolver = FnResolver::new().register("fetch_rate", |args| {
            Ok(args.first().cloned().unwrap_or(Value::Null))
        });
        let interpreter = Interpreter::builder().resolver(Arc::new(resolver)).build();

        let run = interpreter.execute(&flow, IndexMap::new()).unwrap();
        assert_eq!(run.result, Some(Value::Integer(3)));
    }
}
