// Integration tests for the full expression pipeline
//
// These exercise lexing, promotion, property resolution, function dispatch,
// and operator collapse together through the public Expression API.

use calku::{value_at, Error, Expression, Value};
use serde_json::json;

fn eval(source: &str) -> Result<Value, Error> {
    Expression::new(source).value(&Value::Undefined)
}

fn eval_with(source: &str, target: serde_json::Value) -> Result<Value, Error> {
    Expression::new(source).value(&Value::from(target))
}

#[test]
fn test_order_of_operations() {
    assert_eq!(eval("10 + 5 - 12 / 3 * 2").unwrap(), Value::Number(7.0));
}

#[test]
fn test_parenthesised_grouping() {
    assert_eq!(
        eval("(15 - 2 * 4) + (1 + 1 / 4)").unwrap(),
        Value::Number(8.25)
    );
}

#[test]
fn test_logic_chain() {
    assert_eq!(
        eval("false AND true OR (true AND false)").unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn test_nested_function_calls() {
    assert_eq!(eval("SUM(SUM(1, 3), 4, 8, 5)").unwrap(), Value::Number(21.0));
}

#[test]
fn test_property_reference_in_math() {
    assert_eq!(
        eval_with("{num} + 3", json!({"num": 334455})).unwrap(),
        Value::Number(334458.0)
    );
}

#[test]
fn test_concatenation_of_mixed_types() {
    assert_eq!(
        eval("\"hi\" & \" there x\" & 3 & true").unwrap(),
        Value::from("hi there x3true")
    );
}

#[test]
fn test_value_at_deep_path() {
    let target = Value::from(json!({
        "test": {
            "moose": [
                {"hello": "mars"},
                {"hello": "jupiter", "moons": ["io", "europa"]},
                {"hello": "neptune", "meta": {"a": 1, "b": 2}}
            ]
        }
    }));
    // moose:1 -> second element; moons:1 -> "europa"; :2 -> its third character
    assert_eq!(
        value_at(&target, "test.moose:1.moons:1:2").unwrap(),
        Value::from("r")
    );
}

#[test]
fn test_unknown_function_error_names_it() {
    let err = eval("BOGUS(1,2)").unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
    assert!(err.to_string().contains("BOGUS"));
}

// ── Boundary behaviours ──────────────────────────────────────────────────────

#[test]
fn test_word_operators_need_a_boundary() {
    // "orange" must not lex as OR + "ange"
    assert_eq!(eval("orange").unwrap(), Value::from("orange"));
    assert_eq!(eval("\"a\" & orange").unwrap(), Value::from("aorange"));
}

#[test]
fn test_naked_false_is_boolean() {
    assert_eq!(eval("false").unwrap(), Value::Bool(false));
    // Quoted, it stays a string
    assert_eq!(eval("\"false\"").unwrap(), Value::from("false"));
}

#[test]
fn test_empty_expression_is_undefined() {
    assert_eq!(eval("").unwrap(), Value::Undefined);
}

#[test]
fn test_comments_are_dropped() {
    assert_eq!(eval("1 + 2 // the answer\n").unwrap(), Value::Number(3.0));
}

// ── Pinned semantics ─────────────────────────────────────────────────────────

#[test]
fn test_array_equality_is_reference_equality() {
    let target = json!({"a": [1, 2], "b": [1, 2]});
    // Two distinct arrays with equal contents never compare equal
    assert_eq!(
        eval_with("{a} == {b}", target.clone()).unwrap(),
        Value::Bool(false)
    );
    // The same array resolved twice shares its backing store
    assert_eq!(
        eval_with("{a} == {a}", target).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn test_truthiness_of_logic_operands() {
    // Empty containers are truthy; "", 0, null are not
    assert_eq!(
        eval_with("{arr} and true", json!({"arr": []})).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(eval("\"\" or 0 or null").unwrap(), Value::Bool(false));
    assert_eq!(eval("\"x\" and 1").unwrap(), Value::Bool(true));
}

#[test]
fn test_contains_coerces_numeric_left_operand() {
    assert_eq!(eval("12334 contains 3").unwrap(), Value::Bool(true));
    assert_eq!(eval("12334 ~~ 3").unwrap(), Value::Bool(true));
    assert_eq!(eval("12334 doesnotcontain 9").unwrap(), Value::Bool(true));
}

#[test]
fn test_contains_on_arrays_is_strict() {
    let target = json!({"xs": [1, "two", true]});
    assert_eq!(
        eval_with("{xs} contains \"two\"", target.clone()).unwrap(),
        Value::Bool(true)
    );
    // "1" does not strictly equal 1
    assert_eq!(
        eval_with("{xs} contains \"1\"", target).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn test_operator_result_classes() {
    assert!(eval("1 + 1").unwrap().is_number());
    assert!(eval("1 lt 2").unwrap().is_bool());
    assert!(eval("true and true").unwrap().is_bool());
    assert!(eval("1 & 2").unwrap().is_string());
}

#[test]
fn test_date_comparison() {
    assert_eq!(eval("2020-06-01 lt 2020-06-02").unwrap(), Value::Bool(true));
    assert_eq!(
        eval("2020-06-01T10:00:00Z eq 2020-06-01T12:00:00+02:00").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn test_date_round_trip_in_named_zone() {
    // 2020-06-01T00:00:00Z is 1590969600000 ms; Honolulu sits at -10:00
    let utc = Expression::new("2020-06-01").value(&Value::Undefined).unwrap();
    assert_eq!(utc.to_millis().unwrap(), 1590969600000);

    let hst = Expression::with_time_zone("2020-06-01", "Pacific/Honolulu")
        .value(&Value::Undefined)
        .unwrap();
    assert_eq!(hst.to_millis().unwrap(), 1590969600000 + 10 * 3600 * 1000);
}

#[test]
fn test_prototype_pollution_paths_are_rejected() {
    let target = Value::from(json!({"a": 1}));
    for path in ["__proto__", "a.constructor", "prototype.x"] {
        assert!(matches!(value_at(&target, path), Err(Error::Path(_))));
    }
    // The same names are rejected at lex time inside {…} references
    assert!(Expression::new("{a.__proto__}")
        .value(&target)
        .is_err());
}

#[test]
fn test_properties_listing() {
    let expr = Expression::new("IF({flag}, {a.b} + {a.b}, SUM({c}, 1)) // {not.this}\n");
    assert_eq!(expr.properties().unwrap(), vec!["flag", "a.b", "c"]);
}

#[test]
fn test_idempotent_reassignment() {
    let mut expr = Expression::new("1 + 1");
    let first = expr.value(&Value::Undefined).unwrap();
    expr.set_expression("1 + 1");
    let second = expr.value(&Value::Undefined).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_values_reports_per_target_results() {
    let targets = vec![
        Value::from(json!({"a": 2})),
        // Missing property: Undefined fails the math operand validation
        Value::from(json!({})),
        Value::from(json!({"a": 5})),
    ];
    let results = Expression::new("{a} * 2").values(&targets);
    assert_eq!(results[0].as_ref().unwrap(), &Value::Number(4.0));
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap(), &Value::Number(10.0));
}

#[test]
fn test_cyclic_targets_are_fine_for_finite_paths() {
    // Rc-backed values cannot form true cycles, but deep repeated shapes walk
    // the same way the traversal would walk a cycle: one level per segment
    let target = Value::from(json!({"a": {"a": {"a": {"leaf": 1}}}}));
    assert_eq!(
        value_at(&target, "a.a.a.leaf").unwrap(),
        Value::Number(1.0)
    );
}

#[test]
fn test_if_branches_and_validates() {
    assert_eq!(
        eval_with("IF({ok}, \"yes\", \"no\")", json!({"ok": true})).unwrap(),
        Value::from("yes")
    );
    // A non-boolean condition is a validation error, not a coercion
    let err = eval_with("IF({ok}, 1, 2)", json!({"ok": 1})).unwrap_err();
    assert!(err.to_string().contains("IF"));
}

#[test]
fn test_spread_functions_flatten_targets() {
    let target = json!({"xs": [1, [2, 3], [[4]]]});
    assert_eq!(
        eval_with("SUM({xs}, 5)", target.clone()).unwrap(),
        Value::Number(15.0)
    );
    assert_eq!(
        eval_with("AVERAGE({xs})", target.clone()).unwrap(),
        Value::Number(2.5)
    );
    assert_eq!(
        eval_with("COUNT({xs}, \"skip me\")", target).unwrap(),
        Value::Number(4.0)
    );
}

#[test]
fn test_text_functions_through_pipeline() {
    assert_eq!(
        eval("LEFT(\"formula\", 4)").unwrap(),
        Value::from("form")
    );
    assert_eq!(eval("LEN(12345)").unwrap(), Value::Number(5.0));
    assert_eq!(
        eval("TEXTJOIN(\"-\", true, \"a\", null, \"b\")").unwrap(),
        Value::from("a-b")
    );
}

#[test]
fn test_fixed_arity_raises_before_the_body() {
    // LEN would return 0 for null, but two arguments never reach it
    let err = eval("LEN(null, null)").unwrap_err();
    assert!(err.to_string().contains("LEN"));
}
