// Operator catalog
// A read-only table of binary operator specs plus memoised tables derived
// from it: compiled symbol matchers for the lexer and precedence tie groups
// for the evaluator.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use regex::Regex;

use crate::validator::{ArgRule, TypeTag, ValidationError, Validator};
use crate::value::Value;

/// Operator families; each determines the result tag (logic and compare
/// produce booleans, math produces numbers, consolidate produces strings).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Logic,
    Compare,
    Math,
    Consolidate,
}

/// One catalog entry. Smaller `precedence` evaluates first; entries sharing a
/// precedence form a tie group evaluated left-to-right.
pub struct OperatorSpec {
    pub key: &'static str,
    pub kind: OpKind,
    pub symbols: &'static [&'static str],
    pub precedence: u32,
    pub left: Option<ArgRule>,
    pub right: Option<ArgRule>,
    pub eval: fn(&Value, &Value) -> Value,
}

// ── Argument rules ───────────────────────────────────────────────────────────

fn math_operand(v: Validator) -> Validator {
    v.instance_of(&[TypeTag::Number, TypeTag::Boolean, TypeTag::Null])
}

fn containment_left(v: Validator) -> Validator {
    v.instance_of(&[
        TypeTag::Array,
        TypeTag::String,
        TypeTag::Number,
        TypeTag::Boolean,
        TypeTag::Null,
    ])
}

fn containment_right(v: Validator) -> Validator {
    v.instance_of(&[
        TypeTag::String,
        TypeTag::Number,
        TypeTag::Boolean,
        TypeTag::Null,
    ])
}

fn concat_operand(v: Validator) -> Validator {
    v.instance_of(&[
        TypeTag::String,
        TypeTag::Number,
        TypeTag::Boolean,
        TypeTag::Date,
        TypeTag::Null,
    ])
}

// ── Evaluators ───────────────────────────────────────────────────────────────

fn eval_exponentiation(a: &Value, b: &Value) -> Value {
    Value::Number(a.coerce_number().powf(b.coerce_number()))
}

fn eval_division(a: &Value, b: &Value) -> Value {
    let divisor = b.coerce_number();
    if divisor == 0.0 {
        Value::Number(f64::NAN)
    } else {
        Value::Number(a.coerce_number() / divisor)
    }
}

fn eval_modulo(a: &Value, b: &Value) -> Value {
    let divisor = b.coerce_number();
    if divisor == 0.0 {
        Value::Number(f64::NAN)
    } else {
        Value::Number(a.coerce_number() % divisor)
    }
}

fn eval_multiplication(a: &Value, b: &Value) -> Value {
    Value::Number(a.coerce_number() * b.coerce_number())
}

fn eval_addition(a: &Value, b: &Value) -> Value {
    Value::Number(a.coerce_number() + b.coerce_number())
}

fn eval_subtraction(a: &Value, b: &Value) -> Value {
    Value::Number(a.coerce_number() - b.coerce_number())
}

fn eval_and(a: &Value, b: &Value) -> Value {
    Value::Bool(a.is_truthy() && b.is_truthy())
}

fn eval_or(a: &Value, b: &Value) -> Value {
    Value::Bool(a.is_truthy() || b.is_truthy())
}

fn eval_less_than(a: &Value, b: &Value) -> Value {
    Value::Bool(a.strict_lt(b))
}

fn eval_less_than_or_equal(a: &Value, b: &Value) -> Value {
    Value::Bool(a == b || a.strict_lt(b))
}

fn eval_greater_than(a: &Value, b: &Value) -> Value {
    Value::Bool(b.strict_lt(a))
}

fn eval_greater_than_or_equal(a: &Value, b: &Value) -> Value {
    Value::Bool(a == b || b.strict_lt(a))
}

fn eval_equals(a: &Value, b: &Value) -> Value {
    Value::Bool(a == b)
}

fn eval_not_equals(a: &Value, b: &Value) -> Value {
    Value::Bool(a != b)
}

/// Arrays test strict element equality; anything else is coerced to its text
/// form for a substring test.
fn contains_test(left: &Value, right: &Value) -> bool {
    if left.is_nullish() && right.is_nullish() {
        return true;
    }
    if let Value::Array(items) = left {
        return items.iter().any(|item| item == right);
    }
    left.text_form().contains(&right.text_form())
}

fn starts_with_test(left: &Value, right: &Value) -> bool {
    if left.is_nullish() && right.is_nullish() {
        return true;
    }
    if let Value::Array(items) = left {
        return items.first().map_or(false, |item| item == right);
    }
    left.text_form().starts_with(&right.text_form())
}

fn ends_with_test(left: &Value, right: &Value) -> bool {
    if left.is_nullish() && right.is_nullish() {
        return true;
    }
    if let Value::Array(items) = left {
        return items.last().map_or(false, |item| item == right);
    }
    left.text_form().ends_with(&right.text_form())
}

fn eval_contains(a: &Value, b: &Value) -> Value {
    Value::Bool(contains_test(a, b))
}

fn eval_does_not_contain(a: &Value, b: &Value) -> Value {
    Value::Bool(!contains_test(a, b))
}

fn eval_starts_with(a: &Value, b: &Value) -> Value {
    Value::Bool(starts_with_test(a, b))
}

fn eval_ends_with(a: &Value, b: &Value) -> Value {
    Value::Bool(ends_with_test(a, b))
}

fn eval_concatenate(a: &Value, b: &Value) -> Value {
    Value::string(format!("{}{}", a.text_form(), b.text_form()))
}

// ── The catalog ──────────────────────────────────────────────────────────────

pub static OPERATORS: &[OperatorSpec] = &[
    OperatorSpec {
        key: "EXPONENTIATION",
        kind: OpKind::Math,
        symbols: &["^"],
        precedence: 50,
        left: Some(math_operand),
        right: Some(math_operand),
        eval: eval_exponentiation,
    },
    OperatorSpec {
        key: "DIVISION",
        kind: OpKind::Math,
        symbols: &["/"],
        precedence: 100,
        left: Some(math_operand),
        right: Some(math_operand),
        eval: eval_division,
    },
    OperatorSpec {
        key: "MODULO",
        kind: OpKind::Math,
        symbols: &["%"],
        precedence: 100,
        left: Some(math_operand),
        right: Some(math_operand),
        eval: eval_modulo,
    },
    OperatorSpec {
        key: "MULTIPLICATION",
        kind: OpKind::Math,
        symbols: &["*"],
        precedence: 100,
        left: Some(math_operand),
        right: Some(math_operand),
        eval: eval_multiplication,
    },
    OperatorSpec {
        key: "ADDITION",
        kind: OpKind::Math,
        symbols: &["+"],
        precedence: 120,
        left: Some(math_operand),
        right: Some(math_operand),
        eval: eval_addition,
    },
    OperatorSpec {
        key: "SUBTRACTION",
        kind: OpKind::Math,
        symbols: &["-"],
        precedence: 120,
        left: Some(math_operand),
        right: Some(math_operand),
        eval: eval_subtraction,
    },
    OperatorSpec {
        key: "AND",
        kind: OpKind::Logic,
        symbols: &["and", "&&"],
        precedence: 200,
        left: None,
        right: None,
        eval: eval_and,
    },
    OperatorSpec {
        key: "OR",
        kind: OpKind::Logic,
        symbols: &["or", "||"],
        precedence: 205,
        left: None,
        right: None,
        eval: eval_or,
    },
    OperatorSpec {
        key: "LESSTHAN",
        kind: OpKind::Compare,
        symbols: &["lt", "<"],
        precedence: 300,
        left: None,
        right: None,
        eval: eval_less_than,
    },
    OperatorSpec {
        key: "LESSTHANOREQUAL",
        kind: OpKind::Compare,
        symbols: &["lte", "<="],
        precedence: 305,
        left: None,
        right: None,
        eval: eval_less_than_or_equal,
    },
    OperatorSpec {
        key: "GREATERTHAN",
        kind: OpKind::Compare,
        symbols: &["gt", ">"],
        precedence: 310,
        left: None,
        right: None,
        eval: eval_greater_than,
    },
    OperatorSpec {
        key: "GREATERTHANOREQUAL",
        kind: OpKind::Compare,
        symbols: &["gte", ">="],
        precedence: 315,
        left: None,
        right: None,
        eval: eval_greater_than_or_equal,
    },
    OperatorSpec {
        key: "EQUALS",
        kind: OpKind::Compare,
        symbols: &["eq", "=="],
        precedence: 320,
        left: None,
        right: None,
        eval: eval_equals,
    },
    OperatorSpec {
        key: "NOTEQUALS",
        kind: OpKind::Compare,
        symbols: &["neq", "<>", "!="],
        precedence: 325,
        left: None,
        right: None,
        eval: eval_not_equals,
    },
    OperatorSpec {
        key: "CONTAINS",
        kind: OpKind::Compare,
        symbols: &["contains", "~~"],
        precedence: 330,
        left: Some(containment_left),
        right: Some(containment_right),
        eval: eval_contains,
    },
    OperatorSpec {
        key: "DOESNOTCONTAIN",
        kind: OpKind::Compare,
        symbols: &["doesnotcontain", "!~~"],
        precedence: 330,
        left: Some(containment_left),
        right: Some(containment_right),
        eval: eval_does_not_contain,
    },
    OperatorSpec {
        key: "ENDSWITH",
        kind: OpKind::Compare,
        symbols: &["endswith"],
        precedence: 330,
        left: Some(containment_left),
        right: Some(containment_right),
        eval: eval_ends_with,
    },
    OperatorSpec {
        key: "STARTSWITH",
        kind: OpKind::Compare,
        symbols: &["startswith"],
        precedence: 330,
        left: Some(containment_left),
        right: Some(containment_right),
        eval: eval_starts_with,
    },
    OperatorSpec {
        key: "CONCATENATE",
        kind: OpKind::Consolidate,
        symbols: &["&"],
        precedence: 99999,
        left: Some(concat_operand),
        right: Some(concat_operand),
        eval: eval_concatenate,
    },
];

/// Look up a catalog entry by key.
pub fn spec(key: &str) -> Option<&'static OperatorSpec> {
    OPERATORS.iter().find(|o| o.key == key)
}

// ── Derived tables ───────────────────────────────────────────────────────────

/// Operator key plus the pattern that matches one of its symbols at the start
/// of the remaining input, followed by whitespace, a parenthesis, or
/// end-of-input.
pub type SymbolMatchers = Vec<(&'static str, Regex)>;

fn kind_bit(kind: OpKind) -> u8 {
    match kind {
        OpKind::Logic => 1,
        OpKind::Compare => 2,
        OpKind::Math => 4,
        OpKind::Consolidate => 8,
    }
}

fn matcher_memo() -> &'static RwLock<HashMap<u8, Arc<SymbolMatchers>>> {
    static MEMO: OnceLock<RwLock<HashMap<u8, Arc<SymbolMatchers>>>> = OnceLock::new();
    MEMO.get_or_init(|| RwLock::new(HashMap::new()))
}

fn groups_memo() -> &'static RwLock<Option<Arc<Vec<Vec<&'static str>>>>> {
    static MEMO: OnceLock<RwLock<Option<Arc<Vec<Vec<&'static str>>>>>> = OnceLock::new();
    MEMO.get_or_init(|| RwLock::new(None))
}

/// Compiled symbol matchers for the given kinds (all kinds when empty), in
/// catalog order. Memoised per kind set.
pub fn symbol_matchers(kinds: &[OpKind]) -> Arc<SymbolMatchers> {
    let mask = if kinds.is_empty() {
        0x0F
    } else {
        kinds.iter().fold(0u8, |m, k| m | kind_bit(*k))
    };

    if let Some(hit) = matcher_memo().read().expect("matcher memo poisoned").get(&mask) {
        return Arc::clone(hit);
    }

    let built: Arc<SymbolMatchers> = Arc::new(
        OPERATORS
            .iter()
            .filter(|o| kind_bit(o.kind) & mask != 0)
            .map(|o| (o.key, compile_matcher(o.symbols)))
            .collect(),
    );
    matcher_memo()
        .write()
        .expect("matcher memo poisoned")
        .insert(mask, Arc::clone(&built));
    built
}

fn compile_matcher(symbols: &[&str]) -> Regex {
    // Longest symbol first so the alternation is greedy
    let mut sorted: Vec<&str> = symbols.to_vec();
    sorted.sort_by_key(|s| std::cmp::Reverse(s.len()));
    let alternation: Vec<String> = sorted.iter().map(|s| regex::escape(s)).collect();
    Regex::new(&format!(r"(?i)^({})(?:[\s()]|$)", alternation.join("|")))
        .expect("operator symbols always compile")
}

/// Tie groups of operator keys, sorted by ascending precedence. Memoised.
pub fn precedence_groups() -> Arc<Vec<Vec<&'static str>>> {
    if let Some(hit) = groups_memo().read().expect("group memo poisoned").as_ref() {
        return Arc::clone(hit);
    }

    let mut ranks: Vec<u32> = OPERATORS.iter().map(|o| o.precedence).collect();
    ranks.sort_unstable();
    ranks.dedup();

    let groups: Vec<Vec<&'static str>> = ranks
        .iter()
        .map(|rank| {
            OPERATORS
                .iter()
                .filter(|o| o.precedence == *rank)
                .map(|o| o.key)
                .collect()
        })
        .collect();

    let built = Arc::new(groups);
    *groups_memo().write().expect("group memo poisoned") = Some(Arc::clone(&built));
    built
}

/// Drop the memoised derived tables; they rebuild on next use.
pub fn recycle() {
    matcher_memo()
        .write()
        .expect("matcher memo poisoned")
        .clear();
    *groups_memo().write().expect("group memo poisoned") = None;
}

// ── Argument validation ──────────────────────────────────────────────────────

/// Enforce exactly two operands and run the operator's per-side rules.
pub fn validate_args(key: &str, args: &[Value]) -> Result<(), ValidationError> {
    let op = match spec(key) {
        Some(op) => op,
        None => {
            return Err(ValidationError {
                message: format!("Unknown operator \"{}\".", key),
            })
        }
    };
    if args.len() != 2 {
        return Err(ValidationError {
            message: format!(
                "The operator {} requires exactly two operands, got {}.",
                key,
                args.len()
            ),
        });
    }
    if let Some(rule) = op.left {
        rule(Validator::named(
            args[0].clone(),
            format!("{} (left)", key),
        ))
        .into_result()?;
    }
    if let Some(rule) = op.right {
        rule(Validator::named(
            args[1].clone(),
            format!("{} (right)", key),
        ))
        .into_result()?;
    }
    Ok(())
}

/// Boolean-verdict form of [`validate_args`].
pub fn args_valid(key: &str, args: &[Value]) -> bool {
    validate_args(key, args).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_symbols_globally_unique() {
        let mut seen = std::collections::HashSet::new();
        for op in OPERATORS {
            for sym in op.symbols {
                assert!(seen.insert(sym.to_lowercase()), "duplicate symbol {}", sym);
            }
        }
    }

    #[test]
    fn test_precedence_groups_sorted_and_tied() {
        let groups = precedence_groups();
        assert_eq!(groups[0], vec!["EXPONENTIATION"]);
        assert_eq!(groups[1], vec!["DIVISION", "MODULO", "MULTIPLICATION"]);
        assert_eq!(groups[2], vec!["ADDITION", "SUBTRACTION"]);
        // Concatenation collapses last
        assert_eq!(groups.last().unwrap(), &vec!["CONCATENATE"]);
    }

    #[test]
    fn test_recycle_rebuilds_identically() {
        let before = precedence_groups();
        recycle();
        let after = precedence_groups();
        assert_eq!(*before, *after);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_symbol_matcher_requires_boundary() {
        let matchers = symbol_matchers(&[]);
        let or = matchers.iter().find(|(k, _)| *k == "OR").unwrap();
        assert!(or.1.is_match("or true"));
        assert!(or.1.is_match("OR true"));
        assert!(or.1.is_match("||("));
        assert!(or.1.is_match("or"));
        // A word that merely starts with the symbol is not an operator
        assert!(!or.1.is_match("orange"));
    }

    #[test]
    fn test_symbol_matcher_kind_filter() {
        let math_only = symbol_matchers(&[OpKind::Math]);
        assert!(math_only.iter().all(|(k, _)| spec(k).unwrap().kind == OpKind::Math));
        assert!(math_only.iter().any(|(k, _)| *k == "ADDITION"));
        assert!(!math_only.iter().any(|(k, _)| *k == "AND"));
    }

    #[test]
    fn test_math_coercion() {
        assert_eq!(eval_addition(&Value::Null, &num(3.0)), num(3.0));
        assert_eq!(eval_addition(&Value::Bool(true), &num(3.0)), num(4.0));
        assert_eq!(eval_exponentiation(&num(2.0), &num(10.0)), num(1024.0));
    }

    #[test]
    fn test_division_by_zero_is_nan() {
        assert!(eval_division(&num(5.0), &num(0.0))
            .as_f64()
            .unwrap()
            .is_nan());
        assert!(eval_modulo(&num(5.0), &Value::Null)
            .as_f64()
            .unwrap()
            .is_nan());
    }

    #[test]
    fn test_logic_truthiness() {
        assert_eq!(
            eval_and(&Value::string("x"), &num(1.0)),
            Value::Bool(true)
        );
        assert_eq!(eval_and(&Value::string(""), &num(1.0)), Value::Bool(false));
        assert_eq!(eval_or(&Value::Null, &Value::Bool(false)), Value::Bool(false));
    }

    #[test]
    fn test_comparison_cross_tag_is_false() {
        assert_eq!(
            eval_less_than(&num(1.0), &Value::string("2")),
            Value::Bool(false)
        );
        assert_eq!(
            eval_greater_than(&Value::string("b"), &Value::string("a")),
            Value::Bool(true)
        );
        // null == null satisfies the -or-equal comparisons
        assert_eq!(
            eval_less_than_or_equal(&Value::Null, &Value::Null),
            Value::Bool(true)
        );
        assert_eq!(
            eval_greater_than_or_equal(&Value::Null, &Value::Null),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_contains_family() {
        // Numeric left coerces to its decimal form
        assert_eq!(eval_contains(&num(12334.0), &num(3.0)), Value::Bool(true));
        assert_eq!(
            eval_contains(&Value::string("hello"), &Value::string("ell")),
            Value::Bool(true)
        );
        assert_eq!(
            eval_starts_with(&Value::string("hello"), &Value::string("he")),
            Value::Bool(true)
        );
        assert_eq!(
            eval_ends_with(&Value::string("hello"), &Value::string("lo")),
            Value::Bool(true)
        );
        // Both-null special cases
        assert_eq!(eval_contains(&Value::Null, &Value::Null), Value::Bool(true));
        assert_eq!(
            eval_does_not_contain(&Value::Null, &Value::Null),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_contains_on_arrays_uses_strict_equality() {
        let arr = Value::array(vec![num(1.0), Value::string("two")]);
        assert_eq!(eval_contains(&arr, &Value::string("two")), Value::Bool(true));
        assert_eq!(eval_contains(&arr, &num(2.0)), Value::Bool(false));
        // "1" does not strictly equal 1
        assert_eq!(eval_contains(&arr, &Value::string("1")), Value::Bool(false));
    }

    #[test]
    fn test_concatenate() {
        assert_eq!(
            eval_concatenate(&Value::string("hi"), &num(3.0)),
            Value::string("hi3")
        );
        assert_eq!(
            eval_concatenate(&Value::Null, &Value::Bool(true)),
            Value::string("true")
        );
    }

    #[test]
    fn test_validate_args() {
        assert!(validate_args("ADDITION", &[num(1.0), num(2.0)]).is_ok());
        assert!(validate_args("ADDITION", &[num(1.0)]).is_err());
        let err = validate_args("ADDITION", &[Value::string("x"), num(2.0)]).unwrap_err();
        assert!(err.message.contains("ADDITION (left)"));
        // Containment rejects an object on either side
        assert!(!args_valid(
            "CONTAINS",
            &[value_obj(), Value::string("x")]
        ));
    }

    fn value_obj() -> Value {
        Value::object(indexmap::IndexMap::new())
    }
}
