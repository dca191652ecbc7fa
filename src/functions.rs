// Built-in function catalog
// Specs pair a parameter contract with an evaluator; dispatch is keyed by the
// case-insensitive name recorded in the token tree.

use thiserror::Error;

use crate::validator::{ArgRule, TypeTag, ValidationError, Validator};
use crate::value::Value;

/// Function call errors.
#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("{name} takes {expected}, got {actual}")]
    ArgumentCount {
        name: &'static str,
        expected: String,
        actual: usize,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One declared parameter. A `spread` parameter absorbs any number of excess
/// arguments and must be the last in its list.
pub struct ParamValidator {
    pub name: &'static str,
    pub spread: bool,
    pub required: bool,
    pub rule: ArgRule,
}

/// The parameter contract of a function.
pub enum ParamSpec {
    /// Exactly zero arguments.
    NoArgs,
    /// Exactly `n` arguments, no per-argument validation.
    FixedCount(usize),
    /// One validator per argument; a trailing spread validator absorbs and
    /// checks any excess.
    TypedList(&'static [ParamValidator]),
    /// Any number of arguments, each checked against the same validator.
    SingleSpread(ParamValidator),
}

pub struct FunctionSpec {
    pub key: &'static str,
    pub params: ParamSpec,
    pub eval: fn(&[Value]) -> Value,
}

// ── Argument rules ───────────────────────────────────────────────────────────

fn arg_anything(v: Validator) -> Validator {
    v.anything()
}

fn arg_number_like(v: Validator) -> Validator {
    v.instance_of(&[TypeTag::Number, TypeTag::Boolean, TypeTag::Null])
}

fn arg_numeric_spread(v: Validator) -> Validator {
    v.instance_of(&[
        TypeTag::Number,
        TypeTag::Boolean,
        TypeTag::Null,
        TypeTag::Array,
    ])
}

fn arg_condition(v: Validator) -> Validator {
    v.required().boolean()
}

fn arg_text(v: Validator) -> Validator {
    v.instance_of(&[TypeTag::String, TypeTag::Number, TypeTag::Null])
}

fn arg_integer(v: Validator) -> Validator {
    v.integer()
}

fn arg_string_or_null(v: Validator) -> Validator {
    v.instance_of(&[TypeTag::String, TypeTag::Null])
}

fn arg_string(v: Validator) -> Validator {
    v.string()
}

fn arg_boolean(v: Validator) -> Validator {
    v.boolean()
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Flatten nested arrays up to `depth` levels for the numeric aggregations.
fn flatten(values: &[Value], depth: usize) -> Vec<Value> {
    let mut result = Vec::new();
    for value in values {
        match value {
            Value::Array(inner) if depth > 0 => {
                result.extend(flatten(inner, depth - 1));
            }
            other => result.push(other.clone()),
        }
    }
    result
}

/// Character count of the text form.
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn clamped_index(v: &Value) -> usize {
    v.coerce_number().max(0.0) as usize
}

// ── Evaluators ───────────────────────────────────────────────────────────────

fn eval_abs(args: &[Value]) -> Value {
    Value::Number(args[0].coerce_number().abs())
}

fn eval_average(args: &[Value]) -> Value {
    let nums: Vec<f64> = flatten(args, 3)
        .iter()
        .map(|v| v.coerce_number())
        .filter(|n| !n.is_nan())
        .collect();
    if nums.is_empty() {
        Value::Number(0.0)
    } else {
        Value::Number(nums.iter().sum::<f64>() / nums.len() as f64)
    }
}

fn eval_ceil(args: &[Value]) -> Value {
    Value::Number(args[0].coerce_number().ceil())
}

fn eval_count(args: &[Value]) -> Value {
    let count = flatten(args, 3)
        .iter()
        .filter(|v| !v.coerce_number().is_nan())
        .count();
    Value::Number(count as f64)
}

fn eval_floor(args: &[Value]) -> Value {
    Value::Number(args[0].coerce_number().floor())
}

fn eval_hello_world(_args: &[Value]) -> Value {
    Value::string("Hello world.")
}

fn eval_if(args: &[Value]) -> Value {
    if args[0].as_bool() == Some(true) {
        args[1].clone()
    } else {
        args[2].clone()
    }
}

fn eval_is_array(args: &[Value]) -> Value {
    Value::Bool(args[0].is_array())
}

fn eval_is_boolean(args: &[Value]) -> Value {
    Value::Bool(args[0].is_bool())
}

fn eval_is_date(args: &[Value]) -> Value {
    Value::Bool(args[0].is_date())
}

fn eval_is_object(args: &[Value]) -> Value {
    Value::Bool(args[0].is_object())
}

fn eval_is_empty(args: &[Value]) -> Value {
    Value::Bool(is_blank(&args[0]))
}

fn eval_is_not_empty(args: &[Value]) -> Value {
    Value::Bool(!is_blank(&args[0]))
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn eval_is_null(args: &[Value]) -> Value {
    Value::Bool(args[0].is_nullish())
}

fn eval_is_not_null(args: &[Value]) -> Value {
    Value::Bool(!args[0].is_nullish())
}

fn eval_left(args: &[Value]) -> Value {
    let text = args[0].text_form();
    let count = clamped_index(&args[1]);
    Value::string(text.chars().take(count).collect::<String>())
}

fn eval_len(args: &[Value]) -> Value {
    let n = match &args[0] {
        Value::Null | Value::Undefined => 0.0,
        Value::Array(items) => items.len() as f64,
        Value::String(s) => char_len(s) as f64,
        Value::Number(n) => char_len(&Value::Number(*n).text_form()) as f64,
        Value::Bool(_) => 1.0,
        Value::Date(d) => d.timestamp_millis() as f64,
        Value::Object(_) => 1.0,
    };
    Value::Number(n)
}

fn eval_mid(args: &[Value]) -> Value {
    let text = args[0].text_form();
    let start = clamped_index(&args[1]);
    let length = clamped_index(&args[2]);
    Value::string(text.chars().skip(start).take(length).collect::<String>())
}

fn eval_right(args: &[Value]) -> Value {
    let text = args[0].text_form();
    let count = clamped_index(&args[1]);
    let total = char_len(&text);
    Value::string(
        text.chars()
            .skip(total.saturating_sub(count))
            .collect::<String>(),
    )
}

fn eval_sqrt(args: &[Value]) -> Value {
    Value::Number(args[0].coerce_number().sqrt())
}

fn eval_sum(args: &[Value]) -> Value {
    let total: f64 = flatten(args, 3)
        .iter()
        .map(|v| v.coerce_number())
        .filter(|n| !n.is_nan())
        .sum();
    Value::Number(total)
}

fn eval_text_join(args: &[Value]) -> Value {
    let delimiter = args[0].text_form();
    let ignore_empty = args[1].as_bool() == Some(true);
    let parts: Vec<String> = args[2..]
        .iter()
        .filter(|v| {
            if !ignore_empty {
                return true;
            }
            !matches!(v, Value::Null | Value::Undefined)
                && v.as_str().map_or(true, |s| !s.is_empty())
        })
        .map(|v| v.text_form())
        .collect();
    Value::string(parts.join(&delimiter))
}

fn eval_truncate(args: &[Value]) -> Value {
    Value::Number(args[0].coerce_number().trunc())
}

// ── The catalog ──────────────────────────────────────────────────────────────

macro_rules! one {
    ($name:literal, $rule:path) => {
        ParamSpec::TypedList(&[ParamValidator {
            name: $name,
            spread: false,
            required: false,
            rule: $rule,
        }])
    };
}

pub static FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec {
        key: "ABS",
        params: one!("value", arg_number_like),
        eval: eval_abs,
    },
    FunctionSpec {
        key: "AVERAGE",
        params: ParamSpec::SingleSpread(ParamValidator {
            name: "values",
            spread: true,
            required: false,
            rule: arg_numeric_spread,
        }),
        eval: eval_average,
    },
    FunctionSpec {
        key: "CEIL",
        params: one!("value", arg_number_like),
        eval: eval_ceil,
    },
    FunctionSpec {
        key: "COUNT",
        params: ParamSpec::SingleSpread(ParamValidator {
            name: "values",
            spread: true,
            required: false,
            rule: arg_anything,
        }),
        eval: eval_count,
    },
    FunctionSpec {
        key: "FLOOR",
        params: one!("value", arg_number_like),
        eval: eval_floor,
    },
    FunctionSpec {
        key: "HELLOWORLD",
        params: ParamSpec::NoArgs,
        eval: eval_hello_world,
    },
    FunctionSpec {
        key: "IF",
        params: ParamSpec::TypedList(&[
            ParamValidator {
                name: "condition",
                spread: false,
                required: true,
                rule: arg_condition,
            },
            ParamValidator {
                name: "then",
                spread: false,
                required: false,
                rule: arg_anything,
            },
            ParamValidator {
                name: "else",
                spread: false,
                required: false,
                rule: arg_anything,
            },
        ]),
        eval: eval_if,
    },
    FunctionSpec {
        key: "ISARRAY",
        params: ParamSpec::FixedCount(1),
        eval: eval_is_array,
    },
    FunctionSpec {
        key: "ISBOOLEAN",
        params: ParamSpec::FixedCount(1),
        eval: eval_is_boolean,
    },
    FunctionSpec {
        key: "ISDATE",
        params: ParamSpec::FixedCount(1),
        eval: eval_is_date,
    },
    FunctionSpec {
        key: "ISEMPTY",
        params: one!("value", arg_string_or_null),
        eval: eval_is_empty,
    },
    FunctionSpec {
        key: "ISNOTEMPTY",
        params: one!("value", arg_string_or_null),
        eval: eval_is_not_empty,
    },
    FunctionSpec {
        key: "ISNOTNULL",
        params: ParamSpec::FixedCount(1),
        eval: eval_is_not_null,
    },
    FunctionSpec {
        key: "ISNULL",
        params: ParamSpec::FixedCount(1),
        eval: eval_is_null,
    },
    FunctionSpec {
        key: "ISOBJECT",
        params: ParamSpec::FixedCount(1),
        eval: eval_is_object,
    },
    FunctionSpec {
        key: "LEFT",
        params: ParamSpec::TypedList(&[
            ParamValidator {
                name: "text",
                spread: false,
                required: false,
                rule: arg_text,
            },
            ParamValidator {
                name: "count",
                spread: false,
                required: false,
                rule: arg_integer,
            },
        ]),
        eval: eval_left,
    },
    FunctionSpec {
        key: "LEN",
        params: ParamSpec::FixedCount(1),
        eval: eval_len,
    },
    FunctionSpec {
        key: "MID",
        params: ParamSpec::TypedList(&[
            ParamValidator {
                name: "text",
                spread: false,
                required: false,
                rule: arg_text,
            },
            ParamValidator {
                name: "start",
                spread: false,
                required: false,
                rule: arg_integer,
            },
            ParamValidator {
                name: "length",
                spread: false,
                required: false,
                rule: arg_integer,
            },
        ]),
        eval: eval_mid,
    },
    FunctionSpec {
        key: "RIGHT",
        params: ParamSpec::TypedList(&[
            ParamValidator {
                name: "text",
                spread: false,
                required: false,
                rule: arg_text,
            },
            ParamValidator {
                name: "count",
                spread: false,
                required: false,
                rule: arg_integer,
            },
        ]),
        eval: eval_right,
    },
    FunctionSpec {
        key: "SQRT",
        params: one!("value", arg_number_like),
        eval: eval_sqrt,
    },
    FunctionSpec {
        key: "SUM",
        params: ParamSpec::SingleSpread(ParamValidator {
            name: "values",
            spread: true,
            required: false,
            rule: arg_anything,
        }),
        eval: eval_sum,
    },
    FunctionSpec {
        key: "TEXTJOIN",
        params: ParamSpec::TypedList(&[
            ParamValidator {
                name: "delimiter",
                spread: false,
                required: false,
                rule: arg_string,
            },
            ParamValidator {
                name: "ignore_empty",
                spread: false,
                required: false,
                rule: arg_boolean,
            },
            ParamValidator {
                name: "values",
                spread: true,
                required: false,
                rule: arg_anything,
            },
        ]),
        eval: eval_text_join,
    },
    FunctionSpec {
        key: "TRUNCATE",
        params: one!("value", arg_number_like),
        eval: eval_truncate,
    },
];

/// Case-insensitive catalog lookup.
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|f| f.key.eq_ignore_ascii_case(name))
}

pub fn is_known(name: &str) -> bool {
    lookup(name).is_some()
}

// ── Call validation ──────────────────────────────────────────────────────────

/// Check arity and run every per-argument rule. The evaluator invokes this
/// before dispatch; a failure names the function and the argument.
pub fn validate_call(spec: &FunctionSpec, args: &[Value]) -> Result<(), FunctionError> {
    match &spec.params {
        ParamSpec::NoArgs => {
            if !args.is_empty() {
                return Err(FunctionError::ArgumentCount {
                    name: spec.key,
                    expected: "no arguments".to_string(),
                    actual: args.len(),
                });
            }
        }
        ParamSpec::FixedCount(n) => {
            if args.len() != *n {
                return Err(FunctionError::ArgumentCount {
                    name: spec.key,
                    expected: format!("exactly {} argument(s)", n),
                    actual: args.len(),
                });
            }
        }
        ParamSpec::TypedList(params) => {
            if let Some(misplaced) = params[..params.len().saturating_sub(1)]
                .iter()
                .position(|p| p.spread)
            {
                panic!(
                    "{}: spread parameter \"{}\" must be last",
                    spec.key, params[misplaced].name
                );
            }
            let has_spread = params.last().map_or(false, |p| p.spread);
            if has_spread {
                let min = params.len() - 1;
                if args.len() < min {
                    return Err(FunctionError::ArgumentCount {
                        name: spec.key,
                        expected: format!("at least {} argument(s)", min),
                        actual: args.len(),
                    });
                }
            } else if args.len() != params.len() {
                return Err(FunctionError::ArgumentCount {
                    name: spec.key,
                    expected: format!("exactly {} argument(s)", params.len()),
                    actual: args.len(),
                });
            }
            for (i, arg) in args.iter().enumerate() {
                let param = &params[i.min(params.len() - 1)];
                check_arg(spec.key, i, param, arg)?;
            }
        }
        ParamSpec::SingleSpread(param) => {
            if param.required && args.is_empty() {
                return Err(FunctionError::ArgumentCount {
                    name: spec.key,
                    expected: "at least 1 argument".to_string(),
                    actual: 0,
                });
            }
            for (i, arg) in args.iter().enumerate() {
                check_arg(spec.key, i, param, arg)?;
            }
        }
    }
    Ok(())
}

fn check_arg(
    key: &'static str,
    index: usize,
    param: &ParamValidator,
    arg: &Value,
) -> Result<(), FunctionError> {
    let label = format!("{} argument {} ({})", key, index + 1, param.name);
    (param.rule)(Validator::named(arg.clone(), label)).into_result()?;
    Ok(())
}
