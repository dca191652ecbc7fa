// Expression evaluator
// Walks the token tree depth-first, resolves property references against the
// target, dispatches function calls, and collapses operator chains by
// precedence group.

use thiserror::Error;

use crate::functions::{self, FunctionError};
use crate::operators::{self, OperatorSpec};
use crate::path::{self, PathError};
use crate::token::Token;
use crate::validator::ValidationError;
use crate::value::Value;

/// Evaluation failures.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("operator {symbol} is missing its {side} operand")]
    MissingOperand { symbol: String, side: &'static str },

    #[error("missing operator between values")]
    MissingOperator,

    #[error("unknown operator \"{0}\"")]
    UnknownOperator(String),

    #[error("unknown function \"{0}\"")]
    UnknownFunction(String),

    #[error("structural token at index {index} has no value")]
    StructuralToken { index: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// One slot of the working list during operator collapse.
enum Cell {
    Op(&'static OperatorSpec),
    Val(Value),
}

/// Evaluate a lexed token tree against `target`. Intermediate values are
/// local to the call; the tree itself is never mutated, so the same tree can
/// be applied to any number of targets.
pub fn evaluate(tokens: &[Token], target: &Value) -> Result<Value, EvalError> {
    eval_level(tokens, target)
}

fn eval_level(tokens: &[Token], target: &Value) -> Result<Value, EvalError> {
    // Depth-first value resolution; comments drop out here
    let mut cells: Vec<Cell> = Vec::new();
    for token in tokens {
        match token {
            Token::Comment { .. } => {}
            Token::Operator { key, .. } => {
                let op = operators::spec(key)
                    .ok_or_else(|| EvalError::UnknownOperator(key.to_string()))?;
                cells.push(Cell::Op(op));
            }
            Token::Literal { value, .. } => cells.push(Cell::Val(value.clone())),
            Token::PropertyRef { path, .. } => {
                cells.push(Cell::Val(path::resolve(target, path)?));
            }
            Token::Group { children, .. } => {
                cells.push(Cell::Val(eval_level(children, target)?));
            }
            Token::Func { name, children, .. } => {
                cells.push(Cell::Val(eval_func(name, children, target)?));
            }
            structural => {
                return Err(EvalError::StructuralToken {
                    index: structural.start(),
                });
            }
        }
    }

    if cells.is_empty() {
        return Ok(Value::Undefined);
    }
    // Single-token fast path
    if cells.len() == 1 {
        return match cells.remove(0) {
            Cell::Val(value) => Ok(value),
            Cell::Op(op) => Err(EvalError::MissingOperand {
                symbol: op.key.to_string(),
                side: "left",
            }),
        };
    }

    collapse(cells)
}

/// Collect each argument Group's value, validate the call, and dispatch.
fn eval_func(name: &str, children: &[Token], target: &Value) -> Result<Value, EvalError> {
    let spec =
        functions::lookup(name).ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;

    let mut args = Vec::with_capacity(children.len());
    for child in children {
        if child.is_comment() {
            continue;
        }
        match child {
            Token::Group { children, .. } => args.push(eval_level(children, target)?),
            other => args.push(eval_level(std::slice::from_ref(other), target)?),
        }
    }

    functions::validate_call(spec, &args)?;
    Ok((spec.eval)(&args))
}

/// Sweep the working list once per precedence group, left to right. Every
/// application restarts the sweep from position 0 so that same-rank operators
/// stay left-associative.
fn collapse(mut cells: Vec<Cell>) -> Result<Value, EvalError> {
    for group in operators::precedence_groups().iter() {
        'sweep: loop {
            for i in 0..cells.len() {
                let op = match &cells[i] {
                    Cell::Op(op) if group.contains(&op.key) => *op,
                    _ => continue,
                };

                if i == 0 {
                    return Err(EvalError::MissingOperand {
                        symbol: op.key.to_string(),
                        side: "left",
                    });
                }
                if i == cells.len() - 1 {
                    return Err(EvalError::MissingOperand {
                        symbol: op.key.to_string(),
                        side: "right",
                    });
                }
                let left = match &cells[i - 1] {
                    Cell::Val(v) => v.clone(),
                    Cell::Op(_) => {
                        return Err(EvalError::MissingOperand {
                            symbol: op.key.to_string(),
                            side: "left",
                        });
                    }
                };
                let right = match &cells[i + 1] {
                    Cell::Val(v) => v.clone(),
                    Cell::Op(_) => {
                        return Err(EvalError::MissingOperand {
                            symbol: op.key.to_string(),
                            side: "right",
                        });
                    }
                };

                operators::validate_args(op.key, &[left.clone(), right.clone()])?;
                let result = (op.eval)(&left, &right);
                cells.splice(i - 1..=i + 1, [Cell::Val(result)]);
                continue 'sweep;
            }
            break;
        }
    }

    let mut values = cells.into_iter().filter_map(|cell| match cell {
        Cell::Val(v) => Some(v),
        Cell::Op(_) => None,
    });
    match (values.next(), values.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(EvalError::MissingOperator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime;
    use crate::lexer::lex;
    use crate::value;

    fn eval(source: &str) -> Result<Value, EvalError> {
        let tokens = lex(source, datetime::utc()).unwrap();
        evaluate(&tokens, &Value::Undefined)
    }

    fn eval_with(source: &str, target: &Value) -> Result<Value, EvalError> {
        let tokens = lex(source, datetime::utc()).unwrap();
        evaluate(&tokens, target)
    }

    #[test]
    fn test_order_of_operations() {
        assert_eq!(eval("10 + 5 - 12 / 3 * 2").unwrap(), value!(7.0));
        assert_eq!(eval("2 * 3 ^ 2").unwrap(), value!(18.0));
    }

    #[test]
    fn test_grouping() {
        assert_eq!(eval("(15 - 2 * 4) + (1 + 1 / 4)").unwrap(), value!(8.25));
    }

    #[test]
    fn test_tie_groups_are_left_associative() {
        assert_eq!(eval("100 / 10 / 5").unwrap(), value!(2.0));
        assert_eq!(eval("10 - 4 - 3").unwrap(), value!(3.0));
        assert_eq!(eval("20 / 2 * 5").unwrap(), value!(50.0));
    }

    #[test]
    fn test_logic_chain() {
        assert_eq!(
            eval("false AND true OR (true AND false)").unwrap(),
            value!(false)
        );
        assert_eq!(eval("true or false and false").unwrap(), value!(true));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("1 < 2").unwrap(), value!(true));
        assert_eq!(eval("2 lt 1").unwrap(), value!(false));
        assert_eq!(eval("3 gte 3").unwrap(), value!(true));
        assert_eq!(eval("1 <> 2").unwrap(), value!(true));
        // Cross-tag comparison is false, not an error
        assert_eq!(eval("1 < \"2\"").unwrap(), value!(false));
    }

    #[test]
    fn test_function_dispatch() {
        assert_eq!(eval("SUM(SUM(1, 3), 4, 8, 5)").unwrap(), value!(21.0));
        assert_eq!(eval("IF(true, \"yes\", \"no\")").unwrap(), value!("yes"));
        assert_eq!(eval("HELLOWORLD()").unwrap(), value!("Hello world."));
    }

    #[test]
    fn test_function_arguments_are_expressions() {
        assert_eq!(eval("ABS(1 - 5)").unwrap(), value!(4.0));
        assert_eq!(eval("IF(2 > 1, 10 + 1, 0)").unwrap(), value!(11.0));
    }

    #[test]
    fn test_property_resolution() {
        let target = value!({"num": 334455.0, "nested": {"x": 2.0}});
        assert_eq!(eval_with("{num} + 3", &target).unwrap(), value!(334458.0));
        assert_eq!(
            eval_with("{nested.x} * {nested.x}", &target).unwrap(),
            value!(4.0)
        );
        // A missing property is Undefined and equals nothing
        assert_eq!(eval_with("{gone} == 1", &target).unwrap(), value!(false));
    }

    #[test]
    fn test_concatenation() {
        assert_eq!(
            eval("\"hi\" & \" there x\" & 3 & true").unwrap(),
            value!("hi there x3true")
        );
        assert_eq!(eval("\"n:\" & null").unwrap(), value!("n:"));
        // Concatenation binds after math
        assert_eq!(eval("\"v=\" & 1 + 2").unwrap(), value!("v=3"));
    }

    #[test]
    fn test_comments_are_ignored() {
        assert_eq!(eval("1 + 2 // plus\n").unwrap(), value!(3.0));
        assert_eq!(eval("SUM(1, // first\n 2)\n").unwrap(), value!(3.0));
    }

    #[test]
    fn test_empty_is_undefined() {
        assert_eq!(eval("").unwrap(), Value::Undefined);
        assert_eq!(eval("  ").unwrap(), Value::Undefined);
    }

    #[test]
    fn test_single_token_fast_path() {
        assert_eq!(eval("42").unwrap(), value!(42.0));
        assert_eq!(eval("(42)").unwrap(), value!(42.0));
        assert_eq!(eval("\"x\"").unwrap(), value!("x"));
    }

    #[test]
    fn test_missing_operands() {
        assert!(matches!(
            eval("+ 1"),
            Err(EvalError::MissingOperand { side: "left", .. })
        ));
        assert!(matches!(
            eval("1 +"),
            Err(EvalError::MissingOperand { side: "right", .. })
        ));
        assert!(matches!(
            eval("1 + * 2"),
            Err(EvalError::MissingOperand { .. })
        ));
    }

    #[test]
    fn test_adjacent_values_need_an_operator() {
        assert!(matches!(eval("1 2"), Err(EvalError::MissingOperator)));
    }

    #[test]
    fn test_operand_validation_failures() {
        let err = eval("\"a\" * 2").unwrap_err();
        assert!(err.to_string().contains("MULTIPLICATION (left)"));
        let err = eval("2 + \"a\"").unwrap_err();
        assert!(err.to_string().contains("ADDITION (right)"));
    }

    #[test]
    fn test_arity_failure_skips_function_body() {
        let err = eval("IF(true, 1)").unwrap_err();
        assert!(err.to_string().contains("IF"));
    }

    #[test]
    fn test_division_by_zero_yields_nan() {
        assert!(eval("1 / 0").unwrap().as_f64().unwrap().is_nan());
        assert!(eval("1 % 0").unwrap().as_f64().unwrap().is_nan());
    }

    #[test]
    fn test_null_coercion_in_math() {
        assert_eq!(eval("null + 3").unwrap(), value!(3.0));
        assert_eq!(eval("true + true").unwrap(), value!(2.0));
    }

    #[test]
    fn test_repeated_evaluation_is_deterministic() {
        let tokens = lex("{a} + 1", datetime::utc()).unwrap();
        let t1 = value!({"a": 1.0});
        let t2 = value!({"a": 10.0});
        assert_eq!(evaluate(&tokens, &t1).unwrap(), value!(2.0));
        assert_eq!(evaluate(&tokens, &t2).unwrap(), value!(11.0));
        // No state leaks between targets
        assert_eq!(evaluate(&tokens, &t1).unwrap(), value!(2.0));
    }
}
