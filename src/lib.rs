// calku - spreadsheet-style expression engine
// Copyright (c) 2026 calku contributors
// Licensed under the MIT License

//! # calku
//!
//! An embedded expression engine in the style of spreadsheet formulas.
//! Expressions combine literals, typed property references into a target
//! object, binary operators, parenthesised grouping, line comments, and named
//! function calls, and evaluate to a typed [`Value`].
//!
//! The pipeline: source text is lexed into a nested token tree (literals
//! already promoted to typed values, with time-zone-aware date handling),
//! then the evaluator resolves property references against the supplied
//! target, dispatches functions, and collapses operator chains by precedence.
//!
//! Compile once, evaluate many times:
//!
//! ```
//! use calku::{Expression, Value};
//!
//! let expr = Expression::new("{price} * {quantity}");
//! let order = Value::from(serde_json::json!({"price": 12.5, "quantity": 4}));
//! assert_eq!(expr.value(&order).unwrap(), Value::Number(50.0));
//! ```
//!
//! Modules:
//!
//! - `lexer` - source text to nested token tree
//! - `value_parser` - naked-lexeme promotion (numbers, booleans, dates, ...)
//! - `evaluator` - tree walking, function dispatch, operator collapse
//! - `operators` / `functions` - the two symbol catalogs
//! - `validator` - chainable argument validation
//! - `path` - dot/colon property-path traversal
//! - `datetime` - date grammars and IANA zone resolution

pub mod datetime;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod operators;
pub mod path;
pub mod token;
pub mod validator;
pub mod value;
pub mod value_parser;

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::evaluator::EvalError;
use crate::lexer::SyntaxError;
use crate::token::Token;

pub use crate::datetime::ZoneError;
pub use crate::path::PathError;
pub use crate::validator::{ValidationError, Validator};
pub use crate::value::Value;

/// Any failure an expression can produce: lexing, evaluation, path
/// traversal, or time-zone resolution.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Zone(#[from] ZoneError),
}

/// A reusable expression: source text plus an optional IANA time zone, with
/// the lexed token tree cached lazily.
///
/// [`Expression::value`] and [`Expression::values`] never panic; every
/// failure comes back as an `Err` value. Reassigning the source text or the
/// time zone invalidates the cached tree.
///
/// The cache uses interior mutability, so an `Expression` is not `Sync`;
/// sharing one across threads requires external synchronisation by design.
///
/// ```
/// use calku::{Expression, Value};
///
/// let mut expr = Expression::new("{n} + 1");
/// let target = Value::from(serde_json::json!({"n": 41}));
/// assert_eq!(expr.value(&target).unwrap(), Value::Number(42.0));
///
/// expr.set_expression("{n} * 2");
/// assert_eq!(expr.value(&target).unwrap(), Value::Number(82.0));
/// ```
pub struct Expression {
    source: Option<String>,
    zone: Option<String>,
    cache: RefCell<Option<Rc<Vec<Token>>>>,
}

impl Expression {
    /// An expression evaluated in the default GMT/UTC zone.
    pub fn new(source: impl Into<String>) -> Self {
        Expression {
            source: Some(source.into()),
            zone: None,
            cache: RefCell::new(None),
        }
    }

    /// An expression whose offset-free date literals are interpreted in the
    /// named IANA zone (e.g. `Pacific/Honolulu`).
    pub fn with_time_zone(source: impl Into<String>, zone: impl Into<String>) -> Self {
        Expression {
            source: Some(source.into()),
            zone: Some(zone.into()),
            cache: RefCell::new(None),
        }
    }

    pub fn expression(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Replace the source text; the cached tree is dropped.
    pub fn set_expression(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
        self.cache.replace(None);
    }

    pub fn time_zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    /// Replace the time zone; the cached tree is dropped.
    pub fn set_time_zone(&mut self, zone: impl Into<String>) {
        self.zone = Some(zone.into());
        self.cache.replace(None);
    }

    /// The distinct property-reference paths in the expression, in order of
    /// first appearance. Syntax errors propagate.
    pub fn properties(&self) -> Result<Vec<String>, Error> {
        Ok(token::property_paths(&self.tree()?))
    }

    /// Evaluate once against `target`. Lexing and evaluation failures are
    /// returned, never thrown.
    pub fn value(&self, target: &Value) -> Result<Value, Error> {
        let tree = self.tree()?;
        Ok(evaluator::evaluate(&tree, target)?)
    }

    /// Map [`Expression::value`] over a sequence of targets, lexing only
    /// once.
    pub fn values(&self, targets: &[Value]) -> Vec<Result<Value, Error>> {
        targets.iter().map(|t| self.value(t)).collect()
    }

    /// One-shot evaluation against a single target.
    pub fn evaluate(source: &str, target: &Value) -> Result<Value, Error> {
        Expression::new(source).value(target)
    }

    /// One-shot evaluation with a named time zone.
    pub fn evaluate_with_zone(source: &str, target: &Value, zone: &str) -> Result<Value, Error> {
        Expression::with_time_zone(source, zone).value(target)
    }

    /// One-shot evaluation against many targets.
    pub fn evaluate_many(source: &str, targets: &[Value]) -> Vec<Result<Value, Error>> {
        Expression::new(source).values(targets)
    }

    /// Lex (or reuse) the token tree. An unset source lexes to an empty tree,
    /// which evaluates to Undefined.
    fn tree(&self) -> Result<Rc<Vec<Token>>, Error> {
        if let Some(tree) = self.cache.borrow().as_ref() {
            return Ok(Rc::clone(tree));
        }

        let offset = match &self.zone {
            Some(name) => datetime::resolve_zone(name)?,
            None => datetime::utc(),
        };
        let tokens = match &self.source {
            Some(source) => lexer::lex(source, offset)?,
            None => Vec::new(),
        };

        let tree = Rc::new(tokens);
        *self.cache.borrow_mut() = Some(Rc::clone(&tree));
        Ok(tree)
    }
}

/// Resolve a dot/colon property path directly against a target.
///
/// ```
/// use calku::{value_at, Value};
///
/// let target = Value::from(serde_json::json!({"xs": ["a", "b"]}));
/// assert_eq!(value_at(&target, "xs:1").unwrap(), Value::from("b"));
/// ```
pub fn value_at(target: &Value, path: &str) -> Result<Value, Error> {
    Ok(path::resolve(target, path)?)
}
