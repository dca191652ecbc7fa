// Chainable value validation
// One session carries a value, an optional name for messages, and the first failure.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::value::Value;

/// A validation failure, already formatted with the session's name prefix.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

/// Signature of the per-argument rules carried by operator and function specs.
pub type ArgRule = fn(Validator) -> Validator;

/// Type tags accepted by [`Validator::instance_of`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeTag {
    Boolean,
    Number,
    String,
    Object,
    Array,
    Date,
    Null,
}

impl TypeTag {
    fn matches(self, value: &Value) -> bool {
        match self {
            TypeTag::Boolean => value.is_bool(),
            TypeTag::Number => value.is_number(),
            TypeTag::String => value.is_string(),
            TypeTag::Object => value.is_object(),
            TypeTag::Array => value.is_array(),
            TypeTag::Date => value.is_date(),
            TypeTag::Null => value.is_null(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            TypeTag::Boolean => "boolean",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Object => "object",
            TypeTag::Array => "array",
            TypeTag::Date => "date",
            TypeTag::Null => "null",
        }
    }
}

/// A chainable validation session.
///
/// Predicates are applied in order; the first failure is recorded and every
/// later predicate becomes a no-op. [`Validator::allowed`] can short-circuit
/// the rest of the chain into success. Terminal operations read the verdict,
/// format the failure message, or convert it into a [`ValidationError`].
///
/// ```
/// use calku::validator::Validator;
/// use calku::value::Value;
///
/// let verdict = Validator::new(Value::Number(4.0))
///     .required()
///     .number()
///     .range(Some(1.0), Some(10.0))
///     .is_valid();
/// assert!(verdict);
/// ```
pub struct Validator {
    value: Value,
    name: Option<String>,
    bypassed: bool,
    failure: Option<String>,
}

impl Validator {
    pub fn new(value: Value) -> Self {
        Validator {
            value,
            name: None,
            bypassed: false,
            failure: None,
        }
    }

    pub fn named(value: Value, name: impl Into<String>) -> Self {
        Validator {
            value,
            name: Some(name.into()),
            bypassed: false,
            failure: None,
        }
    }

    #[inline]
    fn halted(&self) -> bool {
        self.failure.is_some() || self.bypassed
    }

    fn fail(mut self, sentence: String) -> Self {
        if self.failure.is_none() {
            self.failure = Some(sentence);
        }
        self
    }

    // ── Predicates ───────────────────────────────────────────────────────────

    /// Rejects Null, Undefined, whitespace-only strings, and empty arrays.
    pub fn required(self) -> Self {
        if self.halted() {
            return self;
        }
        let missing = match &self.value {
            Value::Null | Value::Undefined => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        };
        if missing {
            self.fail("is required.".to_string())
        } else {
            self
        }
    }

    /// Always passes.
    pub fn anything(self) -> Self {
        self
    }

    /// Accepts the value when it matches any tag in `tags`. When `tags` pairs
    /// "array" with other tags, every element of an array value must itself
    /// satisfy the full list, recursively.
    ///
    /// An empty tag list is a definition error and panics.
    pub fn instance_of(self, tags: &[TypeTag]) -> Self {
        if tags.is_empty() {
            panic!("instance_of requires at least one type tag");
        }
        if self.halted() {
            return self;
        }
        if satisfies(tags, &self.value) {
            self
        } else {
            let labels: Vec<&str> = tags.iter().map(|t| t.label()).collect();
            self.fail(format!("must be of type: {}.", labels.join(", ")))
        }
    }

    pub fn array(self) -> Self {
        self.tag_check(TypeTag::Array, "must be an array.")
    }

    pub fn boolean(self) -> Self {
        self.tag_check(TypeTag::Boolean, "must be a boolean.")
    }

    pub fn number(self) -> Self {
        self.tag_check(TypeTag::Number, "must be a number.")
    }

    pub fn string(self) -> Self {
        self.tag_check(TypeTag::String, "must be a string.")
    }

    /// Rejects arrays; only plain objects pass.
    pub fn object(self) -> Self {
        self.tag_check(TypeTag::Object, "must be an object.")
    }

    pub fn date(self) -> Self {
        self.tag_check(TypeTag::Date, "must be a date.")
    }

    /// A Number whose floor equals itself.
    pub fn integer(self) -> Self {
        if self.halted() {
            return self;
        }
        match self.value.as_f64() {
            Some(n) if n.is_finite() && n.floor() == n => self,
            _ => self.fail("must be an integer.".to_string()),
        }
    }

    fn tag_check(self, tag: TypeTag, sentence: &str) -> Self {
        if self.halted() {
            return self;
        }
        if tag.matches(&self.value) {
            self
        } else {
            self.fail(sentence.to_string())
        }
    }

    /// Inclusive length bounds for strings (characters) and arrays. `None`
    /// leaves that side unbounded.
    pub fn length(self, min: Option<usize>, max: Option<usize>) -> Self {
        if self.halted() {
            return self;
        }
        let len = match &self.value {
            Value::String(s) => s.chars().count(),
            Value::Array(a) => a.len(),
            _ => {
                return self.fail("must be a string or an array to have a length.".to_string());
            }
        };
        if min.map_or(false, |m| len < m) || max.map_or(false, |m| len > m) {
            let sentence = match (min, max) {
                (Some(a), Some(b)) => format!("must have a length between {} and {}.", a, b),
                (Some(a), None) => format!("must have a length of at least {}.", a),
                (None, Some(b)) => format!("must have a length of at most {}.", b),
                (None, None) => unreachable!(),
            };
            self.fail(sentence)
        } else {
            self
        }
    }

    /// Inclusive numeric bounds. `None` leaves that side unbounded.
    pub fn range(self, min: Option<f64>, max: Option<f64>) -> Self {
        if self.halted() {
            return self;
        }
        let n = match self.value.as_f64() {
            Some(n) => n,
            None => return self.fail("must be a number to be compared to a range.".to_string()),
        };
        if min.map_or(false, |m| n < m) || max.map_or(false, |m| n > m) {
            let sentence = match (min, max) {
                (Some(a), Some(b)) => format!("must be between {} and {}.", a, b),
                (Some(a), None) => format!("must be at least {}.", a),
                (None, Some(b)) => format!("must be at most {}.", b),
                (None, None) => unreachable!(),
            };
            self.fail(sentence)
        } else {
            self
        }
    }

    /// The value must be a string matching `pattern`. An invalid pattern is a
    /// definition error and panics.
    pub fn regexp(self, pattern: &str) -> Self {
        if self.halted() {
            return self;
        }
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => panic!("invalid validation pattern {:?}: {}", pattern, e),
        };
        match self.value.as_str() {
            Some(s) if re.is_match(s) => self,
            _ => self.fail(format!("must match the pattern {}.", pattern)),
        }
    }

    pub fn email_address(self) -> Self {
        if self.halted() {
            return self;
        }
        match self.value.as_str() {
            Some(s) if email_regex().is_match(s) => self,
            _ => self.fail("must be a valid email address.".to_string()),
        }
    }

    /// North-American phone shape; `allow_extension` also accepts a trailing
    /// "x1234" / "ext. 1234" suffix.
    pub fn phone_number(self, allow_extension: bool) -> Self {
        if self.halted() {
            return self;
        }
        let re = if allow_extension {
            phone_ext_regex()
        } else {
            phone_regex()
        };
        match self.value.as_str() {
            Some(s) if re.is_match(s) => self,
            _ => self.fail("must be a valid phone number.".to_string()),
        }
    }

    /// US ZIP: five digits, or five-dash-four.
    pub fn postal_code(self) -> Self {
        if self.halted() {
            return self;
        }
        match self.value.as_str() {
            Some(s) if postal_regex().is_match(s) => self,
            _ => self.fail("must be a valid postal code.".to_string()),
        }
    }

    /// Invokes `check` with the carried value; the callback returns "" for
    /// success or the failure sentence.
    pub fn custom(self, check: impl Fn(&Value) -> String) -> Self {
        if self.halted() {
            return self;
        }
        let sentence = check(&self.value);
        if sentence.is_empty() {
            self
        } else {
            self.fail(sentence)
        }
    }

    /// When the value strictly equals any listed value, the rest of the chain
    /// is bypassed and the overall verdict is success.
    pub fn allowed(mut self, values: &[Value]) -> Self {
        if self.halted() {
            return self;
        }
        if values.iter().any(|v| *v == self.value) {
            self.bypassed = true;
        }
        self
    }

    // ── Reset ────────────────────────────────────────────────────────────────

    /// Clears the failure state and the bypass flag.
    pub fn reset(mut self) -> Self {
        self.failure = None;
        self.bypassed = false;
        self
    }

    /// Clears the failure state and replaces the carried value.
    pub fn reset_value(mut self, value: Value) -> Self {
        self.value = value;
        self.reset()
    }

    /// Clears the failure state and replaces the carried name.
    pub fn reset_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.reset()
    }

    // ── Terminals ────────────────────────────────────────────────────────────

    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }

    /// The first failure, prefixed with `The value [for "<name>"] `.
    pub fn message(&self) -> Option<String> {
        self.failure.as_ref().map(|sentence| match &self.name {
            Some(name) => format!("The value for \"{}\" {}", name, sentence),
            None => format!("The value {}", sentence),
        })
    }

    /// Converts the first failure into an error.
    pub fn into_result(self) -> Result<(), ValidationError> {
        match self.message() {
            Some(message) => Err(ValidationError { message }),
            None => Ok(()),
        }
    }
}

fn satisfies(tags: &[TypeTag], value: &Value) -> bool {
    if let Value::Array(items) = value {
        if !tags.contains(&TypeTag::Array) {
            return false;
        }
        if tags.len() == 1 {
            return true;
        }
        // Mixed list: every element must satisfy the full list, recursively
        return items.iter().all(|item| satisfies(tags, item));
    }
    tags.iter().any(|t| t.matches(value))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)*$",
        )
        .unwrap()
    })
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}$").unwrap()
    })
}

fn phone_ext_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}(?:\s*(?:x|ext\.?)\s*\d{1,6})?$")
            .unwrap()
    })
}

fn postal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{5}(?:-\d{4})?$").unwrap())
}
