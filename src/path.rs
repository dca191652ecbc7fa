// Property path resolution
// Dot segments name object keys; colon segments index arrays and strings.

use thiserror::Error;

use crate::value::Value;

/// Path validation and traversal errors.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("property path is empty")]
    Empty,

    #[error("property path \"{path}\" contains an empty segment")]
    EmptySegment { path: String },

    #[error("property path segment \"{segment}\" is not allowed")]
    ForbiddenSegment { segment: String },

    #[error("property path segment \"{segment}\" is not a valid index")]
    BadIndex { segment: String },
}

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `.name` - object key lookup.
    Key(String),
    /// `:n` - array element or 0-based character index.
    Index(usize),
}

/// Segment names that would reach host-object internals; rejected outright.
const FORBIDDEN: &[&str] = &["prototype", "constructor", "__proto__"];

/// Split a path into validated segments.
pub fn parse(path: &str) -> Result<Vec<Segment>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let mut segments = Vec::new();
    // The first segment is a key; each separator dictates the kind of the
    // segment that follows it.
    let mut is_index = false;
    let mut buf = String::new();

    for ch in path.chars().chain(std::iter::once('.')) {
        if ch == '.' || ch == ':' {
            if buf.is_empty() {
                return Err(PathError::EmptySegment {
                    path: path.to_string(),
                });
            }
            if FORBIDDEN.contains(&buf.as_str()) {
                return Err(PathError::ForbiddenSegment { segment: buf });
            }
            if is_index {
                let index = buf.parse::<usize>().map_err(|_| PathError::BadIndex {
                    segment: buf.clone(),
                })?;
                segments.push(Segment::Index(index));
            } else {
                segments.push(Segment::Key(std::mem::take(&mut buf)));
            }
            buf.clear();
            is_index = ch == ':';
        } else {
            buf.push(ch);
        }
    }

    Ok(segments)
}

/// Walk `target` along `path`. Stepping from Null or Undefined, or into a
/// missing attribute, yields Undefined rather than an error; a field that is
/// explicitly null resolves to Null.
pub fn resolve(target: &Value, path: &str) -> Result<Value, PathError> {
    let segments = parse(path)?;
    let mut current = target.clone();

    for segment in &segments {
        if current.is_nullish() {
            return Ok(Value::Undefined);
        }
        current = match segment {
            Segment::Key(key) => match current.get(key) {
                Some(v) => v.clone(),
                None => Value::Undefined,
            },
            Segment::Index(i) => match &current {
                Value::Array(arr) => arr.get(*i).cloned().unwrap_or(Value::Undefined),
                Value::String(s) => match s.chars().nth(*i) {
                    Some(ch) => Value::string(ch.to_string()),
                    None => Value::Undefined,
                },
                _ => Value::Undefined,
            },
        };
    }

    Ok(current)
}
