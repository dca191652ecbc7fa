// Lexeme promotion: raw literal text to a typed Value
// Quoted literals stay strings; naked literals are detected in a fixed order.

use std::sync::OnceLock;

use chrono::FixedOffset;
use regex::Regex;

use crate::datetime;
use crate::token::LiteralStyle;
use crate::value::Value;

/// Signed decimal with an optional fractional part. No exponents, no locale
/// separators.
fn decimal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d*(?:\.\d+)?$").unwrap())
}

/// Promote a raw lexeme to a typed value.
///
/// A quoted lexeme is always a String. A naked lexeme is checked in order:
/// signed decimal, boolean, null/undefined, the two date grammars (a lexeme
/// without an embedded offset is interpreted in `zone_offset`), and finally
/// falls back to a String.
pub fn promote(raw: &str, style: LiteralStyle, zone_offset: FixedOffset) -> Value {
    if style == LiteralStyle::Quoted {
        return Value::string(raw);
    }

    if decimal_regex().is_match(raw) {
        // "" and "-" slip through the pattern but are not numbers
        if let Ok(n) = raw.parse::<f64>() {
            if !n.is_nan() {
                return Value::Number(n);
            }
        }
    }

    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if raw.eq_ignore_ascii_case("undefined") {
        return Value::Undefined;
    }

    if let Some(dt) = datetime::parse_date(raw, zone_offset) {
        return Value::Date(dt);
    }

    Value::string(raw)
}
