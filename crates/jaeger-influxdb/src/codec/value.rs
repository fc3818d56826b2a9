//! Typed-string grammar for [`Value`].
//!
//! InfluxDB tags are strings only, and string fields carry no type marker, so
//! every value that travels as a string is prefixed with a one-character type:
//!
//! | value   | tag form      | log field form             |
//! |---------|---------------|----------------------------|
//! | string  | `s:<text>`    | `s<text>` (string field)   |
//! | bool    | `b:t` / `b:f` | native boolean field       |
//! | int64   | `i:<decimal>` | native integer field       |
//! | float64 | `f:<float>`   | native float field         |
//! | binary  | `B:<base64>`  | `B<base64>` (string field) |
//!
//! Line protocol cannot carry a raw newline, so newlines inside strings are
//! written as the literal token `NEWLINE`. The same substitution applies to
//! service names, operation names and tag or field keys.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::point::FieldValue;
use crate::model::Value;

/// Replacement written in place of `\n` inside string values.
pub const NEWLINE_TOKEN: &str = "NEWLINE";

const STRING: char = 's';
const BOOL: char = 'b';
const INT: char = 'i';
const FLOAT: char = 'f';
const BINARY: char = 'B';

/// Reason a typed string could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("missing type prefix in {0:?}")]
    MissingPrefix(String),
    #[error("unknown type prefix {prefix:?} in {raw:?}")]
    UnknownPrefix { prefix: char, raw: String },
    #[error("invalid {kind} value {raw:?}")]
    Invalid { kind: &'static str, raw: String },
}

/// Encode a value as a `prefix:value` tag string.
#[must_use]
pub fn encode_tag(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{STRING}:{}", escape_newlines(s)),
        Value::Bool(b) => format!("{BOOL}:{}", if *b { 't' } else { 'f' }),
        Value::Int64(i) => format!("{INT}:{i}"),
        Value::Float64(f) => format!("{FLOAT}:{}", format_float(*f)),
        Value::Binary(bytes) => format!("{BINARY}:{}", BASE64.encode(bytes)),
    }
}

/// Decode a `prefix:value` tag string.
pub fn decode_tag(raw: &str) -> Result<Value, ValueError> {
    let mut chars = raw.chars();
    let (Some(prefix), Some(':')) = (chars.next(), chars.next()) else {
        return Err(ValueError::MissingPrefix(raw.to_string()));
    };
    let body = chars.as_str();
    match prefix {
        STRING => Ok(Value::String(unescape_newlines(body))),
        BOOL => match body {
            "t" => Ok(Value::Bool(true)),
            "f" => Ok(Value::Bool(false)),
            _ => Err(invalid("bool", raw)),
        },
        INT => body
            .parse()
            .map(Value::Int64)
            .map_err(|_| invalid("int", raw)),
        FLOAT => body
            .parse()
            .map(Value::Float64)
            .map_err(|_| invalid("float", raw)),
        BINARY => BASE64
            .decode(body)
            .map(Value::Binary)
            .map_err(|_| invalid("binary", raw)),
        other => Err(ValueError::UnknownPrefix {
            prefix: other,
            raw: raw.to_string(),
        }),
    }
}

/// Encode a log field value.
///
/// Strings and binary become prefixed string fields; scalars stay native.
#[must_use]
pub fn encode_field(value: &Value) -> FieldValue {
    match value {
        Value::String(s) => FieldValue::String(format!("{STRING}{}", escape_newlines(s))),
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Int64(i) => FieldValue::Int(*i),
        Value::Float64(f) => FieldValue::Float(*f),
        Value::Binary(bytes) => FieldValue::String(format!("{BINARY}{}", BASE64.encode(bytes))),
    }
}

/// Decode a prefixed string log field.
pub fn decode_string_field(raw: &str) -> Result<Value, ValueError> {
    let mut chars = raw.chars();
    let Some(prefix) = chars.next() else {
        return Err(ValueError::MissingPrefix(raw.to_string()));
    };
    let body = chars.as_str();
    match prefix {
        STRING => Ok(Value::String(unescape_newlines(body))),
        BINARY => BASE64
            .decode(body)
            .map(Value::Binary)
            .map_err(|_| invalid("binary", raw)),
        other => Err(ValueError::UnknownPrefix {
            prefix: other,
            raw: raw.to_string(),
        }),
    }
}

/// Every tag string a user-supplied search value could have been stored as.
///
/// Search values arrive untyped, so `200` may match a string tag or an
/// integer tag.
#[must_use]
pub fn tag_candidates(query: &str) -> Vec<String> {
    let mut candidates = vec![encode_tag(&Value::String(query.to_string()))];
    match query {
        "true" => candidates.push(encode_tag(&Value::Bool(true))),
        "false" => candidates.push(encode_tag(&Value::Bool(false))),
        _ => {}
    }
    if let Ok(i) = query.parse::<i64>() {
        candidates.push(encode_tag(&Value::Int64(i)));
    }
    if let Ok(f) = query.parse::<f64>() {
        if f.is_finite() {
            candidates.push(encode_tag(&Value::Float64(f)));
        }
    }
    candidates
}

/// Format a float in shortest round-trip scientific notation, e.g. `1.23456E+02`.
#[must_use]
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let sci = format!("{f:E}");
    let Some((mantissa, exponent)) = sci.split_once('E') else {
        return sci;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}E{sign}{digits:0>2}")
}

/// Replace every `\n` with [`NEWLINE_TOKEN`].
///
/// Also applied to tag values and keys that are not typed, such as service
/// names, operation names and log field keys.
#[must_use]
pub fn escape_newlines(s: &str) -> String {
    s.replace('\n', NEWLINE_TOKEN)
}

/// Inverse of [`escape_newlines`].
#[must_use]
pub fn unescape_newlines(s: &str) -> String {
    s.replace(NEWLINE_TOKEN, "\n")
}

fn invalid(kind: &'static str, raw: &str) -> ValueError {
    ValueError::Invalid {
        kind,
        raw: raw.to_string(),
    }
}
