//! InfluxDB points and their line protocol rendering.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

/// One row: measurement, tags, fields and a nanosecond timestamp.
///
/// Tags and fields are kept sorted by key so the rendered line is the same
/// every time a point is built from the same input.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: i64,
}

impl Point {
    /// Create an empty point.
    pub fn new(measurement: impl Into<String>, timestamp: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    /// Set a tag, replacing any previous value for the key.
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Set a field, replacing any previous value for the key.
    pub fn add_field(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub const fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub const fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Render the point as one line of line protocol, without a trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(128);
        self.write_line(&mut line);
        line
    }

    /// Append the line protocol rendering to `out`.
    pub fn write_line(&self, out: &mut String) {
        escape_into(out, &self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            out.push(',');
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            escape_into(out, value, &[',', '=', ' ']);
        }

        out.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            write_field_value(out, value);
        }

        let _ = write!(out, " {}", self.timestamp);
    }
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn write_field_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::String(s) => {
            out.push('"');
            escape_into(out, s, &['"', '\\']);
            out.push('"');
        }
        FieldValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        FieldValue::Int(i) => {
            let _ = write!(out, "{i}i");
        }
        FieldValue::UInt(u) => {
            let _ = write!(out, "{u}u");
        }
        FieldValue::Float(f) => {
            let _ = write!(out, "{f}");
        }
    }
}
