//! Column and measurement names shared by the codec and query builders.
//!
//! These names are both the write format and the decode grammar, so they
//! must never change once data has been written.
//!
//! # Span rows
//!
//! | column              | kind  | value                                  |
//! |---------------------|-------|----------------------------------------|
//! | `trace_id`          | tag   | hex trace id                           |
//! | `service_name`      | tag   | process service name                   |
//! | `operation_name`    | tag   | span operation                         |
//! | `tag:<key>`         | tag   | typed string, e.g. `s:GET` or `i:200`  |
//! | `span_id`           | field | hex span id                            |
//! | `duration`          | field | nanoseconds                            |
//! | `flags`             | field | integer                                |
//! | `process_tag_keys`  | field | comma-joined keys of process tags      |
//! | `references`        | field | comma-joined `spanID:RefType`          |
//!
//! # Log rows
//!
//! Tagged with `trace_id`, with a `span_id` field and one field per log key.

/// Trace id tag.
pub const TRACE_ID: &str = "trace_id";
/// Service name tag.
pub const SERVICE_NAME: &str = "service_name";
/// Operation name tag.
pub const OPERATION_NAME: &str = "operation_name";
/// Span id field.
pub const SPAN_ID: &str = "span_id";
/// Duration field, in nanoseconds.
pub const DURATION: &str = "duration";
/// Flags field.
pub const FLAGS: &str = "flags";
/// Keys of tags that belong to the process rather than the span.
pub const PROCESS_TAG_KEYS: &str = "process_tag_keys";
/// Span references field.
pub const REFERENCES: &str = "references";

/// Time column in InfluxQL results.
pub const TIME_V1: &str = "time";
/// Time column in Flux results.
pub const TIME_V2: &str = "_time";

/// Flux measurement column.
pub const MEASUREMENT: &str = "_measurement";
/// Flux field name column.
pub const FIELD: &str = "_field";
/// Flux field value column.
pub const VALUE: &str = "_value";
/// Flux range start column.
pub const START: &str = "_start";
/// Flux range stop column.
pub const STOP: &str = "_stop";
/// Annotated CSV result name column.
pub const RESULT: &str = "result";
/// Annotated CSV table index column.
pub const TABLE: &str = "table";

/// Prefix of span and process tag columns.
pub const TAG_PREFIX: &str = "tag";

/// Field written on discovery marker rows.
pub const META_FIELD: &str = "v";

/// Default span measurement.
pub const DEFAULT_SPAN_MEASUREMENT: &str = "span";
/// Default log measurement.
pub const DEFAULT_LOG_MEASUREMENT: &str = "log";
/// Default service/operation discovery measurement.
pub const DEFAULT_SPAN_META_MEASUREMENT: &str = "span_meta";

/// Whether a column is query bookkeeping rather than span data.
#[must_use]
pub fn is_bookkeeping_column(name: &str) -> bool {
    matches!(name, MEASUREMENT | FIELD | VALUE | START | STOP | RESULT | TABLE)
}

/// Whether a log field key would collide with a row or bookkeeping column.
#[must_use]
pub fn is_reserved_log_key(key: &str) -> bool {
    matches!(key, TRACE_ID | SPAN_ID) || is_time_column(key) || is_bookkeeping_column(key)
}

/// Whether a column holds the row timestamp.
#[must_use]
pub fn is_time_column(name: &str) -> bool {
    matches!(name, TIME_V1 | TIME_V2)
}

/// Column name for a span or process tag key.
#[must_use]
pub fn tag_column(key: &str) -> String {
    format!("{TAG_PREFIX}:{key}")
}
