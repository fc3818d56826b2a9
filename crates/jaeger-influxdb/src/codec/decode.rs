//! Result row to span and log conversion.
//!
//! Decoding never stops at the first bad column: every failure in a row is
//! collected and returned together, and a row with any failure yields nothing.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::table::Datum;
use super::timestamp;
use super::value::{self, ValueError};
use crate::error::{DecodeError, FieldError};
use crate::model::{KeyValue, Log, Process, RefType, Span, SpanId, SpanRef, TraceId, Value};
use crate::schema;

/// A decoded log row together with the span it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub log: Log,
}

/// Decode one span row.
pub fn decode_span(columns: &[String], row: &[Datum]) -> Result<Span, DecodeError> {
    let mut errors = Vec::new();
    let mut seen_ids = (false, false);
    let mut trace_id: Option<TraceId> = None;
    let mut span_id: Option<SpanId> = None;
    let mut operation_name = String::new();
    let mut service_name = String::new();
    let mut start_time = DateTime::<Utc>::UNIX_EPOCH;
    let mut duration = Duration::ZERO;
    let mut flags = 0;
    let mut raw_references = None;
    let mut process_tag_keys = Vec::new();
    let mut tags = Vec::new();

    for (column, datum) in columns.iter().zip(row) {
        if datum.is_null() || schema::is_bookkeeping_column(column) {
            continue;
        }
        let result = match column.as_str() {
            schema::TRACE_ID => {
                seen_ids.0 = true;
                parse_id(column, datum).map(|id| trace_id = Some(id))
            }
            schema::SPAN_ID => {
                seen_ids.1 = true;
                parse_id(column, datum).map(|id| span_id = Some(id))
            }
            schema::SERVICE_NAME => {
                string(column, datum).map(|s| service_name = value::unescape_newlines(s))
            }
            schema::OPERATION_NAME => {
                string(column, datum).map(|s| operation_name = value::unescape_newlines(s))
            }
            schema::DURATION => integer(column, datum).map(|ns| {
                duration = Duration::from_nanos(u64::try_from(ns).unwrap_or_default());
            }),
            schema::FLAGS => integer(column, datum).and_then(|f| {
                u32::try_from(f)
                    .map(|f| flags = f)
                    .map_err(|e| FieldError::invalid(column.as_str(), e))
            }),
            schema::REFERENCES => string(column, datum).map(|s| raw_references = Some(s)),
            schema::PROCESS_TAG_KEYS => string(column, datum).map(|s| {
                process_tag_keys = s
                    .split(',')
                    .filter(|k| !k.is_empty())
                    .map(value::unescape_newlines)
                    .collect();
            }),
            name if schema::is_time_column(name) => {
                time(column, datum).map(|t| start_time = timestamp::split(t))
            }
            name => match name.split_once(':') {
                Some((schema::TAG_PREFIX, key)) => string(column, datum).and_then(|s| {
                    let key = value::unescape_newlines(key);
                    value::decode_tag(s)
                        .map(|v| tags.push(KeyValue::new(key, v)))
                        .map_err(|e| value_error(column, e))
                }),
                _ => Err(FieldError::UnknownColumn(column.clone())),
            },
        };
        if let Err(e) = result {
            errors.push(e);
        }
    }

    push_missing_ids(&mut errors, seen_ids);
    let trace_id = trace_id.unwrap_or_default();

    let references = match raw_references {
        Some(raw) => parse_references(raw, trace_id).unwrap_or_else(|e| {
            errors.push(e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    if let Some(err) = DecodeError::from_errors(errors) {
        return Err(err);
    }

    let (process_tags, tags): (Vec<_>, Vec<_>) = tags
        .into_iter()
        .partition(|t| process_tag_keys.contains(&t.key));

    Ok(Span {
        trace_id,
        span_id: span_id.unwrap_or_default(),
        operation_name,
        references,
        flags,
        start_time,
        duration,
        tags,
        logs: Vec::new(),
        process: Process {
            service_name,
            tags: process_tags,
        },
    })
}

/// Decode one log row.
///
/// Native boolean, integer and float columns keep their type; string columns
/// carry the `s`/`B` prefix grammar.
pub fn decode_log(columns: &[String], row: &[Datum]) -> Result<DecodedLog, DecodeError> {
    let mut errors = Vec::new();
    let mut seen_ids = (false, false);
    let mut trace_id: Option<TraceId> = None;
    let mut span_id: Option<SpanId> = None;
    let mut timestamp = DateTime::<Utc>::UNIX_EPOCH;
    let mut fields = Vec::new();

    for (column, datum) in columns.iter().zip(row) {
        if datum.is_null() || schema::is_bookkeeping_column(column) {
            continue;
        }
        let result = match column.as_str() {
            schema::TRACE_ID => {
                seen_ids.0 = true;
                parse_id(column, datum).map(|id| trace_id = Some(id))
            }
            schema::SPAN_ID => {
                seen_ids.1 = true;
                parse_id(column, datum).map(|id| span_id = Some(id))
            }
            name if schema::is_time_column(name) => {
                time(column, datum).map(|t| timestamp = DateTime::from_timestamp_nanos(t))
            }
            key => log_value(column, datum)
                .map(|v| fields.push(KeyValue::new(value::unescape_newlines(key), v))),
        };
        if let Err(e) = result {
            errors.push(e);
        }
    }

    push_missing_ids(&mut errors, seen_ids);
    if let Some(err) = DecodeError::from_errors(errors) {
        return Err(err);
    }

    Ok(DecodedLog {
        trace_id: trace_id.unwrap_or_default(),
        span_id: span_id.unwrap_or_default(),
        log: Log { timestamp, fields },
    })
}

/// Parse a comma-joined `spanID:RefType` list.
///
/// References to span id zero are root placeholders and are skipped.
pub fn parse_references(raw: &str, trace_id: TraceId) -> Result<Vec<SpanRef>, FieldError> {
    let mut references = Vec::new();
    for item in raw.split(',').filter(|s| !s.is_empty()) {
        let Some((span_id, ref_type)) = item.split_once(':') else {
            return Err(FieldError::invalid(
                schema::REFERENCES,
                format!("reference {item:?} is not spanID:RefType"),
            ));
        };
        let span_id: SpanId = span_id.parse().map_err(|source| FieldError::Id {
            column: schema::REFERENCES.to_string(),
            source,
        })?;
        let ref_type = ref_type
            .parse::<RefType>()
            .map_err(|e| FieldError::invalid(schema::REFERENCES, e))?;
        if span_id.is_zero() {
            continue;
        }
        references.push(SpanRef {
            trace_id,
            span_id,
            ref_type,
        });
    }
    Ok(references)
}

/// Record absent id columns. Present but unparsable ids already have an error.
fn push_missing_ids(errors: &mut Vec<FieldError>, (trace_seen, span_seen): (bool, bool)) {
    if !trace_seen {
        errors.push(FieldError::MissingColumn(schema::TRACE_ID));
    }
    if !span_seen {
        errors.push(FieldError::MissingColumn(schema::SPAN_ID));
    }
}

fn log_value(column: &str, datum: &Datum) -> Result<Value, FieldError> {
    match datum {
        Datum::String(s) => value::decode_string_field(s).map_err(|e| value_error(column, e)),
        Datum::Bool(b) => Ok(Value::Bool(*b)),
        Datum::Int(i) | Datum::Time(i) => Ok(Value::Int64(*i)),
        Datum::UInt(u) => i64::try_from(*u)
            .map(Value::Int64)
            .map_err(|e| FieldError::invalid(column, e)),
        Datum::Float(f) => Ok(Value::Float64(*f)),
        Datum::Null => Err(FieldError::MissingColumn("value")),
    }
}

fn parse_id<T>(column: &str, datum: &Datum) -> Result<T, FieldError>
where
    T: std::str::FromStr<Err = crate::error::IdError>,
{
    string(column, datum)?.parse().map_err(|source| FieldError::Id {
        column: column.to_string(),
        source,
    })
}

fn string<'a>(column: &str, datum: &'a Datum) -> Result<&'a str, FieldError> {
    datum.as_str().ok_or_else(|| FieldError::UnexpectedType {
        column: column.to_string(),
        expected: "string",
    })
}

fn integer(column: &str, datum: &Datum) -> Result<i64, FieldError> {
    datum.as_i64().ok_or_else(|| FieldError::UnexpectedType {
        column: column.to_string(),
        expected: "integer",
    })
}

/// Nanosecond timestamp from a time, integer or RFC 3339 cell.
fn time(column: &str, datum: &Datum) -> Result<i64, FieldError> {
    if let Datum::String(s) = datum {
        return DateTime::parse_from_rfc3339(s)
            .map_err(|e| FieldError::invalid(column, e))
            .map(|t| timestamp::unix_nanos(t.with_timezone(&Utc)));
    }
    integer(column, datum)
}

fn value_error(column: &str, err: ValueError) -> FieldError {
    FieldError::invalid(column, err)
}
