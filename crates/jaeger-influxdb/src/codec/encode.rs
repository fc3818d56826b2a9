//! Span to point conversion.

use std::fmt;

use chrono::{DateTime, Utc};

use super::point::{FieldValue, Point};
use super::timestamp;
use super::value;
use crate::model::{KeyValue, Span, Value};
use crate::schema;

/// A key/value that was left out of the encoded rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeWarning {
    /// A log field used a key reserved for the row itself or for query
    /// bookkeeping.
    ReservedLogField { span_id: String, key: String },
    /// A value that line protocol cannot represent.
    Unrepresentable {
        span_id: String,
        key: String,
        reason: &'static str,
    },
}

impl fmt::Display for EncodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedLogField { span_id, key } => {
                write!(f, "span {span_id}: dropped log field with reserved key {key:?}")
            }
            Self::Unrepresentable {
                span_id,
                key,
                reason,
            } => write!(f, "span {span_id}: dropped {key:?}: {reason}"),
        }
    }
}

/// Rows produced for one span, plus anything that had to be dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedSpan {
    pub points: Vec<Point>,
    pub warnings: Vec<EncodeWarning>,
}

impl EncodedSpan {
    /// Line protocol for every point, in order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.points.iter().map(Point::to_line).collect()
    }
}

/// Encode a span into one span row and one row per log entry.
///
/// Newlines in names and keys are replaced with [`value::NEWLINE_TOKEN`], so
/// no rendered line ever spans two lines.
#[must_use]
pub fn encode_span(span: &Span, span_measurement: &str, log_measurement: &str) -> EncodedSpan {
    let span_id = span.span_id.to_string();
    let trace_id = span.trace_id.to_string();
    let mut warnings = Vec::new();

    let mut row = Point::new(
        span_measurement,
        timestamp::merge(span.start_time, span.span_id),
    );
    row.add_tag(schema::TRACE_ID, trace_id.as_str());
    row.add_tag(
        schema::SERVICE_NAME,
        value::escape_newlines(&span.process.service_name),
    );
    row.add_tag(
        schema::OPERATION_NAME,
        value::escape_newlines(&span.operation_name),
    );

    for tag in span.tags.iter().chain(&span.process.tags) {
        if tag.key.is_empty() {
            warnings.push(EncodeWarning::Unrepresentable {
                span_id: span_id.clone(),
                key: String::new(),
                reason: "empty tag key",
            });
            continue;
        }
        row.add_tag(
            schema::tag_column(&value::escape_newlines(&tag.key)),
            value::encode_tag(&tag.value),
        );
    }

    row.add_field(schema::SPAN_ID, FieldValue::String(span_id.clone()));
    row.add_field(schema::DURATION, FieldValue::Int(duration_nanos(span)));
    row.add_field(schema::FLAGS, FieldValue::Int(i64::from(span.flags)));
    row.add_field(
        schema::PROCESS_TAG_KEYS,
        FieldValue::String(join_keys(&span.process.tags)),
    );

    let references: Vec<String> = span
        .references
        .iter()
        .filter(|r| !r.span_id.is_zero())
        .map(|r| format!("{}:{}", r.span_id, r.ref_type))
        .collect();
    if !references.is_empty() {
        row.add_field(schema::REFERENCES, FieldValue::String(references.join(",")));
    }

    let mut points = Vec::with_capacity(1 + span.logs.len());
    points.push(row);

    for log in &span.logs {
        let mut row = Point::new(log_measurement, timestamp::unix_nanos(log.timestamp));
        row.add_tag(schema::TRACE_ID, trace_id.as_str());
        row.add_field(schema::SPAN_ID, FieldValue::String(span_id.clone()));

        for field in &log.fields {
            if schema::is_reserved_log_key(&field.key) {
                warnings.push(EncodeWarning::ReservedLogField {
                    span_id: span_id.clone(),
                    key: field.key.clone(),
                });
                continue;
            }
            if let Some(reason) = unrepresentable_field(field) {
                warnings.push(EncodeWarning::Unrepresentable {
                    span_id: span_id.clone(),
                    key: field.key.clone(),
                    reason,
                });
                continue;
            }
            row.add_field(
                value::escape_newlines(&field.key),
                value::encode_field(&field.value),
            );
        }
        points.push(row);
    }

    EncodedSpan { points, warnings }
}

/// Discovery marker recording that `service` has emitted `operation`.
#[must_use]
pub fn encode_meta(
    measurement: &str,
    service: &str,
    operation: &str,
    observed: DateTime<Utc>,
) -> Point {
    let mut row = Point::new(measurement, timestamp::unix_nanos(observed));
    row.add_tag(schema::SERVICE_NAME, value::escape_newlines(service));
    row.add_tag(schema::OPERATION_NAME, value::escape_newlines(operation));
    row.add_field(schema::META_FIELD, FieldValue::Bool(true));
    row
}

fn duration_nanos(span: &Span) -> i64 {
    i64::try_from(span.duration.as_nanos()).unwrap_or(i64::MAX)
}

fn join_keys(tags: &[KeyValue]) -> String {
    tags.iter()
        .filter(|t| !t.key.is_empty())
        .map(|t| value::escape_newlines(&t.key))
        .collect::<Vec<_>>()
        .join(",")
}

fn unrepresentable_field(field: &KeyValue) -> Option<&'static str> {
    if field.key.is_empty() {
        return Some("empty field key");
    }
    match field.value {
        Value::Float64(f) if !f.is_finite() => Some("non-finite float"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Log, SpanId, SpanRef};
    use crate::test_fixtures::{span_a, span_b, trace_id};
    use rstest::rstest;

    #[rstest]
    fn span_row_matches_stored_format(span_a: Span) {
        let encoded = encode_span(&span_a, "span", "log");
        assert!(encoded.warnings.is_empty());

        let row = &encoded.points[0];
        assert_eq!(row.measurement(), "span");
        assert_eq!(row.timestamp(), 1_550_013_480_000_123_726);
        assert_eq!(row.tags()["trace_id"], "112210f47de9811503415a40d6858115");
        assert_eq!(row.tags()["service_name"], "test-service-a");
        assert_eq!(row.tags()["operation_name"], "test-operation-a");
        assert_eq!(row.tags()["tag:tag-a"], "s:value-a");
        assert_eq!(row.tags()["tag:tag-b"], "b:t");
        assert_eq!(row.tags()["tag:tag-c"], "i:123");
        assert_eq!(row.tags()["tag:tag-d"], "f:1.23456E+02");
        assert_eq!(row.tags()["tag:tag-e"], "B:Zm9v");
        assert_eq!(row.tags()["tag:process-tag-a"], "s:process-value-a");
        assert_eq!(
            row.fields()["span_id"],
            FieldValue::String("7acf501b718115".into())
        );
        assert_eq!(row.fields()["duration"], FieldValue::Int(12_345_000));
        assert_eq!(row.fields()["flags"], FieldValue::Int(2));
        assert_eq!(
            row.fields()["process_tag_keys"],
            FieldValue::String("process-tag-a".into())
        );
        assert!(!row.fields().contains_key("references"));
    }

    #[rstest]
    fn log_rows_keep_their_own_timestamp(span_a: Span) {
        let encoded = encode_span(&span_a, "span", "log");
        assert_eq!(encoded.points.len(), 4);

        let logs = &encoded.points[1..];
        assert!(logs.iter().all(|p| p.measurement() == "log"));
        assert!(logs.iter().all(|p| p.tags().len() == 1));
        assert_eq!(
            logs.iter().map(Point::timestamp).collect::<Vec<_>>(),
            vec![
                1_550_013_480_000_300_000,
                1_550_013_480_000_301_000,
                1_550_013_480_000_302_000
            ]
        );
        assert_eq!(logs[0].fields()["k"], FieldValue::String("sv".into()));
        assert_eq!(
            logs[1].fields()["have newline"],
            FieldValue::String("sfooNEWLINEbar".into())
        );
        assert_eq!(
            logs[2].fields()["is binary"],
            FieldValue::String("BZm9vIGJhcg==".into())
        );
    }

    #[rstest]
    fn references_skip_root_placeholder(mut span_b: Span, trace_id: crate::model::TraceId) {
        span_b
            .references
            .push(SpanRef::follows_from(trace_id, SpanId(0)));
        let encoded = encode_span(&span_b, "span", "log");
        let row = &encoded.points[0];

        assert_eq!(row.timestamp(), 1_550_013_480_000_200_883);
        assert_eq!(
            row.fields()["references"],
            FieldValue::String("7acf501b718115:ChildOf".into())
        );
    }

    #[rstest]
    fn encoding_is_deterministic(span_a: Span) {
        let first = encode_span(&span_a, "span", "log").lines();
        let second = encode_span(&span_a, "span", "log").lines();
        assert_eq!(first, second);
    }

    #[rstest]
    fn reserved_and_bad_log_fields_are_dropped(mut span_b: Span) {
        span_b.logs.push(Log {
            timestamp: span_b.start_time,
            fields: vec![
                KeyValue::string("span_id", "forged"),
                KeyValue::float64("ratio", f64::NAN),
                KeyValue::int64("ok", 1),
            ],
        });
        let encoded = encode_span(&span_b, "span", "log");

        assert_eq!(encoded.warnings.len(), 2);
        assert!(matches!(
            &encoded.warnings[0],
            EncodeWarning::ReservedLogField { key, .. } if key == "span_id"
        ));
        let log = &encoded.points[1];
        assert_eq!(
            log.fields()["span_id"],
            FieldValue::String("2060c339".into())
        );
        assert!(!log.fields().contains_key("ratio"));
        assert_eq!(log.fields()["ok"], FieldValue::Int(1));
    }

    #[rstest]
    fn bookkeeping_log_keys_are_dropped(mut span_b: Span) {
        span_b.logs = vec![Log {
            timestamp: span_b.start_time,
            fields: vec![
                KeyValue::string("result", "ok"),
                KeyValue::string("table", "users"),
                KeyValue::int64("_value", 1),
                KeyValue::string("event", "query"),
            ],
        }];
        let encoded = encode_span(&span_b, "span", "log");

        let dropped: Vec<&str> = encoded
            .warnings
            .iter()
            .filter_map(|w| match w {
                EncodeWarning::ReservedLogField { key, .. } => Some(key.as_str()),
                EncodeWarning::Unrepresentable { .. } => None,
            })
            .collect();
        assert_eq!(dropped, vec!["result", "table", "_value"]);
        let log = &encoded.points[1];
        assert_eq!(
            log.fields().keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["event", "span_id"]
        );
    }

    #[rstest]
    fn newlines_never_reach_the_line(mut span_a: Span) {
        span_a.operation_name = "GET\n/users".into();
        span_a.process.service_name = "svc\nA".into();
        span_a.tags.push(KeyValue::string("multi\nline key", "v"));
        span_a.process.tags.push(KeyValue::bool("host\nname", true));
        span_a.logs[0].fields.push(KeyValue::int64("log\nkey", 1));

        let encoded = encode_span(&span_a, "span", "log");
        for line in encoded.lines() {
            assert!(!line.contains('\n'), "{line:?}");
        }
        let meta = encode_meta("span_meta", "svc\nA", "GET\n/users", DateTime::<Utc>::UNIX_EPOCH);
        assert!(!meta.to_line().contains('\n'));

        let row = &encoded.points[0];
        assert_eq!(row.tags()["operation_name"], "GETNEWLINE/users");
        assert_eq!(row.tags()["service_name"], "svcNEWLINEA");
        assert_eq!(row.tags()["tag:multiNEWLINEline key"], "s:v");
        assert_eq!(
            row.fields()["process_tag_keys"],
            FieldValue::String("process-tag-a,hostNEWLINEname".into())
        );
        assert_eq!(encoded.points[1].fields()["logNEWLINEkey"], FieldValue::Int(1));
    }

    #[test]
    fn meta_row_marks_service_and_operation() {
        let row = encode_meta("span_meta", "svc", "op", DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(row.to_line(), "span_meta,operation_name=op,service_name=svc v=true 0");
    }
}
