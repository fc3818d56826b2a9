//! Shared rstest fixtures.
//!
//! ```text
//! trace_id
//!    ├── span_a (root, every tag type, three logs)
//!    └── span_b (child of span_a)
//! ```

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use rstest::fixture;

use crate::codec::{Datum, FieldValue, Point, ResultTable};
use crate::error::TransportError;
use crate::model::{KeyValue, Log, Process, Span, SpanId, SpanRef, TraceId};
use crate::schema;
use crate::transport::{QueryTransport, WriteTransport};

/// Trace id shared by the fixture spans.
#[fixture]
pub fn trace_id() -> TraceId {
    TraceId::new(1_234_567_890_123_456_789, 234_567_890_123_456_789)
}

/// Root span carrying one tag of every value type.
#[fixture]
pub fn span_a(trace_id: TraceId) -> Span {
    let mut process = Process::new("test-service-a");
    process
        .tags
        .push(KeyValue::string("process-tag-a", "process-value-a"));

    let mut span = Span::new(
        trace_id,
        SpanId(34_567_890_123_456_789),
        "test-operation-a",
        process,
        DateTime::from_timestamp(1_550_013_480, 123_000).unwrap(),
    );
    span.flags = 2;
    span.duration = Duration::from_micros(12_345);
    span.tags = vec![
        KeyValue::string("tag-a", "value-a"),
        KeyValue::bool("tag-b", true),
        KeyValue::int64("tag-c", 123),
        KeyValue::float64("tag-d", 123.456),
        KeyValue::binary("tag-e", b"foo".to_vec()),
    ];
    span.logs = vec![
        Log {
            timestamp: DateTime::from_timestamp_nanos(1_550_013_480_000_300_000),
            fields: vec![KeyValue::string("k", "v")],
        },
        Log {
            timestamp: DateTime::from_timestamp_nanos(1_550_013_480_000_301_000),
            fields: vec![KeyValue::string("have newline", "foo\nbar")],
        },
        Log {
            timestamp: DateTime::from_timestamp_nanos(1_550_013_480_000_302_000),
            fields: vec![KeyValue::binary("is binary", b"foo bar".to_vec())],
        },
    ];
    span
}

/// Child of [`span_a`] in the same service.
#[fixture]
pub fn span_b(trace_id: TraceId) -> Span {
    let mut process = Process::new("test-service-a");
    process
        .tags
        .push(KeyValue::string("other-process-tag-a", "other-process-value-a"));

    let mut span = Span::new(
        trace_id,
        SpanId(543_212_345),
        "test-operation-b",
        process,
        DateTime::from_timestamp(1_550_013_480, 200_000).unwrap(),
    );
    span.flags = 1;
    span.duration = Duration::from_micros(1_234);
    span.references = vec![SpanRef::child_of(trace_id, SpanId(34_567_890_123_456_789))];
    span.tags = vec![KeyValue::string("other-tag-a", "other-value-a")];
    span
}

// ============================================================================
// Result tables
// ============================================================================

/// Points of one measurement as InfluxQL returns them for
/// `group by "trace_id"`: one table per trace, the trace id in the group key
/// and every other tag or field as a column, null where a row lacks it.
pub fn series_by_trace(points: &[Point], measurement: &str) -> Vec<ResultTable> {
    let mut trace_ids: Vec<&String> = Vec::new();
    for point in points.iter().filter(|p| p.measurement() == measurement) {
        if let Some(id) = point.tags().get(schema::TRACE_ID) {
            if !trace_ids.contains(&id) {
                trace_ids.push(id);
            }
        }
    }

    trace_ids
        .into_iter()
        .map(|trace_id| {
            let members: Vec<&Point> = points
                .iter()
                .filter(|p| {
                    p.measurement() == measurement
                        && p.tags().get(schema::TRACE_ID) == Some(trace_id)
                })
                .collect();
            let keys: BTreeSet<&String> = members
                .iter()
                .flat_map(|p| p.tags().keys().chain(p.fields().keys()))
                .filter(|k| k.as_str() != schema::TRACE_ID)
                .collect();

            let mut columns = vec![schema::TIME_V1.to_string()];
            columns.extend(keys.iter().map(|k| (*k).clone()));
            let mut table = ResultTable::new(columns).with_group_key(schema::TRACE_ID, trace_id);
            for point in members {
                let mut row = vec![Datum::Time(point.timestamp())];
                row.extend(keys.iter().map(|key| cell(point, key)));
                table.push_row(row);
            }
            table
        })
        .collect()
}

/// The cell a point contributes to a column.
pub fn cell(point: &Point, key: &str) -> Datum {
    if let Some(tag) = point.tags().get(key) {
        return Datum::String(tag.clone());
    }
    match point.fields().get(key) {
        Some(FieldValue::String(s)) => Datum::String(s.clone()),
        Some(FieldValue::Bool(b)) => Datum::Bool(*b),
        Some(FieldValue::Int(i)) => Datum::Int(*i),
        Some(FieldValue::UInt(u)) => Datum::UInt(*u),
        Some(FieldValue::Float(f)) => Datum::Float(*f),
        None => Datum::Null,
    }
}

// ============================================================================
// Transports
// ============================================================================

/// Transport double that records queries and writes and replays canned results.
#[derive(Default)]
pub struct RecordingTransport {
    responses: Mutex<VecDeque<Result<Vec<ResultTable>, TransportError>>>,
    pub queries: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<Vec<String>>>,
    fail_writes: Mutex<usize>,
}

impl RecordingTransport {
    /// Queue the result for the next query.
    pub fn respond(&self, tables: Vec<ResultTable>) {
        self.responses.lock().push_back(Ok(tables));
    }

    /// Queue a failure for the next query.
    pub fn fail_next_query(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(TransportError::Query(message.to_string())));
    }

    /// Fail the next `n` writes.
    pub fn fail_writes(&self, n: usize) {
        *self.fail_writes.lock() = n;
    }

    /// Number of lines in each recorded write.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.writes.lock().iter().map(Vec::len).collect()
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl QueryTransport for RecordingTransport {
    async fn query(&self, query: &str) -> Result<Vec<ResultTable>, TransportError> {
        self.queries.lock().push(query.to_string());
        self.responses.lock().pop_front().unwrap_or(Ok(Vec::new()))
    }
}

#[async_trait]
impl WriteTransport for RecordingTransport {
    async fn write(&self, lines: &str) -> Result<(), TransportError> {
        {
            let mut failures = self.fail_writes.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::Status {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
        }
        self.writes
            .lock()
            .push(lines.lines().map(ToString::to_string).collect());
        Ok(())
    }
}

/// A fresh recording transport.
#[fixture]
pub fn transport() -> Arc<RecordingTransport> {
    Arc::new(RecordingTransport::default())
}
