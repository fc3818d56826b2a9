//! Tracing domain model: spans, traces and their identifiers.
//!
//! Identifiers render the way the Jaeger UI and query API expect them:
//! lowercase hex without leading zeros, with 128-bit trace ids written as
//! the high half followed by the zero-padded low half.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::IdError;

/// Default number of traces returned by a search with no explicit cap.
pub const DEFAULT_NUM_TRACES: usize = 20;

// ============================================================================
// Identifiers
// ============================================================================

/// A 128-bit trace identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId {
    /// Most significant 64 bits.
    pub high: u64,
    /// Least significant 64 bits.
    pub low: u64,
}

impl TraceId {
    /// Create a trace id from its two halves.
    #[must_use]
    pub const fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high == 0 {
            write!(f, "{:x}", self.low)
        } else {
            write!(f, "{:x}{:016x}", self.high, self.low)
        }
    }
}

impl FromStr for TraceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 32 {
            return Err(IdError::TooLong {
                value: s.to_string(),
                max: 32,
            });
        }
        if s.len() > 16 {
            let (high, low) = s.split_at(s.len() - 16);
            Ok(Self::new(parse_hex(high, s)?, parse_hex(low, s)?))
        } else {
            Ok(Self::new(0, parse_hex(s, s)?))
        }
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A 64-bit span identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpanId(pub u64);

impl SpanId {
    /// Whether this is the zero id used as a root-span placeholder.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 16 {
            return Err(IdError::TooLong {
                value: s.to_string(),
                max: 16,
            });
        }
        parse_hex(s, s).map(Self)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn parse_hex(digits: &str, whole: &str) -> Result<u64, IdError> {
    if digits.is_empty() {
        return Err(IdError::Empty);
    }
    // from_str_radix tolerates a leading '+', hex ids never carry one
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(IdError::InvalidHex(whole.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| IdError::InvalidHex(whole.to_string()))
}

// ============================================================================
// Key/value tags
// ============================================================================

/// A typed tag or log field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Binary(Vec<u8>),
}

/// A key with a typed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(flatten)]
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, Value::String(value.into()))
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, Value::Bool(value))
    }

    pub fn int64(key: impl Into<String>, value: i64) -> Self {
        Self::new(key, Value::Int64(value))
    }

    pub fn float64(key: impl Into<String>, value: f64) -> Self {
        Self::new(key, Value::Float64(value))
    }

    pub fn binary(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(key, Value::Binary(value.into()))
    }
}

// ============================================================================
// Spans and traces
// ============================================================================

/// Kind of edge between two spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefType {
    ChildOf,
    FollowsFrom,
}

impl RefType {
    /// Name used in the stored `references` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChildOf => "ChildOf",
            Self::FollowsFrom => "FollowsFrom",
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ChildOf" => Ok(Self::ChildOf),
            "FollowsFrom" => Ok(Self::FollowsFrom),
            other => Err(format!("unknown reference type {other:?}")),
        }
    }
}

/// A typed reference from one span to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpanRef {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub ref_type: RefType,
}

impl SpanRef {
    pub const fn child_of(trace_id: TraceId, span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            ref_type: RefType::ChildOf,
        }
    }

    pub const fn follows_from(trace_id: TraceId, span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            ref_type: RefType::FollowsFrom,
        }
    }
}

/// A timestamped event recorded on a span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Log {
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<KeyValue>,
}

/// The service that emitted a span.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Process {
    pub service_name: String,
    pub tags: Vec<KeyValue>,
}

impl Process {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            tags: Vec::new(),
        }
    }
}

/// One timed operation within a trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub operation_name: String,
    pub references: Vec<SpanRef>,
    pub flags: u32,
    /// Start time, microsecond resolution.
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub tags: Vec<KeyValue>,
    pub logs: Vec<Log>,
    pub process: Process,
}

impl Span {
    /// Create a span with no tags, logs or references.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        operation_name: impl Into<String>,
        process: Process,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            operation_name: operation_name.into(),
            references: Vec::new(),
            flags: 0,
            start_time,
            duration: Duration::ZERO,
            tags: Vec::new(),
            logs: Vec::new(),
            process,
        }
    }

    /// The span this one is a `ChildOf`, if any.
    #[must_use]
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.references
            .iter()
            .find(|r| r.ref_type == RefType::ChildOf && !r.span_id.is_zero())
            .map(|r| r.span_id)
    }
}

/// All spans sharing one trace id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trace {
    pub spans: Vec<Span>,
}

impl Trace {
    /// Trace id of the first span, if any.
    #[must_use]
    pub fn trace_id(&self) -> Option<TraceId> {
        self.spans.first().map(|s| s.trace_id)
    }
}

/// Aggregated calls from one service to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyLink {
    pub parent: String,
    pub child: String,
    pub call_count: u64,
}

/// An operation recorded for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub name: String,
    /// Span kind echoed from the request, the store does not index kinds.
    pub span_kind: String,
}

/// Filter for operation discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationQueryParameters {
    pub service_name: String,
    pub span_kind: String,
}

// ============================================================================
// Search criteria
// ============================================================================

/// Criteria for finding traces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceQueryParameters {
    pub service_name: Option<String>,
    pub operation_name: Option<String>,
    /// Tag equality predicates, compared against span and process tags.
    pub tags: BTreeMap<String, String>,
    pub start_time_min: Option<DateTime<Utc>>,
    pub start_time_max: Option<DateTime<Utc>>,
    pub duration_min: Option<Duration>,
    pub duration_max: Option<Duration>,
    /// Maximum number of traces, zero means [`DEFAULT_NUM_TRACES`].
    pub num_traces: usize,
}

impl TraceQueryParameters {
    /// The result cap with the default applied.
    #[must_use]
    pub const fn limit(&self) -> usize {
        if self.num_traces == 0 {
            DEFAULT_NUM_TRACES
        } else {
            self.num_traces
        }
    }
}
