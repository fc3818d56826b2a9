//! Query text builders for both InfluxDB generations.
//!
//! [`InfluxQlQueryBuilder`] targets 1.x and [`FluxQueryBuilder`] targets 2.x.
//! Both implement [`QueryBuilder`] and produce queries with the same
//! semantics; the readers only differ in how they run them.

use chrono::{DateTime, Duration, Utc};

use crate::model::{TraceId, TraceQueryParameters};

pub mod flux;
pub mod influxql;

pub use flux::FluxQueryBuilder;
pub use influxql::InfluxQlQueryBuilder;

/// Padding applied around span start times when fetching whole traces.
///
/// Spans of one trace can start before the earliest or after the latest span
/// that matched a search.
pub const TRACE_RANGE_PADDING: Duration = Duration::hours(1);

/// Generates query text. Implementations never execute anything.
pub trait QueryBuilder: Send + Sync {
    /// Most recent trace ids matching the search, newest first.
    fn trace_id_query(&self, params: &TraceQueryParameters, now: DateTime<Utc>) -> String;

    /// Every span row of the given traces, grouped by trace id.
    ///
    /// For Flux this also returns the log rows, grouped by measurement.
    fn trace_query(&self, trace_ids: &[TraceId], range: &TimeRange) -> String;

    /// Service names from the discovery measurement.
    fn services_query(&self) -> String;

    /// Operation names recorded for a service.
    fn operations_query(&self, service: &str) -> String;

    /// Span id, service and references of spans in `(end - lookback, end]`.
    fn dependencies_query(&self, end: DateTime<Utc>, lookback: Duration) -> String;
}

/// A time window with an optional upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Search window for `params`, starting `default_lookback` before `now`
    /// when no minimum start time is given.
    #[must_use]
    pub fn for_search(
        params: &TraceQueryParameters,
        now: DateTime<Utc>,
        default_lookback: Duration,
    ) -> Self {
        Self {
            start: params.start_time_min.unwrap_or(now - default_lookback),
            end: params.start_time_max,
        }
    }

    /// The window widened by [`TRACE_RANGE_PADDING`] on both sides.
    #[must_use]
    pub fn padded(self) -> Self {
        Self {
            start: self.start - TRACE_RANGE_PADDING,
            end: self.end.map(|end| end + TRACE_RANGE_PADDING),
        }
    }
}
