//! Span reader and writer backed by InfluxDB.
//!
//! ```text
//!                 ┌──────────── Store ────────────┐
//! write_span ───► │ Writer ─► BatchWriter ────────┼─► WriteTransport
//!                 │                               │
//! find_traces ──► │ V1Reader | V2Reader           │
//!                 │   QueryBuilder ─► query text ─┼─► QueryTransport
//!                 │   correlate ◄──── tables ◄────┼──┘
//!                 └───────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::config::{Backend, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    DependencyLink, Operation, OperationQueryParameters, Span, Trace, TraceId,
    TraceQueryParameters,
};
use crate::transport::{V1Transport, V2Transport};

mod v1;
mod v2;
mod writer;

pub use v1::V1Reader;
pub use v2::V2Reader;
pub use writer::Writer;

/// Trace lookup and search.
#[async_trait]
pub trait SpanReader: Send + Sync {
    /// Every service that has written spans.
    async fn get_services(&self) -> StoreResult<Vec<String>>;

    /// Operations recorded for a service.
    async fn get_operations(
        &self,
        params: &OperationQueryParameters,
    ) -> StoreResult<Vec<Operation>>;

    /// One trace with all its spans and logs.
    async fn get_trace(&self, trace_id: TraceId) -> StoreResult<Trace>;

    /// Traces matching the search, newest first.
    async fn find_traces(&self, params: &TraceQueryParameters) -> StoreResult<Vec<Trace>>;

    /// Ids of traces matching the search, newest first.
    async fn find_trace_ids(&self, params: &TraceQueryParameters) -> StoreResult<Vec<TraceId>>;
}

/// Service call graph over a time window.
#[async_trait]
pub trait DependencyReader: Send + Sync {
    /// Links between services for spans in `(end - lookback, end]`.
    async fn get_dependencies(
        &self,
        end: DateTime<Utc>,
        lookback: Duration,
    ) -> StoreResult<Vec<DependencyLink>>;
}

/// Span ingestion.
#[async_trait]
pub trait SpanWriter: Send + Sync {
    /// Queue a span for writing. Returns once the rows are queued, not stored.
    async fn write_span(&self, span: &Span) -> StoreResult<()>;

    /// Flush queued rows and stop accepting spans.
    async fn close(&self) -> StoreResult<()>;
}

/// Both read interfaces, for holding one reader behind a single trait object.
pub trait Reader: SpanReader + DependencyReader {}

impl<T: SpanReader + DependencyReader> Reader for T {}

/// A connected reader and writer for one InfluxDB instance.
pub struct Store {
    reader: Arc<dyn Reader>,
    writer: Writer,
}

impl Store {
    /// Connect to the InfluxDB generation the configuration describes.
    ///
    /// Spawns the writer's flush task, so this must run inside a tokio runtime.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let backend = config.backend()?;
        config.host_url()?;
        let measurements = config.measurements.clone();

        let store = match backend {
            Backend::V1 => {
                let transport = Arc::new(V1Transport::new(config)?);
                Self {
                    reader: Arc::new(V1Reader::new(
                        transport.clone(),
                        measurements.clone(),
                        config.default_lookback(),
                    )),
                    writer: Writer::new(transport, &config.writer, measurements),
                }
            }
            Backend::V2 => {
                let transport = Arc::new(V2Transport::connect(config).await?);
                Self {
                    reader: Arc::new(V2Reader::new(
                        transport.clone(),
                        config.v2.bucket.clone(),
                        measurements.clone(),
                        config.default_lookback(),
                    )),
                    writer: Writer::new(transport, &config.writer, measurements),
                }
            }
        };

        tracing::info!(backend = ?backend, host = %config.host, "Connected to InfluxDB");
        Ok(store)
    }

    pub fn reader(&self) -> Arc<dyn Reader> {
        Arc::clone(&self.reader)
    }

    pub const fn writer(&self) -> &Writer {
        &self.writer
    }

    /// Flush and stop the writer.
    pub async fn close(&self) -> StoreResult<()> {
        self.writer.close().await
    }
}

/// The only trace in `traces`, which was fetched for `trace_id`.
fn single_trace(trace_id: TraceId, mut traces: Vec<Trace>) -> StoreResult<Trace> {
    match traces.len() {
        0 => Err(StoreError::TraceNotFound { trace_id }),
        1 => Ok(traces.remove(0)),
        n => {
            tracing::error!(
                trace_id = %trace_id,
                traces = n,
                "Trace lookup returned more than one trace"
            );
            Err(StoreError::invariant(format!(
                "lookup of trace {trace_id} returned {n} traces"
            )))
        }
    }
}

/// `traces` reordered to follow `trace_ids`, which carry the search ranking.
fn in_id_order(trace_ids: &[TraceId], mut traces: Vec<Trace>) -> Vec<Trace> {
    traces.sort_by_key(|trace| {
        trace
            .trace_id()
            .and_then(|id| trace_ids.iter().position(|candidate| *candidate == id))
            .unwrap_or(usize::MAX)
    });
    traces
}
