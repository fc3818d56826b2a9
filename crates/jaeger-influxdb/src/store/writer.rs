//! Span writer shared by both InfluxDB generations.

use std::sync::Arc;

use async_trait::async_trait;

use super::SpanWriter;
use crate::buffer::{BatchWriter, MetaCache};
use crate::codec::{encode_meta, encode_span};
use crate::config::{Measurements, WriterConfig};
use crate::error::{StoreError, StoreResult};
use crate::model::Span;
use crate::transport::WriteTransport;

/// Encodes spans to line protocol and hands them to a [`BatchWriter`].
///
/// A `span_meta` marker is added the first time a service/operation pair is
/// seen, and again once its cache entry has expired.
pub struct Writer {
    batch: BatchWriter,
    meta_cache: MetaCache,
    measurements: Measurements,
}

impl Writer {
    /// Start the flush task. Must be called within a tokio runtime.
    pub fn new(
        transport: Arc<dyn WriteTransport>,
        config: &WriterConfig,
        measurements: Measurements,
    ) -> Self {
        Self {
            batch: BatchWriter::start(transport, config),
            meta_cache: MetaCache::new(config.meta_cache_max_age()),
            measurements,
        }
    }
}

#[async_trait]
impl SpanWriter for Writer {
    async fn write_span(&self, span: &Span) -> StoreResult<()> {
        if self.batch.is_closed() {
            return Err(StoreError::WriterClosed);
        }

        let encoded = encode_span(span, &self.measurements.span, &self.measurements.log);
        for warning in &encoded.warnings {
            tracing::warn!(trace_id = %span.trace_id, "{warning}");
        }

        let mut lines = encoded.lines();
        if self.meta_cache.should_write(
            &span.process.service_name,
            &span.operation_name,
            span.start_time,
        ) {
            lines.push(
                encode_meta(
                    &self.measurements.span_meta,
                    &span.process.service_name,
                    &span.operation_name,
                    span.start_time,
                )
                .to_line(),
            );
        }

        for line in lines {
            self.batch.enqueue(line).await?;
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.batch.close().await;
        tracing::info!(cached_operations = self.meta_cache.len(), "Span writer closed");
        Ok(())
    }
}
