//! Reader for InfluxDB 1.x.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{in_id_order, single_trace, DependencyReader, SpanReader};
use crate::codec::{value, ResultTable};
use crate::config::Measurements;
use crate::correlate::{correlate_traces, trace_ids_from_tables};
use crate::dependencies::build_dependency_links;
use crate::error::StoreResult;
use crate::model::{
    DependencyLink, Operation, OperationQueryParameters, Trace, TraceId, TraceQueryParameters,
};
use crate::query::{InfluxQlQueryBuilder, QueryBuilder, TimeRange};
use crate::transport::QueryTransport;

/// Column holding tag values in `SHOW TAG VALUES` results.
const TAG_VALUE: &str = "value";

/// Reads spans with InfluxQL. Span and log rows are fetched concurrently.
pub struct V1Reader {
    transport: Arc<dyn QueryTransport>,
    builder: InfluxQlQueryBuilder,
    default_lookback: Duration,
}

impl V1Reader {
    pub fn new(
        transport: Arc<dyn QueryTransport>,
        measurements: Measurements,
        default_lookback: Duration,
    ) -> Self {
        Self {
            transport,
            builder: InfluxQlQueryBuilder::new(measurements, default_lookback),
            default_lookback,
        }
    }

    async fn tag_values(&self, query: &str) -> StoreResult<Vec<String>> {
        let tables = self.transport.query(query).await?;
        Ok(tables
            .iter()
            .flat_map(|t| t.strings(TAG_VALUE))
            .map(|s| value::unescape_newlines(&s))
            .collect())
    }

    /// Spans and logs of `trace_ids`, assembled into traces.
    async fn fetch_traces(
        &self,
        trace_ids: &[TraceId],
        range: &TimeRange,
    ) -> StoreResult<Vec<Trace>> {
        let span_query = self.builder.trace_query(trace_ids, range);
        let log_query = self.builder.log_query(trace_ids, range);

        let transport = Arc::clone(&self.transport);
        let spans = tokio::spawn(async move { transport.query(&span_query).await });

        let logs = match self.transport.query(&log_query).await {
            Ok(logs) => logs,
            Err(e) => {
                spans.abort();
                return Err(e.into());
            }
        };
        let spans: Vec<ResultTable> = spans.await??;

        Ok(correlate_traces(&spans, &logs)?)
    }

    async fn find_ids_at(
        &self,
        params: &TraceQueryParameters,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<TraceId>> {
        let tables = self
            .transport
            .query(&self.builder.trace_id_query(params, now))
            .await?;
        Ok(trace_ids_from_tables(&tables)?)
    }
}

#[async_trait]
impl SpanReader for V1Reader {
    async fn get_services(&self) -> StoreResult<Vec<String>> {
        self.tag_values(&self.builder.services_query()).await
    }

    async fn get_operations(
        &self,
        params: &OperationQueryParameters,
    ) -> StoreResult<Vec<Operation>> {
        let names = self
            .tag_values(&self.builder.operations_query(&params.service_name))
            .await?;
        Ok(names
            .into_iter()
            .map(|name| Operation {
                name,
                span_kind: params.span_kind.clone(),
            })
            .collect())
    }

    async fn get_trace(&self, trace_id: TraceId) -> StoreResult<Trace> {
        let range = TimeRange {
            start: Utc::now() - self.default_lookback,
            end: None,
        };
        let traces = self.fetch_traces(&[trace_id], &range).await?;
        single_trace(trace_id, traces)
    }

    async fn find_traces(&self, params: &TraceQueryParameters) -> StoreResult<Vec<Trace>> {
        let now = Utc::now();
        let trace_ids = self.find_ids_at(params, now).await?;
        if trace_ids.is_empty() {
            return Ok(Vec::new());
        }
        let range = TimeRange::for_search(params, now, self.default_lookback).padded();
        let traces = self.fetch_traces(&trace_ids, &range).await?;
        Ok(in_id_order(&trace_ids, traces))
    }

    async fn find_trace_ids(&self, params: &TraceQueryParameters) -> StoreResult<Vec<TraceId>> {
        self.find_ids_at(params, Utc::now()).await
    }
}

#[async_trait]
impl DependencyReader for V1Reader {
    async fn get_dependencies(
        &self,
        end: DateTime<Utc>,
        lookback: Duration,
    ) -> StoreResult<Vec<DependencyLink>> {
        let tables = self
            .transport
            .query(&self.builder.dependencies_query(end, lookback))
            .await?;
        Ok(build_dependency_links(&tables)?)
    }
}
