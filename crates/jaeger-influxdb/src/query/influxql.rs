//! InfluxQL queries for InfluxDB 1.x.
//!
//! Span and log rows are fetched by separate queries; both group by
//! `trace_id`, so the trace id comes back as a series tag rather than a column.

#![allow(clippy::format_push_string)]

use chrono::{DateTime, Duration, Utc};

use super::{QueryBuilder, TimeRange};
use crate::codec::{timestamp, value};
use crate::config::Measurements;
use crate::model::{TraceId, TraceQueryParameters};
use crate::schema;

/// Builds InfluxQL query text.
#[derive(Debug, Clone)]
pub struct InfluxQlQueryBuilder {
    measurements: Measurements,
    default_lookback: Duration,
}

impl InfluxQlQueryBuilder {
    pub const fn new(measurements: Measurements, default_lookback: Duration) -> Self {
        Self {
            measurements,
            default_lookback,
        }
    }

    /// Every log row of the given traces, grouped by trace id.
    #[must_use]
    pub fn log_query(&self, trace_ids: &[TraceId], range: &TimeRange) -> String {
        rows_by_trace(&self.measurements.log, trace_ids, range)
    }
}

impl QueryBuilder for InfluxQlQueryBuilder {
    fn trace_id_query(&self, params: &TraceQueryParameters, now: DateTime<Utc>) -> String {
        let range = TimeRange::for_search(params, now, self.default_lookback);

        let mut predicates = time_predicates(&range);
        if let Some(service) = &params.service_name {
            predicates.push(equals(schema::SERVICE_NAME, &value::escape_newlines(service)));
        }
        if let Some(operation) = &params.operation_name {
            predicates.push(equals(
                schema::OPERATION_NAME,
                &value::escape_newlines(operation),
            ));
        }
        for (key, query_value) in &params.tags {
            let column = schema::tag_column(&value::escape_newlines(key));
            let alternatives: Vec<String> = value::tag_candidates(query_value)
                .iter()
                .map(|candidate| equals(&column, candidate))
                .collect();
            predicates.push(format!("({})", alternatives.join(" or ")));
        }

        // One representative row per trace: the newest matching span.
        let inner = format!(
            "select {} from {} where {} group by {} order by time desc limit 1",
            ident(schema::DURATION),
            ident(&self.measurements.span),
            predicates.join(" and "),
            ident(schema::TRACE_ID),
        );

        let mut query = format!(
            "select {}, {} from ({inner})",
            ident(schema::TRACE_ID),
            ident(schema::DURATION)
        );

        // Duration is only known once the representative row is chosen.
        let mut duration_predicates = Vec::new();
        if let Some(min) = params.duration_min {
            duration_predicates.push(format!(
                "{} >= {}",
                ident(schema::DURATION),
                min.as_nanos()
            ));
        }
        if let Some(max) = params.duration_max {
            duration_predicates.push(format!(
                "{} <= {}",
                ident(schema::DURATION),
                max.as_nanos()
            ));
        }
        if !duration_predicates.is_empty() {
            query.push_str(&format!(" where {}", duration_predicates.join(" and ")));
        }

        query.push_str(&format!(" order by time desc limit {}", params.limit()));
        query
    }

    fn trace_query(&self, trace_ids: &[TraceId], range: &TimeRange) -> String {
        rows_by_trace(&self.measurements.span, trace_ids, range)
    }

    fn services_query(&self) -> String {
        format!(
            "SHOW TAG VALUES FROM {} WITH KEY = {}",
            ident(&self.measurements.span_meta),
            ident(schema::SERVICE_NAME)
        )
    }

    fn operations_query(&self, service: &str) -> String {
        format!(
            "SHOW TAG VALUES FROM {} WITH KEY = {} WHERE {}",
            ident(&self.measurements.span_meta),
            ident(schema::OPERATION_NAME),
            equals(schema::SERVICE_NAME, &value::escape_newlines(service))
        )
    }

    fn dependencies_query(&self, end: DateTime<Utc>, lookback: Duration) -> String {
        format!(
            "select {}, {}, {}, {} from {} where time > {} and time <= {}",
            ident(schema::TRACE_ID),
            ident(schema::SPAN_ID),
            ident(schema::SERVICE_NAME),
            ident(schema::REFERENCES),
            ident(&self.measurements.span),
            timestamp::unix_nanos(end - lookback),
            timestamp::unix_nanos(end),
        )
    }
}

fn rows_by_trace(measurement: &str, trace_ids: &[TraceId], range: &TimeRange) -> String {
    let ids: Vec<String> = trace_ids
        .iter()
        .map(|id| equals(schema::TRACE_ID, &id.to_string()))
        .collect();

    let mut predicates = vec![format!("({})", ids.join(" or "))];
    predicates.extend(time_predicates(range));

    format!(
        "select * from {} where {} group by {}",
        ident(measurement),
        predicates.join(" and "),
        ident(schema::TRACE_ID)
    )
}

fn time_predicates(range: &TimeRange) -> Vec<String> {
    let mut predicates = vec![format!("time >= {}", timestamp::unix_nanos(range.start))];
    if let Some(end) = range.end {
        predicates.push(format!("time <= {}", timestamp::unix_nanos(end)));
    }
    predicates
}

fn equals(column: &str, value: &str) -> String {
    format!("{} = {}", ident(column), literal(value))
}

/// Double-quoted identifier.
fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Single-quoted string literal.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
