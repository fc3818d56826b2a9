//! Flux queries for InfluxDB 2.x.
//!
//! Flux returns one row per field, so span and log queries pivot fields back
//! into columns. Spans and logs are fetched together and told apart by the
//! `_measurement` group column.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use super::{QueryBuilder, TimeRange};
use crate::codec::value;
use crate::config::Measurements;
use crate::model::{TraceId, TraceQueryParameters};
use crate::schema;

const PIPE: &str = "\n |> ";
const PIVOT: &str = r#"pivot(rowKey:["_time"], columnKey:["_field"], valueColumn:"_value")"#;

/// Builds Flux query text for one bucket.
#[derive(Debug, Clone)]
pub struct FluxQueryBuilder {
    bucket: String,
    measurements: Measurements,
    default_lookback: Duration,
}

impl FluxQueryBuilder {
    pub fn new(bucket: impl Into<String>, measurements: Measurements, default_lookback: Duration) -> Self {
        Self {
            bucket: bucket.into(),
            measurements,
            default_lookback,
        }
    }

    fn from_bucket(&self) -> String {
        format!("from(bucket: {})", string(&self.bucket))
    }
}

impl QueryBuilder for FluxQueryBuilder {
    fn trace_id_query(&self, params: &TraceQueryParameters, now: DateTime<Utc>) -> String {
        let range = TimeRange::for_search(params, now, self.default_lookback);

        let mut predicates = vec![
            field_equals(schema::MEASUREMENT, &self.measurements.span),
            field_equals(schema::FIELD, schema::DURATION),
        ];
        if let Some(service) = &params.service_name {
            predicates.push(field_equals(schema::SERVICE_NAME, &value::escape_newlines(service)));
        }
        if let Some(operation) = &params.operation_name {
            predicates.push(field_equals(
                schema::OPERATION_NAME,
                &value::escape_newlines(operation),
            ));
        }
        for (key, query_value) in &params.tags {
            let column = schema::tag_column(&value::escape_newlines(key));
            let alternatives: Vec<String> = value::tag_candidates(query_value)
                .iter()
                .map(|candidate| field_equals(&column, candidate))
                .collect();
            predicates.push(format!("({})", alternatives.join(" or ")));
        }

        let mut stages = vec![
            self.from_bucket(),
            range_stage(&range),
            filter(&predicates),
            format!("group(columns: [{}])", string(schema::TRACE_ID)),
            r#"sort(columns: ["_time"])"#.to_string(),
            // newest span of each trace
            "last()".to_string(),
        ];

        let mut duration_predicates = Vec::new();
        if let Some(min) = params.duration_min {
            duration_predicates.push(format!("r._value >= {}", min.as_nanos()));
        }
        if let Some(max) = params.duration_max {
            duration_predicates.push(format!("r._value <= {}", max.as_nanos()));
        }
        if !duration_predicates.is_empty() {
            stages.push(filter(&duration_predicates));
        }

        stages.push(format!(
            "keep(columns: [\"_time\", {}])",
            string(schema::TRACE_ID)
        ));
        stages.push("group()".to_string());
        stages.push(r#"sort(columns: ["_time"], desc: true)"#.to_string());
        stages.push(format!("limit(n: {})", params.limit()));
        stages.push(format!("keep(columns: [{}])", string(schema::TRACE_ID)));

        stages.join(PIPE)
    }

    fn trace_query(&self, trace_ids: &[TraceId], range: &TimeRange) -> String {
        let ids: Vec<String> = trace_ids
            .iter()
            .map(|id| field_equals(schema::TRACE_ID, &id.to_string()))
            .collect();
        let measurements = format!(
            "({} or {})",
            field_equals(schema::MEASUREMENT, &self.measurements.span),
            field_equals(schema::MEASUREMENT, &self.measurements.log)
        );

        [
            self.from_bucket(),
            range_stage(range),
            filter(&[measurements, format!("({})", ids.join(" or "))]),
            PIVOT.to_string(),
            format!(
                "group(columns: [{}, {}])",
                string(schema::MEASUREMENT),
                string(schema::TRACE_ID)
            ),
            format!(
                "drop(columns: [{}, {}])",
                string(schema::START),
                string(schema::STOP)
            ),
        ]
        .join(PIPE)
    }

    fn services_query(&self) -> String {
        format!(
            "import \"influxdata/influxdb/v1\"\nv1.measurementTagValues(bucket: {}, measurement: {}, tag: {})",
            string(&self.bucket),
            string(&self.measurements.span_meta),
            string(schema::SERVICE_NAME)
        )
    }

    fn operations_query(&self, service: &str) -> String {
        format!(
            "import \"influxdata/influxdb/v1\"\nv1.tagValues(bucket: {}, tag: {}, predicate: (r) => {} and {})",
            string(&self.bucket),
            string(schema::OPERATION_NAME),
            field_equals(schema::MEASUREMENT, &self.measurements.span_meta),
            field_equals(schema::SERVICE_NAME, &value::escape_newlines(service))
        )
    }

    fn dependencies_query(&self, end: DateTime<Utc>, lookback: Duration) -> String {
        let range = TimeRange {
            start: end - lookback,
            end: Some(end),
        };
        let fields = format!(
            "({} or {})",
            field_equals(schema::FIELD, schema::SPAN_ID),
            field_equals(schema::FIELD, schema::REFERENCES)
        );

        [
            self.from_bucket(),
            range_stage(&range),
            filter(&[field_equals(schema::MEASUREMENT, &self.measurements.span), fields]),
            PIVOT.to_string(),
            "group()".to_string(),
            format!(
                "keep(columns: [{}, {}, {}, {}])",
                string(schema::TRACE_ID),
                string(schema::SPAN_ID),
                string(schema::REFERENCES),
                string(schema::SERVICE_NAME)
            ),
        ]
        .join(PIPE)
    }
}

fn range_stage(range: &TimeRange) -> String {
    match range.end {
        Some(end) => format!("range(start: {}, stop: {})", time(range.start), time(end)),
        None => format!("range(start: {})", time(range.start)),
    }
}

fn filter(predicates: &[String]) -> String {
    format!("filter(fn: (r) => {})", predicates.join(" and "))
}

/// `r.column == "value"`, with bracket access for columns that are not
/// plain identifiers.
fn field_equals(column: &str, value: &str) -> String {
    format!("{} == {}", record_access(column), string(value))
}

fn record_access(column: &str) -> String {
    let plain = column
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        format!("r.{column}")
    } else {
        format!("r[{}]", string(column))
    }
}

fn time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Double-quoted Flux string literal.
fn string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
