//! Reassembly of traces from span and log result sets.
//!
//! Spans and logs are stored as separate rows, so a trace read back from
//! InfluxDB arrives as two piles of rows. This module decodes both piles and
//! joins each log onto its span by `(trace id, span id)`.

use std::collections::HashMap;

use crate::codec::{decode_log, decode_span, ResultTable};
use crate::error::{DecodeError, FieldError};
use crate::model::{SpanId, Trace, TraceId};
use crate::schema;

/// Build traces from span tables and log tables.
///
/// Traces come back in the order their first span row appears. A span row
/// that fails to decode fails the whole call; a log row that fails to decode
/// is skipped, as is a log whose span is not in `span_tables`.
pub fn correlate_traces(
    span_tables: &[ResultTable],
    log_tables: &[ResultTable],
) -> Result<Vec<Trace>, DecodeError> {
    let mut traces: Vec<Trace> = Vec::new();
    let mut trace_index: HashMap<TraceId, usize> = HashMap::new();
    let mut span_index: HashMap<(TraceId, SpanId), (usize, usize)> = HashMap::new();

    for table in span_tables {
        let table = table.expand_group_key();
        for row in &table.rows {
            let span = decode_span(&table.columns, row)?;
            let trace_pos = *trace_index.entry(span.trace_id).or_insert_with(|| {
                traces.push(Trace::default());
                traces.len() - 1
            });
            let spans = &mut traces[trace_pos].spans;
            span_index.insert((span.trace_id, span.span_id), (trace_pos, spans.len()));
            spans.push(span);
        }
    }

    for table in log_tables {
        let table = table.expand_group_key();
        for row in &table.rows {
            let decoded = match decode_log(&table.columns, row) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable log row");
                    continue;
                }
            };
            match span_index.get(&(decoded.trace_id, decoded.span_id)) {
                Some(&(trace_pos, span_pos)) => {
                    traces[trace_pos].spans[span_pos].logs.push(decoded.log);
                }
                None => tracing::debug!(
                    trace_id = %decoded.trace_id,
                    span_id = %decoded.span_id,
                    "Dropping log without a matching span"
                ),
            }
        }
    }

    Ok(traces)
}

/// Separate a combined result into span tables and log tables.
///
/// The measurement is read from the group key, or from a `_measurement`
/// column when the engine did not group by it. Tables of any other
/// measurement are discarded.
pub fn split_by_measurement(
    tables: Vec<ResultTable>,
    span_measurement: &str,
    log_measurement: &str,
) -> (Vec<ResultTable>, Vec<ResultTable>) {
    let mut spans = Vec::new();
    let mut logs = Vec::new();
    for table in tables {
        match table.constant(schema::MEASUREMENT) {
            Some(m) if m == span_measurement => spans.push(table),
            Some(m) if m == log_measurement => logs.push(table),
            other => {
                if !table.is_empty() {
                    tracing::debug!(measurement = ?other, "Ignoring table of unexpected measurement");
                }
            }
        }
    }
    (spans, logs)
}

/// Distinct trace ids in result order, from a `trace_id` column or group key.
pub fn trace_ids_from_tables(tables: &[ResultTable]) -> Result<Vec<TraceId>, DecodeError> {
    let mut ids = Vec::new();
    for table in tables {
        for raw in table.strings(schema::TRACE_ID) {
            let id: TraceId = raw.parse().map_err(|source| FieldError::Id {
                column: schema::TRACE_ID.to_string(),
                source,
            })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_span, Datum};
    use crate::model::{Span, SpanRef};
    use crate::test_fixtures::{series_by_trace, span_a, span_b, trace_id};
    use rstest::rstest;

    fn points(spans: &[&Span]) -> Vec<crate::codec::Point> {
        spans
            .iter()
            .flat_map(|s| encode_span(s, "span", "log").points)
            .collect()
    }

    #[rstest]
    fn joins_logs_onto_spans(span_a: Span, span_b: Span, trace_id: TraceId) {
        let points = points(&[&span_a, &span_b]);
        let spans = series_by_trace(&points, "span");
        let logs = series_by_trace(&points, "log");

        let traces = correlate_traces(&spans, &logs).unwrap();

        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id(), Some(trace_id));
        let decoded_a = &traces[0].spans[0];
        assert_eq!(decoded_a.span_id, span_a.span_id);
        assert_eq!(decoded_a.logs, span_a.logs);
        let decoded_b = &traces[0].spans[1];
        assert!(decoded_b.logs.is_empty());
        assert_eq!(
            decoded_b.references,
            vec![SpanRef::child_of(trace_id, span_a.span_id)]
        );
    }

    #[rstest]
    fn keeps_first_seen_trace_order(span_a: Span, mut span_b: Span) {
        span_b.trace_id = TraceId::new(0, 0x42);
        span_b.references.clear();
        let points = points(&[&span_b, &span_a]);

        let traces = correlate_traces(&series_by_trace(&points, "span"), &[]).unwrap();

        let ids: Vec<_> = traces.iter().filter_map(Trace::trace_id).collect();
        assert_eq!(ids, vec![TraceId::new(0, 0x42), span_a.trace_id]);
    }

    #[rstest]
    fn drops_orphan_and_broken_logs(span_a: Span, span_b: Span) {
        let points = points(&[&span_a]);
        let spans = series_by_trace(&points, "span");
        let mut logs = series_by_trace(&points, "log");

        // a log for a span that was not fetched
        let orphan_points = points_with_log_for(&span_b);
        logs.extend(series_by_trace(&orphan_points, "log"));
        // a log row with an unknown value prefix
        let mut broken = ResultTable::new(vec!["time".into(), "span_id".into(), "k".into()])
            .with_group_key("trace_id", span_a.trace_id.to_string());
        broken.push_row(vec![
            Datum::Time(1),
            Datum::String(span_a.span_id.to_string()),
            Datum::String("zbad".into()),
        ]);
        logs.push(broken);

        let traces = correlate_traces(&spans, &logs).unwrap();

        assert_eq!(traces[0].spans[0].logs.len(), span_a.logs.len());
    }

    fn points_with_log_for(span: &Span) -> Vec<crate::codec::Point> {
        let mut span = span.clone();
        span.logs = vec![crate::model::Log {
            timestamp: span.start_time,
            fields: vec![crate::model::KeyValue::string("event", "orphan")],
        }];
        encode_span(&span, "span", "log").points
    }

    #[test]
    fn undecodable_span_fails() {
        let mut table = ResultTable::new(vec!["time".into(), "span_id".into()])
            .with_group_key("trace_id", "abc");
        table.push_row(vec![Datum::Time(1), Datum::String("not-hex".into())]);

        let err = correlate_traces(&[table], &[]).unwrap_err();
        assert!(err.to_string().contains("span_id"));
    }

    #[test]
    fn splits_on_group_key_or_column() {
        let grouped = ResultTable::new(vec!["span_id".into()]).with_group_key("_measurement", "span");
        let mut column = ResultTable::new(vec!["_measurement".into(), "span_id".into()]);
        column.push_row(vec![Datum::String("log".into()), Datum::String("1".into())]);
        let other = ResultTable::new(vec![]).with_group_key("_measurement", "span_meta");

        let (spans, logs) = split_by_measurement(vec![grouped, column, other], "span", "log");

        assert_eq!(spans.len(), 1);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].rows.len(), 1);
    }

    #[test]
    fn trace_ids_are_deduplicated() {
        let mut columns = ResultTable::new(vec!["trace_id".into()]);
        for id in ["abc", "def", "abc"] {
            columns.push_row(vec![Datum::String(id.into())]);
        }
        let grouped = ResultTable::new(vec!["duration".into()]).with_group_key("trace_id", "123");

        let ids = trace_ids_from_tables(&[columns, grouped]).unwrap();

        assert_eq!(
            ids,
            vec![
                TraceId::new(0, 0xabc),
                TraceId::new(0, 0xdef),
                TraceId::new(0, 0x123)
            ]
        );
    }

    #[test]
    fn bad_trace_id_is_an_error() {
        let mut table = ResultTable::new(vec!["trace_id".into()]);
        table.push_row(vec![Datum::String("xyz".into())]);
        assert!(trace_ids_from_tables(&[table]).is_err());
    }
}
