//! Spans written through the codec come back unchanged through the read path.

mod common;

use common::{child_span, root_span, tables_by_trace, trace_id};
use jaeger_influxdb::codec::{encode_span, Point};
use jaeger_influxdb::correlate::{correlate_traces, split_by_measurement};
use jaeger_influxdb::dependencies::build_dependency_links;
use jaeger_influxdb::model::{DependencyLink, Span};

fn points(spans: &[&Span]) -> Vec<Point> {
    spans
        .iter()
        .flat_map(|s| encode_span(s, "span", "log").points)
        .collect()
}

#[test]
fn written_trace_reads_back_identically() {
    let root = root_span("svc-a", 1);
    let child = child_span("svc-a", 2, 1);
    let points = points(&[&root, &child]);

    let traces = correlate_traces(
        &tables_by_trace(&points, "span"),
        &tables_by_trace(&points, "log"),
    )
    .unwrap();

    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].trace_id(), Some(trace_id()));
    assert_eq!(traces[0].spans, vec![root, child]);
}

#[test]
fn combined_flux_result_is_split_by_measurement() {
    let root = root_span("svc-a", 1);
    let points = points(&[&root]);
    let tables = ["span", "log", "span_meta"]
        .into_iter()
        .flat_map(|m| {
            tables_by_trace(&points, m)
                .into_iter()
                .map(move |t| t.with_group_key("_measurement", m))
        })
        .collect();

    let (spans, logs) = split_by_measurement(tables, "span", "log");
    let traces = correlate_traces(&spans, &logs).unwrap();

    assert_eq!(traces[0].spans, vec![root]);
}

#[test]
fn dependencies_follow_child_of_references() {
    let points = points(&[
        &root_span("frontend", 1),
        &child_span("backend", 2, 1),
        &child_span("backend", 3, 1),
        &child_span("backend", 4, 3),
        &child_span("db", 5, 4),
    ]);

    let links = build_dependency_links(&tables_by_trace(&points, "span")).unwrap();

    assert_eq!(
        links,
        vec![
            DependencyLink {
                parent: "backend".into(),
                child: "db".into(),
                call_count: 1,
            },
            DependencyLink {
                parent: "frontend".into(),
                child: "backend".into(),
                call_count: 2,
            },
        ]
    );
}
