//! Common test utilities for store integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::DateTime;
use jaeger_influxdb::codec::{Datum, FieldValue, Point, ResultTable};
use jaeger_influxdb::model::{KeyValue, Log, Process, Span, SpanId, SpanRef, TraceId};
use parking_lot::Mutex;
use tokio::net::TcpListener;

// ============================================================================
// Spans
// ============================================================================

pub fn trace_id() -> TraceId {
    TraceId::new(0, 0xabc)
}

/// Root span of `service` with one tag and one log.
pub fn root_span(service: &str, span_id: u64) -> Span {
    let mut span = Span::new(
        trace_id(),
        SpanId(span_id),
        "GET /",
        Process::new(service),
        DateTime::from_timestamp(1_550_013_480, 0).unwrap(),
    );
    span.duration = Duration::from_millis(30);
    span.tags = vec![KeyValue::int64("http.status_code", 200)];
    span.logs = vec![Log {
        timestamp: DateTime::from_timestamp(1_550_013_480, 5_000_000).unwrap(),
        fields: vec![KeyValue::string("event", "request received")],
    }];
    span
}

/// Child of `parent` in `service`.
pub fn child_span(service: &str, span_id: u64, parent: u64) -> Span {
    let mut span = Span::new(
        trace_id(),
        SpanId(span_id),
        "SELECT",
        Process::new(service),
        DateTime::from_timestamp(1_550_013_480, 10_000_000).unwrap(),
    );
    span.duration = Duration::from_millis(5);
    span.references = vec![SpanRef::child_of(trace_id(), SpanId(parent))];
    span
}

// ============================================================================
// Result tables
// ============================================================================

/// Rows of one measurement grouped by trace id, the way InfluxQL returns them
/// for `group by "trace_id"`.
pub fn tables_by_trace(points: &[Point], measurement: &str) -> Vec<ResultTable> {
    let rows: Vec<&Point> = points
        .iter()
        .filter(|p| p.measurement() == measurement)
        .collect();
    let mut trace_ids: Vec<&String> = Vec::new();
    for point in &rows {
        if let Some(id) = point.tags().get("trace_id") {
            if !trace_ids.contains(&id) {
                trace_ids.push(id);
            }
        }
    }

    trace_ids
        .into_iter()
        .map(|trace_id| {
            let members: Vec<&&Point> = rows
                .iter()
                .filter(|p| p.tags().get("trace_id") == Some(trace_id))
                .collect();
            let keys: BTreeSet<&String> = members
                .iter()
                .flat_map(|p| p.tags().keys().chain(p.fields().keys()))
                .filter(|k| k.as_str() != "trace_id")
                .collect();

            let mut columns = vec!["time".to_string()];
            columns.extend(keys.iter().map(|k| (*k).clone()));
            let mut table = ResultTable::new(columns).with_group_key("trace_id", trace_id);
            for point in members {
                let mut row = vec![Datum::Time(point.timestamp())];
                row.extend(keys.iter().map(|key| cell(point, key)));
                table.push_row(row);
            }
            table
        })
        .collect()
}

fn cell(point: &Point, key: &str) -> Datum {
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
// Stub InfluxDB
// ============================================================================

/// A request the stub received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: &'static str,
    pub params: HashMap<String, String>,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Default)]
pub struct StubState {
    pub requests: Mutex<Vec<Recorded>>,
    responses: Mutex<VecDeque<(StatusCode, String)>>,
}

impl StubState {
    fn record(
        &self,
        path: &'static str,
        params: HashMap<String, String>,
        headers: &HeaderMap,
        body: String,
    ) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        self.requests.lock().push(Recorded {
            path,
            params,
            authorization,
            body,
        });
    }

    fn next_response(&self) -> (StatusCode, String) {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or((StatusCode::OK, r#"{"results":[{"statement_id":0}]}"#.to_string()))
    }

    /// Requests to one path, in arrival order.
    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

/// An InfluxDB stand-in serving the 1.x and 2.x endpoints on a local port.
pub struct StubInflux {
    pub addr: SocketAddr,
    pub state: Arc<StubState>,
}

impl StubInflux {
    pub async fn start() -> Self {
        let state = Arc::new(StubState::default());
        let app = Router::new()
            .route("/query", get(v1_query))
            .route("/write", post(v1_write))
            .route("/api/v2/orgs", get(v2_orgs))
            .route("/api/v2/buckets", get(v2_buckets))
            .route("/api/v2/query", post(v2_query))
            .route("/api/v2/write", post(v2_write))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue the status and body of the next `/query` or `/api/v2/query` answer.
    pub fn respond(&self, status: StatusCode, body: impl Into<String>) {
        self.state.responses.lock().push_back((status, body.into()));
    }
}

type Params = Query<HashMap<String, String>>;

async fn v1_query(
    State(state): State<Arc<StubState>>,
    Query(params): Params,
    headers: HeaderMap,
) -> (StatusCode, String) {
    state.record("/query", params, &headers, String::new());
    state.next_response()
}

async fn v1_write(
    State(state): State<Arc<StubState>>,
    Query(params): Params,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    state.record("/write", params, &headers, body);
    StatusCode::NO_CONTENT
}

async fn v2_orgs(
    State(state): State<Arc<StubState>>,
    Query(params): Params,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    state.record("/api/v2/orgs", params, &headers, String::new());
    Json(serde_json::json!({"orgs": [{"id": "0a1b", "name": "acme"}]}))
}

async fn v2_buckets(
    State(state): State<Arc<StubState>>,
    Query(params): Params,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let found = params.get("name").map(String::as_str) == Some("jaeger");
    state.record("/api/v2/buckets", params, &headers, String::new());
    if found {
        Json(serde_json::json!({"buckets": [{"id": "b0b0", "name": "jaeger"}]}))
    } else {
        Json(serde_json::json!({"buckets": []}))
    }
}

async fn v2_query(
    State(state): State<Arc<StubState>>,
    Query(params): Params,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    state.record("/api/v2/query", params, &headers, body);
    state.next_response()
}

async fn v2_write(
    State(state): State<Arc<StubState>>,
    Query(params): Params,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    state.record("/api/v2/write", params, &headers, body);
    StatusCode::NO_CONTENT
}
