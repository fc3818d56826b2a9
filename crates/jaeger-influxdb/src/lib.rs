//! Jaeger span storage on InfluxDB.
//!
//! Spans are written as line protocol rows into three measurements and read
//! back with InfluxQL (InfluxDB 1.x) or Flux (InfluxDB 2.x):
//!
//! - `span`: one row per span, tags are indexed, ids and timings are fields
//! - `log`: one row per span log entry
//! - `span_meta`: service/operation markers used for discovery
//!
//! ## Architecture
//!
//! ```text
//! Span → codec::encode → BatchWriter → WriteTransport ─┐
//!                                                      ▼
//!                                                  InfluxDB
//!                                                      │
//! Trace ← correlate ← codec::decode ← QueryTransport ←─┘
//!                                          ▲
//!                        QueryBuilder (InfluxQL | Flux)
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod correlate;
pub mod dependencies;
pub mod error;
pub mod model;
pub mod query;
pub mod schema;
pub mod store;
pub mod transport;

#[cfg(test)]
pub mod test_fixtures;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use store::{DependencyReader, Reader, SpanReader, SpanWriter, Store};
