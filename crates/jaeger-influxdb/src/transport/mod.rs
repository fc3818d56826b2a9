//! HTTP transports for InfluxDB.
//!
//! The readers and writer depend only on [`QueryTransport`] and
//! [`WriteTransport`]; [`V1Transport`] and [`V2Transport`] implement both
//! against the 1.x and 2.x HTTP APIs.

use async_trait::async_trait;

use crate::codec::ResultTable;
use crate::error::TransportError;

mod annotated_csv;
pub mod v1;
pub mod v2;

pub use v1::V1Transport;
pub use v2::V2Transport;

/// Runs query text and returns the result as tables.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn query(&self, query: &str) -> Result<Vec<ResultTable>, TransportError>;
}

/// Writes newline-joined line protocol.
#[async_trait]
pub trait WriteTransport: Send + Sync {
    async fn write(&self, lines: &str) -> Result<(), TransportError>;
}

/// Parse the configured host, keeping any path prefix when endpoints are joined.
fn base_url(host: &str) -> Result<url::Url, TransportError> {
    let mut url = url::Url::parse(host)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Turn a non-success response into [`TransportError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// The `error` or `message` member of a JSON error body, or the raw body.
fn error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<String>,
        message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| body.trim().to_string())
}
