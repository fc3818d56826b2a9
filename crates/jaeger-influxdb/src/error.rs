//! Error types for the InfluxDB span store.

use crate::model::TraceId;

/// Result alias used throughout the store.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the reader and writer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// One or more columns of a result row could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A single-trace lookup matched no spans.
    #[error("trace not found: {trace_id}")]
    TraceNotFound {
        /// The requested trace.
        trace_id: TraceId,
    },

    /// The query result broke the one-trace-per-id grouping contract.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The transport failed to execute a query or write.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A write was attempted after the writer was closed.
    #[error("span writer is closed")]
    WriterClosed,

    /// A background query task panicked or was cancelled.
    #[error("query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invariant violation error.
    #[must_use]
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Whether this is the expected "no such trace" condition.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::TraceNotFound { .. })
    }
}

/// Errors raised by a query or write transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the server.
        message: String,
    },

    /// The response body could not be interpreted.
    #[error("malformed response: {0}")]
    Response(String),

    /// The engine reported an error for the query.
    #[error("query failed: {0}")]
    Query(String),

    /// Endpoint URL could not be built.
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors parsing hex span and trace identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Identifier string was empty.
    #[error("empty identifier")]
    Empty,

    /// Identifier has more hex digits than fit in the id.
    #[error("identifier {value:?} is longer than {max} hex digits")]
    TooLong {
        /// The rejected input.
        value: String,
        /// Maximum number of hex digits.
        max: usize,
    },

    /// Identifier contains non-hex characters.
    #[error("identifier {0:?} is not valid hex")]
    InvalidHex(String),
}

/// A single column that failed to decode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    /// Column name is neither reserved nor of the form `prefix:key`.
    #[error("unrecognized column {0:?}")]
    UnknownColumn(String),

    /// A required column is absent or null.
    #[error("missing column {0:?}")]
    MissingColumn(&'static str),

    /// Column holds a value of the wrong native type.
    #[error("column {column:?}: expected {expected}")]
    UnexpectedType {
        /// Column name.
        column: String,
        /// Expected value type.
        expected: &'static str,
    },

    /// Column value could not be parsed.
    #[error("column {column:?}: {reason}")]
    InvalidValue {
        /// Column name.
        column: String,
        /// Why parsing failed.
        reason: String,
    },

    /// Column holds an identifier that is not valid hex.
    #[error("column {column:?}: {source}")]
    Id {
        /// Column name.
        column: String,
        /// Underlying parse error.
        source: IdError,
    },
}

impl FieldError {
    /// Create an invalid-value error for a column.
    #[must_use]
    pub fn invalid(column: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidValue {
            column: column.into(),
            reason: reason.to_string(),
        }
    }
}

/// All column errors found while decoding one row.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to decode row: {}", join_errors(.errors))]
pub struct DecodeError {
    /// Every failure for the row, in column order.
    pub errors: Vec<FieldError>,
}

impl DecodeError {
    /// Wrap collected errors, returning `None` when there are none.
    #[must_use]
    pub fn from_errors(errors: Vec<FieldError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }
}

impl From<FieldError> for DecodeError {
    fn from(err: FieldError) -> Self {
        Self { errors: vec![err] }
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
