//! Shared error type across opsgenie crates.

use std::time::Duration;

use thiserror::Error;

/// Stable error categories (used as metric labels and in logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection failure, request timeout, body read failure.
    Transport,
    /// Non-success HTTP status.
    Status,
    /// Malformed or unexpected payload.
    Decode,
    /// Next-page cursor not resolvable under the base URL.
    Cursor,
    /// Pagination did not terminate within the page budget.
    PageLimit,
    /// Overall pipeline deadline exceeded.
    Timeout,
    /// Invalid configuration.
    Config,
    /// Internal error.
    Internal,
}

impl ErrorKind {
    /// String representation used in metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Status => "status",
            ErrorKind::Decode => "decode",
            ErrorKind::Cursor => "cursor",
            ErrorKind::PageLimit => "page_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Unified error type used by core and exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("unexpected status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },
    #[error("decode failed for {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
    #[error("cursor not under base url: {0}")]
    Cursor(String),
    #[error("pagination of {endpoint} exceeded {max_pages} pages")]
    PageLimit { endpoint: String, max_pages: usize },
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ExporterError {
    /// Map the error to its stable category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExporterError::Transport(_) => ErrorKind::Transport,
            ExporterError::Status { .. } => ErrorKind::Status,
            ExporterError::Decode { .. } => ErrorKind::Decode,
            ExporterError::Cursor(_) => ErrorKind::Cursor,
            ExporterError::PageLimit { .. } => ErrorKind::PageLimit,
            ExporterError::Timeout { .. } => ErrorKind::Timeout,
            ExporterError::Config(_) => ErrorKind::Config,
            ExporterError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Build a decode error from a serde failure.
    pub fn decode(endpoint: impl Into<String>, err: serde_json::Error) -> Self {
        ExporterError::Decode {
            endpoint: endpoint.into(),
            reason: err.to_string(),
        }
    }
}
