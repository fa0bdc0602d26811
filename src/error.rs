//! Error handling for the specdash synchronization engine.

use crate::sync::{FetchKind, SyncState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A specialized `Result` type for specdash operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// The main error type for telemetry sources and the sync controller.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The telemetry source could not be reached or refused the request
    #[error("Telemetry source unavailable: {0}")]
    SourceUnavailable(String),

    /// A fetch did not complete within the configured timeout
    #[error("Telemetry fetch timed out: {0}")]
    Timeout(String),

    /// The response did not match the expected snapshot schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The controller was torn down before the operation completed
    #[error("Operation cancelled: controller has been torn down")]
    Cancelled,

    /// The requested intent is not valid in the current state
    #[error("Cannot {operation} while {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: SyncState,
    },

    /// A fetch of the same kind is already outstanding
    #[error("A {0:?} fetch is already in flight")]
    AlreadyInFlight(FetchKind),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic system error
    #[error("System error: {0}")]
    System(String),
}

/// Coarse error classification surfaced to renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    SourceUnavailable,
    Timeout,
    SchemaMismatch,
    Cancelled,
    Other,
}

/// Error details delivered to a [`Renderer`](crate::sync::Renderer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Classification of the failure
    pub kind: ErrorKind,
    /// Human readable description
    pub message: String,
    /// Which fetch kind failed
    pub fetch: FetchKind,
    /// When the failure was observed
    pub at: DateTime<Utc>,
}

impl SyncError {
    /// Create a new source-unavailable error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new schema mismatch error
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new generic system error
    #[allow(clippy::self_named_constructors)]
    pub fn system_error(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Classify this error for display purposes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }

    /// Build the renderer-facing description of this error.
    pub fn to_info(&self, fetch: FetchKind, at: DateTime<Utc>) -> ErrorInfo {
        ErrorInfo {
            kind: self.kind(),
            message: self.to_string(),
            fetch,
            at,
        }
    }
}
