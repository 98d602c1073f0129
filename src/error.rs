//! Error types for backup-ingest
//!
//! This module provides the error taxonomy for the library:
//! - Stage-specific error types (transfer, extraction, indexing, job store)
//! - Transient vs permanent classification (see [`crate::retry::IsRetryable`])
//! - HTTP status code mapping for the control API
//! - Structured error responses with machine-readable error codes

use crate::types::{JobId, Stage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for backup-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for backup-ingest
///
/// Each variant includes enough context to produce a useful diagnostic for a
/// failed job or an API response.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.chunk_size")
        key: Option<String>,
    },

    /// The persisted job store could not be read or written
    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    /// Archive transfer failed
    #[error("download failed: {0}")]
    Transfer(#[from] TransferError),

    /// Archive extraction failed
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Index build or query failed
    #[error("indexing failed: {0}")]
    Index(#[from] IndexError),

    /// Job lookup or state machine error
    #[error(transparent)]
    Job(#[from] JobError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error outside of a transfer (e.g., building the HTTP client)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Generic not-found for resources that are not jobs
    #[error("not found: {0}")]
    NotFound(String),

    /// The manager has not been started yet
    #[error("job manager is not running")]
    NotRunning,

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Errors from the persisted job store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store exists but could not be read
    #[error("cannot read job store {path}: {reason}")]
    Unreadable {
        /// Location of the store file
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// The store was read but does not contain valid job records
    #[error("job store {path} is corrupt: {reason}")]
    Corrupt {
        /// Location of the store file
        path: PathBuf,
        /// Parse failure
        reason: String,
    },

    /// Writing or replacing the store failed
    #[error("failed to write job store {path}: {reason}")]
    WriteFailed {
        /// Location of the store file
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },
}

/// Errors from a resumable archive transfer
#[derive(Debug, Error)]
pub enum TransferError {
    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Connection, timeout or body stream failure
    #[error("connection error: {0}")]
    Connection(String),

    /// The body ended before the announced size was reached
    #[error("transfer ended early: received {received} of {expected} bytes")]
    Incomplete {
        /// Bytes on disk when the stream ended
        received: u64,
        /// Announced total size
        expected: u64,
    },

    /// The resource does not have the size the server announced or the file on disk implies
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size the server announced
        expected: u64,
        /// Size observed
        actual: u64,
    },

    /// The server response could not be interpreted (bad Content-Range, etc.)
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built (invalid URL, unsupported scheme)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Writing the destination file failed
    #[error("failed to write archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from archive extraction
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// An entry would resolve outside the target directory
    #[error("unsafe archive entry {entry:?}: {reason}")]
    UnsafePath {
        /// Entry name as stored in the archive
        entry: String,
        /// Why the entry was rejected
        reason: String,
    },

    /// The archive structure is unreadable
    #[error("corrupt archive {archive}: {reason}")]
    Corrupt {
        /// Archive being extracted
        archive: PathBuf,
        /// Reader failure
        reason: String,
    },

    /// Not enough free space on the target filesystem
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Sum of uncompressed entry sizes
        required: u64,
        /// Free bytes on the target filesystem
        available: u64,
    },

    /// Filesystem failure while writing the tree
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The blocking extraction task did not finish
    #[error("extraction task failed: {0}")]
    TaskFailed(String),
}

/// Errors from building or querying a search index
#[derive(Debug, Error)]
pub enum IndexError {
    /// The source tree produced no documents
    #[error("no indexable documents found in {source_path}")]
    NoDocuments {
        /// Directory or file that was ingested
        source_path: PathBuf,
    },

    /// A document file could not be parsed
    #[error("malformed document {path}: {reason}")]
    Malformed {
        /// Offending file
        path: PathBuf,
        /// Parse failure
        reason: String,
    },

    /// SQLite failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking discovery task did not finish
    #[error("index task failed: {0}")]
    TaskFailed(String),
}

/// Job lookup and state machine errors
#[derive(Debug, Error)]
pub enum JobError {
    /// No job with this id exists
    #[error("job {id} not found")]
    NotFound {
        /// The requested job id
        id: JobId,
    },

    /// The job has not reached `completed`, so its index cannot be searched
    #[error("job {id} is not ready for search (stage: {stage})")]
    NotReady {
        /// The job id
        id: JobId,
        /// Current stage
        stage: Stage,
    },

    /// A stage change outside the allowed edges was requested
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The job id
        id: JobId,
        /// Current stage
        from: Stage,
        /// Requested stage
        to: Stage,
    },

    /// The operation is not allowed in the current stage
    #[error("cannot {operation} job {id} in stage {current}")]
    InvalidState {
        /// The job id
        id: JobId,
        /// The operation that was attempted (e.g., "retry")
        operation: String,
        /// Current stage
        current: Stage,
    },

    /// The submitted source URL is unusable
    #[error("invalid source URL {url:?}: {reason}")]
    InvalidUrl {
        /// The submitted URL
        url: String,
        /// Why it was rejected
        reason: String,
    },
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_ready",
///     "message": "job 01J... is not ready for search (stage: indexing)",
///     "details": {
///       "job_id": "01J...",
///       "stage": "indexing"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::Config { .. } => 400,
            Error::Job(JobError::InvalidUrl { .. }) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Job(JobError::NotFound { .. }) => 404,

            // 409 Conflict - job is in the wrong stage for the request
            Error::Job(JobError::NotReady { .. }) => 409,
            Error::Job(JobError::InvalidState { .. }) => 409,
            Error::Job(JobError::InvalidTransition { .. }) => 409,

            // 422 Unprocessable Entity - the archive or its contents are unusable
            Error::Extraction(_) => 422,
            Error::Index(IndexError::NoDocuments { .. }) => 422,
            Error::Index(IndexError::Malformed { .. }) => 422,

            // 502 Bad Gateway - the remote source misbehaved
            Error::Transfer(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::NotRunning => 503,
            Error::ShuttingDown => 503,

            // 500 Internal Server Error
            Error::Store(_) => 500,
            Error::Index(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Store(_) => "store_error",
            Error::Transfer(e) => match e {
                TransferError::HttpStatus { .. } => "upstream_status",
                TransferError::SizeMismatch { .. } => "size_mismatch",
                _ => "transfer_failed",
            },
            Error::Extraction(e) => match e {
                ExtractionError::UnsafePath { .. } => "unsafe_archive_entry",
                ExtractionError::InsufficientSpace { .. } => "insufficient_space",
                _ => "extraction_failed",
            },
            Error::Index(e) => match e {
                IndexError::NoDocuments { .. } => "no_documents",
                IndexError::Malformed { .. } => "malformed_document",
                _ => "index_error",
            },
            Error::Job(e) => match e {
                JobError::NotFound { .. } => "job_not_found",
                JobError::NotReady { .. } => "not_ready",
                JobError::InvalidTransition { .. } => "invalid_transition",
                JobError::InvalidState { .. } => "invalid_state",
                JobError::InvalidUrl { .. } => "invalid_url",
            },
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::NotFound(_) => "not_found",
            Error::NotRunning => "not_running",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Job(JobError::NotFound { id }) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Job(JobError::NotReady { id, stage }) => Some(serde_json::json!({
                "job_id": id,
                "stage": stage,
            })),
            Error::Job(JobError::InvalidState {
                id,
                operation,
                current,
            }) => Some(serde_json::json!({
                "job_id": id,
                "operation": operation,
                "current_stage": current,
            })),
            Error::Job(JobError::InvalidUrl { url, .. }) => Some(serde_json::json!({
                "url": url,
            })),
            Error::Extraction(ExtractionError::InsufficientSpace {
                required,
                available,
            }) => Some(serde_json::json!({
                "required_bytes": required,
                "available_bytes": available,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
