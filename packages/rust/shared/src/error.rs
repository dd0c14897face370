//! Error types for webextract.
//!
//! Library crates use [`WebExtractError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::sync::Arc;

/// A single rejected field in a validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the offending field (`attributes[2].name`).
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Top-level error type for all webextract operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WebExtractError {
    /// Browser launch, navigation, or content extraction failed.
    #[error("scrape failure: {message}")]
    Scrape { message: String },

    /// Embedding request or vector index write failed.
    #[error("embedding failure: {0}")]
    Embedding(String),

    /// Vector index query failed.
    #[error("retrieval failure: {0}")]
    Retrieval(String),

    /// Context cache backend failed.
    #[error("cache failure: {0}")]
    Cache(String),

    /// The request's wall-clock budget elapsed.
    #[error("request timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// Too many requests from one caller within the window.
    #[error("too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The language-model collaborator failed.
    #[error("model error: {0}")]
    Model(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside the typed stages above.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: Arc<std::io::Error>,
    },

    /// Request validation error.
    #[error("validation error: {message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WebExtractError>;

impl WebExtractError {
    /// Create a scrape error from any displayable message.
    pub fn scrape(msg: impl Into<String>) -> Self {
        Self::Scrape {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error without per-field details.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            details: Vec::new(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Stable identifier for the error kind, used in response envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Scrape { .. } => "SCRAPE_FAILURE",
            Self::Embedding(_) => "EMBEDDING_FAILURE",
            Self::Retrieval(_) => "RETRIEVAL_FAILURE",
            Self::Cache(_) => "CACHE_FAILURE",
            Self::Timeout { .. } => "REQUEST_TIMEOUT",
            Self::RateLimited { .. } => "TOO_MANY_REQUESTS",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Model(_) => "MODEL_FAILURE",
            Self::Config { .. }
            | Self::Network(_)
            | Self::Storage(_)
            | Self::Io { .. } => "INTERNAL_SERVER_ERROR",
        }
    }
}
