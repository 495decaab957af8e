//! Error types and result aliases shared across the upsync components.
//!
//! Errors are structured for programmatic handling: the server crate maps
//! each variant onto a protocol fault or HTTP status in exactly one place.

use std::fmt;

/// The result type used throughout upsync.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving the synchronization protocol.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A read was attempted while no catalog is installed.
    #[error("no update catalog is installed")]
    CatalogUnavailable,

    /// A client-supplied revision number is not in the revision index.
    #[error("unknown revision {revision}")]
    UnknownRevision {
        /// The revision number the client presented.
        revision: i32,
    },

    /// The requested protocol operation is not implemented by this server.
    #[error("operation not implemented: {operation}")]
    NotImplemented {
        /// The protocol operation name.
        operation: String,
    },

    /// The content router could not resolve a key, or the store lacks the file.
    #[error("content not found: {key}")]
    ContentNotFound {
        /// The `directory/name` key that was looked up.
        key: String,
    },

    /// A metadata source operation failed.
    #[error("metadata source error: {message}")]
    Metadata {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An I/O failure on a metadata or content stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new metadata source error with the given message.
    #[must_use]
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new metadata source error with a source cause.
    #[must_use]
    pub fn metadata_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Metadata {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new not-implemented error for the named operation.
    #[must_use]
    pub fn not_implemented(operation: impl Into<String>) -> Self {
        Self::NotImplemented {
            operation: operation.into(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl fmt::Display) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }
}
