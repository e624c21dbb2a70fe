//! Error types for the KQL language worker
//!
//! Only caller contract violations surface as errors. Malformed query text,
//! malformed schema payloads and lookup misses are expected while a user is
//! typing and are represented as `None`, empty collections or degraded
//! values instead.

use thiserror::Error;

/// Errors that can occur when calling the KQL language worker
#[derive(Debug, Error)]
pub enum Error {
    /// A query referenced a document URI that was never registered
    #[error("Unknown document '{uri}'. Call set_document() before querying it.")]
    UnknownDocument { uri: String },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an unknown document error
    #[must_use]
    pub fn unknown_document(uri: impl Into<String>) -> Self {
        Self::UnknownDocument { uri: uri.into() }
    }
}
