//! Search index errors.

use thiserror::Error;

/// Errors raised by a search index.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The index backend rejected or failed an operation.
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// A document was malformed.
    #[error("Invalid document {doc_id}: {reason}")]
    InvalidDocument {
        /// Offending document id.
        doc_id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Failed to load or write the index file.
    #[error("Index persistence error: {0}")]
    Persist(String),
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Persist(e.to_string())
    }
}
