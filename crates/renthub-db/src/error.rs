//! Database error types.

use thiserror::Error;

use crate::Key;

/// Errors that can occur when using the entity store.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to open the store.
    #[error("Failed to open database: {0}")]
    OpenError(String),

    /// Failed to write the store snapshot.
    #[error("Failed to persist database: {0}")]
    PersistError(String),

    /// Failed to serialize or deserialize an entity.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A key read or written by the transaction changed before commit.
    #[error("Concurrent modification of {0}")]
    Conflict(Key),

    /// The transaction kept conflicting until the retry budget ran out.
    #[error("Transaction failed after {attempts} attempts due to contention")]
    TransactionConflict {
        /// Number of commit attempts made.
        attempts: u32,
    },

    /// The transaction touched more entity groups than allowed.
    #[error("Transaction touches too many entity groups (limit {limit})")]
    TooManyEntityGroups {
        /// Maximum number of groups for this transaction.
        limit: usize,
    },

    /// An entity that was required to exist is missing.
    #[error("Entity not found: {0}")]
    NotFound(Key),
}

impl DbError {
    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Conflict(_) | DbError::TransactionConflict { .. }
        )
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::SerializationError(e.to_string())
    }
}
