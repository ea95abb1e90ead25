//! Marketplace error types.

use renthub_db::DbError;
use renthub_search::SearchError;
use renthub_tasks::TaskError;
use thiserror::Error;

/// Errors that can occur in marketplace operations.
#[derive(Error, Debug)]
pub enum MarketError {
    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    MissingEntity { kind: String, id: String },

    /// A transaction kept conflicting until its retry budget ran out.
    #[error("Transaction failed after {attempts} attempts due to contention")]
    TransactionConflict { attempts: u32 },

    /// Dirty flags were cleared but the index update that should follow
    /// them failed. The listed products stay stale until audited.
    #[error("Search index left stale for {} product(s): {reason}", products.len())]
    IndexReconciliationGap {
        products: Vec<String>,
        reason: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(DbError),

    /// Search index error.
    #[error("Search index error: {0}")]
    Search(#[from] SearchError),

    /// Task queue error.
    #[error("Task queue error: {0}")]
    Task(#[from] TaskError),

    /// Invalid input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The payment verifier could not be reached or answered nonsense.
    #[error("Payment verification failed: {0}")]
    PaymentVerification(String),
}

impl MarketError {
    /// A missing entity of type `E`.
    pub fn missing<E: renthub_db::Entity>(id: impl Into<String>) -> Self {
        MarketError::MissingEntity {
            kind: E::KIND.to_string(),
            id: id.into(),
        }
    }

    /// Whether retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            MarketError::TransactionConflict { .. }
            | MarketError::IndexReconciliationGap { .. }
            | MarketError::Search(_)
            | MarketError::PaymentVerification(_) => true,
            MarketError::Database(e) => e.is_retryable(),
            MarketError::MissingEntity { .. }
            | MarketError::Task(_)
            | MarketError::Validation(_) => false,
        }
    }
}

impl From<DbError> for MarketError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::TransactionConflict { attempts } => {
                MarketError::TransactionConflict { attempts }
            }
            DbError::NotFound(key) => MarketError::MissingEntity {
                kind: key.kind().to_string(),
                id: key.id().to_string(),
            },
            other => MarketError::Database(other),
        }
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(e: serde_json::Error) -> Self {
        MarketError::Database(DbError::from(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renthub_db::Key;

    #[test]
    fn test_db_errors_map_to_domain_errors() {
        let err: MarketError = DbError::TransactionConflict { attempts: 4 }.into();
        assert!(matches!(err, MarketError::TransactionConflict { attempts: 4 }));
        assert!(err.is_retryable());

        let err: MarketError = DbError::NotFound(Key::new("Product", "p1")).into();
        assert_eq!(err.to_string(), "Product not found: p1");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_gap_message() {
        let err = MarketError::IndexReconciliationGap {
            products: vec!["a".into(), "b".into()],
            reason: "index down".into(),
        };
        assert_eq!(
            err.to_string(),
            "Search index left stale for 2 product(s): index down"
        );
    }
}
