//! Transactional entity store for RentHub.
//!
//! Entities are plain serde types keyed by `(kind, id)`. Reads and writes of a
//! single entity are strongly consistent; multi-entity updates go through
//! optimistic transactions that validate every key they touched at commit
//! time and are retried automatically on conflict.
//!
//! # Example
//!
//! ```rust,ignore
//! use renthub_db::prelude::*;
//!
//! let db = Db::in_memory();
//!
//! db.run_in_transaction(TransactionOptions::cross_group(), |tx| {
//!     let mut product: Product = tx.get_required("p1")?;
//!     product.num_reviews += 1;
//!     tx.put(&product)?;
//!     Ok::<_, DbError>(())
//! })?;
//!
//! let dirty: Vec<Product> = db
//!     .query::<Product>(Filter::new().eq("needs_review_reindex", true))
//!     .collect::<Result<_, _>>()?;
//! ```

mod db;
mod error;
mod key;
mod query;
mod transaction;
mod types;

pub use db::{Db, DbOptions, DbStats};
pub use error::DbError;
pub use key::{Entity, Key};
pub use query::{Cursor, Query, QueryPage};
pub use transaction::{Transaction, TransactionOptions};
pub use types::{Filter, Value};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Cursor, Db, DbError, DbOptions, Entity, Filter, Key, Query, QueryPage, Transaction,
        TransactionOptions, Value,
    };
}
