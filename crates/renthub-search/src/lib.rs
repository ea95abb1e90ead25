//! Product search index for RentHub.
//!
//! One [`ProductDocument`] per product, addressed by its document id. The
//! index is independent of the entity store: nothing written here takes part
//! in a store transaction, so callers reconcile the two explicitly.

mod document;
mod error;
mod index;
mod memory;

pub use document::{fields, FieldValue, ProductDocument};
pub use error::SearchError;
pub use index::SearchIndex;
pub use memory::MemoryIndex;
