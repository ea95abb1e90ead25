//! The search index interface.

use crate::{FieldValue, ProductDocument, SearchError};

/// A text index holding one document per product.
///
/// Implementations must be safe to share between threads. None of these
/// operations are transactional with respect to the entity store.
pub trait SearchIndex: Send + Sync {
    /// Fetch a document by id.
    fn get(&self, doc_id: &str) -> Result<Option<ProductDocument>, SearchError>;

    /// Insert or replace a document.
    fn put(&self, document: ProductDocument) -> Result<(), SearchError>;

    /// Set one field of an existing document.
    ///
    /// Returns the updated document, or `None` if no document has that id.
    fn update_field(
        &self,
        doc_id: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<Option<ProductDocument>, SearchError>;

    /// Insert or replace several documents in one call.
    fn batch_apply(&self, documents: Vec<ProductDocument>) -> Result<(), SearchError>;

    /// Remove a document. Returns whether it existed.
    fn remove(&self, doc_id: &str) -> Result<bool, SearchError>;

    /// Find the document describing product `pid`.
    fn find_by_pid(&self, pid: &str) -> Result<Option<ProductDocument>, SearchError>;

    /// Remove every document. Returns how many were removed.
    fn clear(&self) -> Result<usize, SearchError>;

    /// Number of documents.
    fn len(&self) -> Result<usize, SearchError>;

    /// Whether the index holds no documents.
    fn is_empty(&self) -> Result<bool, SearchError> {
        Ok(self.len()? == 0)
    }
}
