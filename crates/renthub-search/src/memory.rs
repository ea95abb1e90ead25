//! In-process search index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::{FieldValue, ProductDocument, SearchError, SearchIndex};

/// A [`SearchIndex`] kept in memory, optionally backed by a JSON file.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: RwLock<BTreeMap<String, ProductDocument>>,
    path: Option<PathBuf>,
}

impl MemoryIndex {
    /// Create an empty, non-persistent index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an index backed by `path`, loading it if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref().to_path_buf();
        let mut documents = BTreeMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| SearchError::Persist(format!("{}: {}", path.display(), e)))?;
            let loaded: Vec<ProductDocument> = serde_json::from_str(&content)?;
            for doc in loaded {
                documents.insert(doc.doc_id.clone(), doc);
            }
            tracing::debug!(path = %path.display(), documents = documents.len(), "loaded search index");
        }

        Ok(Self {
            documents: RwLock::new(documents),
            path: Some(path),
        })
    }

    /// Write the index to its file, if it has one.
    pub fn flush(&self) -> Result<(), SearchError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let docs: Vec<ProductDocument> = self.documents.read().values().cloned().collect();
        let content = serde_json::to_string_pretty(&docs)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SearchError::Persist(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| SearchError::Persist(format!("{}: {}", path.display(), e)))
    }

    /// Documents with a text field containing `term`, ignoring case.
    pub fn search(&self, term: &str) -> Vec<ProductDocument> {
        self.documents
            .read()
            .values()
            .filter(|doc| doc.matches_term(term))
            .cloned()
            .collect()
    }

    /// All documents, ordered by id.
    pub fn documents(&self) -> Vec<ProductDocument> {
        self.documents.read().values().cloned().collect()
    }
}

impl SearchIndex for MemoryIndex {
    fn get(&self, doc_id: &str) -> Result<Option<ProductDocument>, SearchError> {
        Ok(self.documents.read().get(doc_id).cloned())
    }

    fn put(&self, document: ProductDocument) -> Result<(), SearchError> {
        if document.doc_id.is_empty() {
            return Err(SearchError::InvalidDocument {
                doc_id: document.doc_id,
                reason: "empty document id".to_string(),
            });
        }
        self.documents
            .write()
            .insert(document.doc_id.clone(), document);
        Ok(())
    }

    fn update_field(
        &self,
        doc_id: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<Option<ProductDocument>, SearchError> {
        let mut documents = self.documents.write();
        Ok(documents.get_mut(doc_id).map(|doc| {
            doc.set_field(field, value);
            doc.clone()
        }))
    }

    fn batch_apply(&self, documents: Vec<ProductDocument>) -> Result<(), SearchError> {
        if let Some(bad) = documents.iter().find(|d| d.doc_id.is_empty()) {
            return Err(SearchError::InvalidDocument {
                doc_id: bad.doc_id.clone(),
                reason: "empty document id".to_string(),
            });
        }
        let mut store = self.documents.write();
        for doc in documents {
            store.insert(doc.doc_id.clone(), doc);
        }
        Ok(())
    }

    fn remove(&self, doc_id: &str) -> Result<bool, SearchError> {
        Ok(self.documents.write().remove(doc_id).is_some())
    }

    fn find_by_pid(&self, pid: &str) -> Result<Option<ProductDocument>, SearchError> {
        Ok(self
            .documents
            .read()
            .values()
            .find(|doc| doc.pid == pid)
            .cloned())
    }

    fn clear(&self) -> Result<usize, SearchError> {
        let mut documents = self.documents.write();
        let removed = documents.len();
        documents.clear();
        Ok(removed)
    }

    fn len(&self) -> Result<usize, SearchError> {
        Ok(self.documents.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    fn doc(doc_id: &str, pid: &str, name: &str) -> ProductDocument {
        ProductDocument::new(doc_id, pid)
            .with_field(fields::NAME, name)
            .with_field(fields::RATING, 0.0)
    }

    #[test]
    fn test_update_field_existing_and_missing() {
        let index = MemoryIndex::new();
        index.put(doc("d1", "p1", "Tent")).unwrap();

        let updated = index
            .update_field("d1", fields::RATING, FieldValue::Number(4.5))
            .unwrap()
            .unwrap();
        assert_eq!(updated.rating(), Some(4.5));
        assert_eq!(index.get("d1").unwrap().unwrap().rating(), Some(4.5));

        assert!(index
            .update_field("missing", fields::RATING, FieldValue::Number(1.0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_batch_apply_replaces() {
        let index = MemoryIndex::new();
        index.put(doc("d1", "p1", "Tent")).unwrap();
        index
            .batch_apply(vec![
                doc("d1", "p1", "Tent").with_field(fields::RATING, 2.0),
                doc("d2", "p2", "Canoe"),
            ])
            .unwrap();

        assert_eq!(index.len().unwrap(), 2);
        assert_eq!(index.get("d1").unwrap().unwrap().rating(), Some(2.0));
    }

    #[test]
    fn test_rejects_empty_doc_id() {
        let index = MemoryIndex::new();
        assert!(index.put(doc("", "p1", "Tent")).is_err());
        assert!(index.batch_apply(vec![doc("", "p1", "Tent")]).is_err());
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_find_remove_clear() {
        let index = MemoryIndex::new();
        index.put(doc("d1", "p1", "Tent")).unwrap();
        index.put(doc("d2", "p2", "Canoe")).unwrap();

        assert_eq!(index.find_by_pid("p2").unwrap().unwrap().doc_id, "d2");
        assert!(index.remove("d2").unwrap());
        assert!(!index.remove("d2").unwrap());
        assert_eq!(index.clear().unwrap(), 1);
    }

    #[test]
    fn test_search_term() {
        let index = MemoryIndex::new();
        index.put(doc("d1", "p1", "Mountain Bike")).unwrap();
        index.put(doc("d2", "p2", "Canoe")).unwrap();
        let hits = index.search("bike");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pid, "p1");
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        let index = MemoryIndex::open(&path).unwrap();
        index.put(doc("d1", "p1", "Tent")).unwrap();
        index.flush().unwrap();

        let reopened = MemoryIndex::open(&path).unwrap();
        assert_eq!(reopened.get("d1").unwrap().unwrap().pid, "p1");
    }
}
