//! In-memory storage backend

use async_trait::async_trait;
use dashmap::DashMap;
use quire_core::{DocumentId, Store, StoreError, StoredDocument};

use crate::filter_ids;

/// In-memory storage backend
///
/// Fast, volatile storage suitable for development and tests.
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: DashMap<DocumentId, StoredDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, id: &DocumentId) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self.docs.get(id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, doc: &StoredDocument) -> Result<(), StoreError> {
        self.docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn delete(&self, id: &DocumentId) -> Result<bool, StoreError> {
        Ok(self.docs.remove(id).is_some())
    }

    async fn list(&self, pattern: Option<&str>) -> Result<Vec<DocumentId>, StoreError> {
        let ids: Vec<DocumentId> = self.docs.iter().map(|entry| entry.key().clone()).collect();
        Ok(filter_ids(ids, pattern))
    }
}
