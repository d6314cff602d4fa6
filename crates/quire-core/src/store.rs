//! Storage collaborator used by binders and the curator
//!
//! Backends live in the `quire-storage` crate.

use async_trait::async_trait;

use crate::document::{DocumentId, StoredDocument};

/// Storage backend trait
#[async_trait]
pub trait Store: Send + Sync {
    /// Load a document, `None` if it has never been stored
    async fn load(&self, id: &DocumentId) -> Result<Option<StoredDocument>, StoreError>;

    /// Persist the canonical content and version of a document
    async fn save(&self, doc: &StoredDocument) -> Result<(), StoreError>;

    /// Delete a document
    async fn delete(&self, id: &DocumentId) -> Result<bool, StoreError>;

    /// List document IDs matching a pattern
    async fn list(&self, pattern: Option<&str>) -> Result<Vec<DocumentId>, StoreError>;
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
