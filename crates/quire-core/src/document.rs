//! Document paths and persisted document state

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum document path length in bytes
pub const MAX_PATH_LEN: usize = 512;

/// Document identifier - a relative, slash separated path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID, validating and normalizing the path.
    ///
    /// A leading `./` is stripped. Absolute paths, empty segments and `..`
    /// segments are rejected so a path can never escape a store root.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let trimmed = path.strip_prefix("./").unwrap_or(&path);

        if trimmed.is_empty() {
            return Err(Error::InvalidPath("Document path cannot be empty".into()));
        }

        if trimmed.len() > MAX_PATH_LEN {
            return Err(Error::InvalidPath(format!(
                "Document path exceeds {} bytes",
                MAX_PATH_LEN
            )));
        }

        if trimmed.starts_with('/') || trimmed.contains('\\') {
            return Err(Error::InvalidPath(format!(
                "Document path must be relative: {}",
                path
            )));
        }

        for segment in trimmed.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(Error::InvalidPath(format!(
                    "Invalid segment {:?} in {}",
                    segment, path
                )));
            }
            if segment.chars().any(char::is_control) {
                return Err(Error::InvalidPath(format!(
                    "Control character in {}",
                    path
                )));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments in order
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

/// Canonical document state as exchanged with a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub content: String,
    pub version: u64,
    /// Milliseconds since the Unix epoch
    pub updated_at: u64,
}

impl StoredDocument {
    /// An empty document at version 0
    pub fn new(id: DocumentId) -> Self {
        Self::with_content(id, String::new(), 0)
    }

    pub fn with_content(id: DocumentId, content: impl Into<String>, version: u64) -> Self {
        Self {
            id,
            content: content.into(),
            version,
            updated_at: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
