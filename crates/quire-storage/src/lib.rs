//! Quire Storage Backends
//!
//! Implementations of [`quire_core::Store`]:
//! - Memory: volatile, for development and tests
//! - File: one plain-text file per document under a root directory
//! - SQLite: embedded persistence that also keeps the version counter

pub mod memory;
#[cfg(feature = "file")]
pub mod file;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use quire_core::{Store, StoreError};

pub use memory::MemoryStore;
#[cfg(feature = "file")]
pub use file::FileStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Apply an optional glob filter to a listing
pub(crate) fn filter_ids(
    ids: impl IntoIterator<Item = quire_core::DocumentId>,
    pattern: Option<&str>,
) -> Vec<quire_core::DocumentId> {
    let mut ids: Vec<_> = ids
        .into_iter()
        .filter(|id| pattern.map_or(true, |p| quire_core::acl::matches_pattern(p, id.as_str())))
        .collect();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    ids
}
