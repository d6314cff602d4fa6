//! Plain file storage backend
//!
//! Each document is stored as a UTF-8 file at its path below the root, so
//! the directory can be edited or versioned with ordinary tools. Versions
//! are not persisted: a loaded document always starts at version 0.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quire_core::{DocumentId, Store, StoreError, StoredDocument};
use tokio::fs;
use tracing::debug;

use crate::filter_ids;

/// Suffix of the scratch file written before an atomic rename
const TMP_SUFFIX: &str = ".quire-tmp";

/// Directory-backed store
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &DocumentId) -> PathBuf {
        id.segments().fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn to_id(&self, path: &Path) -> Option<DocumentId> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?
            .join("/");
        DocumentId::new(joined).ok()
    }
}

#[async_trait]
impl Store for FileStore {
    async fn load(&self, id: &DocumentId) -> Result<Option<StoredDocument>, StoreError> {
        match fs::read_to_string(self.path_for(id)).await {
            Ok(content) => Ok(Some(StoredDocument::with_content(id.clone(), content, 0))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(StoreError::Serialization(
                format!("{} is not valid UTF-8", id),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, doc: &StoredDocument) -> Result<(), StoreError> {
        let path = self.path_for(&doc.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, doc.content.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;

        debug!(path = %doc.id, bytes = doc.content.len(), "Document written");
        Ok(())
    }

    async fn delete(&self, id: &DocumentId) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, pattern: Option<&str>) -> Result<Vec<DocumentId>, StoreError> {
        let mut ids = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.to_string_lossy().ends_with(TMP_SUFFIX) {
                    continue;
                }
                if let Some(id) = self.to_id(&path) {
                    ids.push(id);
                }
            }
        }

        Ok(filter_ids(ids, pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str) -> DocumentId {
        DocumentId::new(path).unwrap()
    }

    #[tokio::test]
    async fn test_save_writes_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let doc = StoredDocument::with_content(id("docs/intro.md"), "# Hello", 12);
        store.save(&doc).await.unwrap();

        let on_disk = std::fs::read_to_string(dir.path().join("docs").join("intro.md")).unwrap();
        assert_eq!(on_disk, "# Hello");
    }

    #[tokio::test]
    async fn test_load_resets_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store
            .save(&StoredDocument::with_content(id("a.txt"), "abc", 9))
            .await
            .unwrap();
        let loaded = store.load(&id("a.txt")).await.unwrap().unwrap();
        assert_eq!(loaded.content, "abc");
        assert_eq!(loaded.version, 0);

        assert!(store.load(&id("missing.txt")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_existing_files_are_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src").join("main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "todo").unwrap();

        let store = FileStore::open(dir.path()).await.unwrap();
        let all: Vec<String> = store
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(all, vec!["notes.txt", "src/main.rs"]);

        let rust = store.list(Some("*.rs")).await.unwrap();
        assert_eq!(rust, vec![id("src/main.rs")]);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store
            .save(&StoredDocument::with_content(id("gone.txt"), "x", 1))
            .await
            .unwrap();

        assert!(store.delete(&id("gone.txt")).await.unwrap());
        assert!(!store.delete(&id("gone.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_non_utf8_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        assert!(matches!(
            store.load(&id("blob.bin")).await,
            Err(StoreError::Serialization(_))
        ));
    }
}
