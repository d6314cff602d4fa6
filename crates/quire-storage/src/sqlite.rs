//! SQLite storage backend

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use quire_core::{DocumentId, Store, StoreError, StoredDocument};
use rusqlite::{params, Connection, OptionalExtension};

use crate::filter_ids;

/// SQLite storage backend
///
/// Embedded persistence for single-node setups. Unlike the file backend,
/// the version counter survives restarts.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl SqliteStore {
    /// Open or create a database at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// In-memory database, for tests
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load(&self, id: &DocumentId) -> Result<Option<StoredDocument>, StoreError> {
        let conn = self.conn.lock();

        let row: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT content, version, updated_at FROM documents WHERE path = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(db_err)?;

        Ok(row.map(|(content, version, updated_at)| StoredDocument {
            id: id.clone(),
            content,
            version: version.max(0) as u64,
            updated_at: updated_at.max(0) as u64,
        }))
    }

    async fn save(&self, doc: &StoredDocument) -> Result<(), StoreError> {
        let version = i64::try_from(doc.version)
            .map_err(|_| StoreError::Serialization(format!("version {} out of range", doc.version)))?;
        let updated_at = i64::try_from(doc.updated_at).unwrap_or(i64::MAX);

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO documents (path, content, version, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(path) DO UPDATE SET
                content = excluded.content,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
            params![doc.id.as_str(), doc.content, version, updated_at],
        )
        .map_err(db_err)?;

        Ok(())
    }

    async fn delete(&self, id: &DocumentId) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let affected = conn
            .execute("DELETE FROM documents WHERE path = ?1", params![id.as_str()])
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    async fn list(&self, pattern: Option<&str>) -> Result<Vec<DocumentId>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT path FROM documents").map_err(db_err)?;

        let ids: Vec<DocumentId> = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .filter_map(|path| DocumentId::new(path).ok())
            .collect();

        Ok(filter_ids(ids, pattern))
    }
}
