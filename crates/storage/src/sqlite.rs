//! SQLite document store with optimistic revision checks.

use crate::{Document, DocumentStore, Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// SQLite-backed document store.
///
/// The document lives in a single row next to a revision counter. A save only
/// succeeds if the row is still at the revision the document was loaded from,
/// so writers in other processes cannot silently overwrite each other.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS document (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                revision INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DocumentStore for SqliteStore {
    fn load(&self) -> Result<Document> {
        let conn = self.conn();
        let row: Option<(i64, String)> = conn
            .query_row("SELECT revision, data FROM document WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;

        match row {
            Some((revision, data)) => {
                let mut doc: Document = serde_json::from_str(&data)?;
                doc.revision = revision as u64;
                Ok(doc)
            }
            None => {
                info!("creating default document");
                let doc = Document::default();
                conn.execute(
                    "INSERT INTO document (id, revision, data) VALUES (1, 0, ?1)",
                    params![serde_json::to_string(&doc)?],
                )?;
                Ok(doc)
            }
        }
    }

    fn save(&self, doc: &Document) -> Result<()> {
        let conn = self.conn();
        let data = serde_json::to_string(doc)?;
        let changed = conn.execute(
            "UPDATE document SET data = ?1, revision = revision + 1 WHERE id = 1 AND revision = ?2",
            params![data, doc.revision as i64],
        )?;
        if changed == 1 {
            return Ok(());
        }

        let current: Option<i64> = conn
            .query_row("SELECT revision FROM document WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match current {
            Some(current) => Err(Error::Conflict {
                attempted: doc.revision,
                current: current as u64,
            }),
            // Saved before the first load: this write is the bootstrap.
            None => {
                conn.execute(
                    "INSERT INTO document (id, revision, data) VALUES (1, 1, ?1)",
                    params![data],
                )?;
                Ok(())
            }
        }
    }
}
