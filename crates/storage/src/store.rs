//! Document store trait and the file and in-memory implementations.

use crate::fs::atomic_write_json;
use crate::{Document, Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Persistence for the single shared document.
///
/// `load` never reports a missing document: the first access creates,
/// persists and returns the seeded default.
pub trait DocumentStore: Send + Sync {
    /// Load the current document, bootstrapping the default if none exists.
    fn load(&self) -> Result<Document>;

    /// Replace the stored document with `doc`.
    ///
    /// Backends that track revisions reject a `doc` whose `revision` is not
    /// the current one with [`Error::Conflict`].
    fn save(&self, doc: &Document) -> Result<()>;
}

/// JSON file store. Every save atomically replaces the whole file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self) -> Result<Document> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "creating default document");
                let doc = Document::default();
                self.save(&doc)?;
                Ok(doc)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, doc: &Document) -> Result<()> {
        atomic_write_json(&self.path, doc)
    }
}

/// In-memory store (useful for testing).
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<Option<Document>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document.
    pub fn with_document(doc: Document) -> Self {
        Self {
            doc: Mutex::new(Some(doc)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves, including the bootstrap save.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> Result<Document> {
        let mut slot = self.doc.lock().unwrap_or_else(PoisonError::into_inner);
        let doc = slot.get_or_insert_with(|| {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Document::default()
        });
        Ok(doc.clone())
    }

    fn save(&self, doc: &Document) -> Result<()> {
        let mut slot = self.doc.lock().unwrap_or_else(PoisonError::into_inner);
        let current = slot.as_ref().map_or(0, |d| d.revision);
        if doc.revision != current {
            return Err(Error::Conflict {
                attempted: doc.revision,
                current,
            });
        }
        let mut next = doc.clone();
        next.revision = current + 1;
        *slot = Some(next);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StatusEntry, User};

    #[test]
    fn json_store_bootstraps_default_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("db.json"));
        assert!(!store.path().exists());

        let doc = store.load().unwrap();

        assert_eq!(doc, Document::default());
        assert!(store.path().exists());
    }

    #[test]
    fn json_store_round_trips_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("db.json"));

        let mut doc = store.load().unwrap();
        doc.users.push(User::new("Mum", "k-mum"));
        doc.status.insert(
            "c1".into(),
            StatusEntry {
                location: "2B".into(),
                timestamp: 1,
                user: "Mum".into(),
            },
        );
        store.save(&doc).unwrap();

        let back = store.load().unwrap();
        assert_eq!(back.users.len(), 1);
        assert_eq!(back.status["c1"].location, "2B");
    }

    #[test]
    fn json_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn memory_store_rejects_stale_revision() {
        let store = MemoryStore::new();
        let first = store.load().unwrap();
        let second = store.load().unwrap();

        store.save(&first).unwrap();
        let err = store.save(&second).unwrap_err();

        assert!(matches!(err, Error::Conflict { attempted: 0, current: 1 }));
        assert_eq!(store.load().unwrap().revision, 1);
    }

    #[test]
    fn memory_store_counts_bootstrap_once() {
        let store = MemoryStore::new();
        store.load().unwrap();
        store.load().unwrap();
        assert_eq!(store.saves(), 1);
    }
}
