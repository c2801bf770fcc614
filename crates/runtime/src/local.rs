//! Client-local persisted state.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use storage::fs::atomic_write_json;
use storage::{Config, StatusMap};

/// Everything the client keeps between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    /// Capability token presented on every request.
    pub token: Option<String>,
    /// Last config applied from the server or staged locally.
    pub config: Option<Config>,
    /// Last status applied from the server or staged locally.
    pub status: Option<StatusMap>,
    /// Display identity used to attribute parks.
    pub user: Option<String>,
    /// Grid column preference per display identity.
    #[serde(default)]
    pub grid_columns: BTreeMap<String, u32>,
    /// Consecutive unauthorized responses seen with the current token.
    #[serde(default)]
    pub failures: u8,
}

/// Storage for [`LocalState`].
pub trait LocalStore: Send + Sync {
    /// Load the saved state; nothing saved yet yields the empty state.
    fn load(&self) -> Result<LocalState>;

    fn save(&self, state: &LocalState) -> Result<()>;
}

/// Local state kept in a JSON file.
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    path: PathBuf,
}

impl FileLocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LocalStore for FileLocalStore {
    fn load(&self) -> Result<LocalState> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).map_err(storage::Error::from)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LocalState::default()),
            Err(e) => Err(storage::Error::from(e).into()),
        }
    }

    fn save(&self, state: &LocalState) -> Result<()> {
        Ok(atomic_write_json(&self.path, state)?)
    }
}

/// Local state held in memory (useful for testing).
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    state: Mutex<LocalState>,
}

impl MemoryLocalStore {
    pub fn new(state: LocalState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> LocalState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LocalStore for MemoryLocalStore {
    fn load(&self) -> Result<LocalState> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &LocalState) -> Result<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        Ok(())
    }
}

impl<T: LocalStore + ?Sized> LocalStore for std::sync::Arc<T> {
    fn load(&self) -> Result<LocalState> {
        (**self).load()
    }

    fn save(&self, state: &LocalState) -> Result<()> {
        (**self).save(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLocalStore::new(dir.path().join("client.json"));
        assert_eq!(store.load().unwrap(), LocalState::default());
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLocalStore::new(dir.path().join("nested/client.json"));
        let mut state = LocalState {
            token: Some("k-dad".into()),
            user: Some("Dad".into()),
            config: Some(Config::default()),
            ..Default::default()
        };
        state.grid_columns.insert("Dad".into(), 3);
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
    }
}
