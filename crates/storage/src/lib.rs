//! Persistent storage for the shared parking document.
//!
//! All shared state lives in one [`Document`]: the [`Config`] (cars and
//! parking layout), the latest [`StatusEntry`] per car, and the stored
//! [`User`]s whose keys grant API access.
//!
//! # Core Concepts
//!
//! ## DocumentStore
//!
//! [`DocumentStore`] is the persistence seam. It has exactly two operations,
//! `load` and `save`, and every mutation is a full load, modify, save cycle.
//! The first `load` creates and persists the seeded default document; a
//! missing document is never an error.
//!
//! Implementations:
//! - [`JsonFileStore`]: one pretty-printed JSON file, replaced atomically on
//!   every save so a concurrent reader never observes a torn write.
//! - [`SqliteStore`]: one row plus a revision counter; stale saves fail with
//!   [`Error::Conflict`].
//! - [`MemoryStore`]: for tests; also revision-checked.
//!
//! # Example
//!
//! ```no_run
//! use storage::{DocumentStore, JsonFileStore, StatusEntry};
//!
//! let store = JsonFileStore::new("db.json");
//! let mut doc = store.load()?;
//! doc.status.insert(
//!     "c1".into(),
//!     StatusEntry { location: "2B".into(), timestamp: storage::now_millis(), user: "Dad".into() },
//! );
//! store.save(&doc)?;
//! # Ok::<(), storage::Error>(())
//! ```

mod document;
mod error;
pub mod fs;
mod sqlite;
mod store;

pub use document::{Car, Config, Document, IconType, StatusEntry, StatusMap, User, now_millis};
pub use error::{Error, Result};
pub use sqlite::SqliteStore;
pub use store::{DocumentStore, JsonFileStore, MemoryStore};
