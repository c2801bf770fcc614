//! Parktrack client runtime: local cache, sync loop and session handling.
//!
//! This crate keeps a client-resident mirror of the shared config and status
//! in step with the server, and reacts when the client's key stops working.
//!
//! # Overview
//!
//! - **ParkingApi**: A trait abstracting the remote API; [`HttpApi`] talks to
//!   the real server.
//! - **ClientCache**: Last good config and status plus the local key and
//!   display identity, persisted through a [`LocalStore`].
//! - **Client**: Runs the sync loop (one tick immediately, then every
//!   [`DEFAULT_POLL_INTERVAL`]) and applies local writes optimistically.
//! - **SessionState**: Pure state machine counting consecutive unauthorized
//!   responses; the third revokes the session.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{Client, ClientCache, FileLocalStore, HttpApi, LaunchContext, DEFAULT_POLL_INTERVAL};
//!
//! # async fn example() -> runtime::Result<()> {
//! let launch = LaunchContext::from_link("http://localhost:3000/?key=abc&user=Dad")?;
//! let cache = ClientCache::start(Box::new(FileLocalStore::new("client.json")), launch)?;
//! let client = Client::new(HttpApi::new("http://localhost:3000")?, cache);
//!
//! let sync = client.spawn_sync(DEFAULT_POLL_INTERVAL);
//! client.park("c1", "2B").await?;
//! sync.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod backend;
mod cache;
mod error;
mod link;
mod local;
mod session;
mod sync;

pub use backend::{HttpApi, Park, ParkingApi};
pub use cache::{ClientCache, DEFAULT_GRID_COLUMNS, DEFAULT_IDENTITY, REVOKED_NOTICE};
pub use error::{Error, Result};
pub use link::{LaunchContext, magic_link};
pub use local::{FileLocalStore, LocalState, LocalStore, MemoryLocalStore};
pub use session::{Action, Outcome, REVOKE_THRESHOLD, SessionState};
pub use sync::{Client, DEFAULT_POLL_INTERVAL, SyncEvent, SyncHandle, Tick};
