//! Shared parking document API.
//!
//! [`Api`] implements the read and mutation operations on the document held
//! by a [`storage::DocumentStore`], gated by a [`policy::AuthGate`].
//! [`router`] exposes them over HTTP:
//!
//! | Method & Path | Body |
//! |---|---|
//! | `GET /api/users` | none |
//! | `POST /api/users` | `{name, key}` |
//! | `DELETE /api/users/{key}` | none |
//! | `GET /api/config` | none |
//! | `POST /api/config` | `{cars, floors, sections, gridColumns?, customIcons?}` |
//! | `GET /api/status` | none |
//! | `POST /api/park` | `{carId, location, timestamp?, user?}` |
//!
//! Every endpoint requires a `key` query parameter; anything else gets a 403.

mod api;
mod error;
mod http;

pub use api::{Api, ConfigUpdate, NewUser, ParkRequest};
pub use error::{Error, Result};
pub use http::{RouterOptions, mount_path, router, serve};
