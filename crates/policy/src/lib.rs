//! Capability-token authorization.
//!
//! Core principle: **a request is authorized only by the key it presents.**
//!
//! The authorized set is every stored user's key plus the root token, which
//! is derived from the operator's admin secret and never stored.

mod error;
mod gate;
mod principal;

pub use error::{Error, Result};
pub use gate::{AccessRequest, AuthGate, DEFAULT_ADMIN_SECRET, Decision, root_token};
pub use principal::{Principal, ROOT_NAME, UNKNOWN_NAME};
