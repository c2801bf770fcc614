//! Authorization error types.

use thiserror::Error;

/// Authorization errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The presented key is missing or not in the authorized set.
    #[error("Unauthorized: Invalid or missing API key")]
    Unauthorized,

    /// The admin secret was left at its insecure default without an explicit opt-in.
    #[error("admin secret is unset or the insecure default; configure one or opt in explicitly")]
    InsecureSecret,
}

pub type Result<T> = std::result::Result<T, Error>;
