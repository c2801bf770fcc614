//! CLI error types.

use crate::config::ConfigError;
use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No key is installed on this client.
    #[error("no access key installed. Run 'parktrack open <link>' or 'parktrack unlock' first")]
    NotSignedIn,

    /// No configured car matches the given id or name.
    #[error("no car matching '{query}'")]
    UnknownCar { query: String },

    /// The admin password did not yield a key the server accepts.
    #[error("Incorrect Password")]
    IncorrectPassword,

    /// The session was revoked after repeated refusals; local credentials are gone.
    #[error("{}", runtime::REVOKED_NOTICE)]
    AccessRevoked,

    /// The server refused the installed key, but not often enough to revoke it yet.
    #[error("access key rejected by the server ({failures} of {limit} before sign-out)")]
    KeyRejected { failures: u8, limit: u8 },

    /// Neither a location nor both floor and section were given.
    #[error("give a location, or both --floor and --section")]
    MissingLocation,

    /// Configuration is invalid or could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred in the client runtime.
    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),

    /// An error occurred in the policy layer.
    #[error(transparent)]
    Policy(#[from] policy::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
