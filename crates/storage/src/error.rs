use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A save was attempted against a document revision that is no longer current.
    #[error("stale document revision {attempted} (current {current})")]
    Conflict { attempted: u64, current: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
