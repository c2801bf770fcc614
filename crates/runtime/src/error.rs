use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The server answered 403: the key is missing, unknown or revoked.
    #[error("unauthorized")]
    Unauthorized,

    /// The server rejected the request with another non-success status.
    #[error("API error {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// No capability token is installed, so no request was sent.
    #[error("no access key installed")]
    MissingToken,

    #[error(transparent)]
    Storage(#[from] storage::Error),
}

impl Error {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
