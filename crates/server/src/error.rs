//! API error types and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Required request fields are missing or malformed.
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized: Invalid or missing API key")]
    Unauthorized,

    /// The request would violate a uniqueness rule or lost a revision race.
    #[error("{0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(storage::Error),
}

impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        match e {
            storage::Error::Conflict { .. } => Error::Conflict(e.to_string()),
            other => Error::Storage(other),
        }
    }
}

impl From<policy::Error> for Error {
    fn from(_: policy::Error) -> Self {
        Error::Unauthorized
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::FORBIDDEN,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
