use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::store::StoreError;

/// Outcome of a rejected command.
///
/// Everything except [`Error::Storage`] is a normal negative result that leaves
/// the caller's prior state untouched. Storage failures abort the command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("missing caller identity")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("user has already voted")]
    AlreadyVoted,

    #[error("song is already in the event playlist")]
    AlreadyPresent,

    #[error("event is not active")]
    EventNotActive,

    #[error("user has no vote to retract")]
    NothingToRetract,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Machine-readable reason string carried in failure payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Unauthorized => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::AlreadyVoted => "ALREADY_VOTED",
            Error::AlreadyPresent => "ALREADY_PRESENT",
            Error::EventNotActive => "EVENT_NOT_ACTIVE",
            Error::NothingToRetract => "NOTHING_TO_RETRACT",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::Storage(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::AlreadyVoted | Error::AlreadyPresent => StatusCode::CONFLICT,
            Error::EventNotActive | Error::NothingToRetract | Error::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = match &self {
            Error::Storage(err) => {
                tracing::error!(error = %err, "storage failure");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "code": self.code(),
        });

        (self.status(), axum::Json(body)).into_response()
    }
}
