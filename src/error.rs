//! Error taxonomy shared by the store, mirror, synchronizer and HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Submitted URL failed normalization or syntax validation.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("short url not found")]
    NotFound,

    /// Backend could not be reached or failed mid-operation. Retryable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Every allocation attempt produced a code that was already taken.
    #[error("could not allocate a unique code after {0} attempts")]
    CodeExhaustion(usize),

    /// Mirror file could not be read, parsed or written.
    #[error("mirror io failure: {0}")]
    MirrorIo(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::StorageUnavailable(_) | Error::CodeExhaustion(_) | Error::MirrorIo(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand to a client. Backend details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Error::InvalidUrl(reason) => reason.clone(),
            Error::NotFound => "Short URL not found".to_string(),
            Error::CodeExhaustion(_) => "Could not generate unique code".to_string(),
            Error::StorageUnavailable(_) | Error::MirrorIo(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

macro_rules! storage_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(err: $ty) -> Self {
                    Error::StorageUnavailable(err.to_string())
                }
            }
        )*
    };
}

storage_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    tokio::task::JoinError,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            Error::InvalidUrl("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::CodeExhaustion(10).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::StorageUnavailable("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn storage_details_are_not_exposed() {
        let err = Error::StorageUnavailable("connection refused on 10.0.0.3".into());
        assert!(!err.public_message().contains("10.0.0.3"));
    }
}
