use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use board::{StoreError, VoteError};
use mirror::{FetchError, SyncError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Already voted for this item")]
    DuplicateVote,

    #[error("GitHub token is required")]
    MissingToken,

    #[error("Too many requests, please try again later")]
    RateLimited,

    #[error("Failed to sync with GitHub: {0}")]
    UpstreamFetchFailed(#[from] FetchError),

    #[error("GitHub rejected the code: {0}")]
    OAuthRejected(String),

    #[error("Failed to exchange code with GitHub: {0}")]
    OAuthFailed(String),

    #[error("Storage failure")]
    PersistenceFailure(#[from] StoreError),
}

impl From<VoteError> for AppError {
    fn from(e: VoteError) -> Self {
        match e {
            VoteError::InvalidRequest(reason) => AppError::InvalidRequest(reason.to_string()),
            VoteError::DuplicateVote => AppError::DuplicateVote,
            VoteError::Store(e) => AppError::PersistenceFailure(e),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Fetch(e) => AppError::UpstreamFetchFailed(e),
            SyncError::Store(e) => AppError::PersistenceFailure(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::DuplicateVote => StatusCode::BAD_REQUEST,
            AppError::OAuthRejected { .. } => StatusCode::BAD_REQUEST,
            AppError::MissingToken => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamFetchFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::OAuthFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PersistenceFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("{self:?}");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
