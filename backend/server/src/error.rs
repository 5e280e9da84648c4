use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use compliance::StoreError;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed header {0}")]
    MalformedHeader(&'static str),

    #[error("Invalid identifier")]
    InvalidIdentifier,

    #[error("Missing caller identity")]
    MissingCaller,

    #[error("Forbidden")]
    Forbidden,

    #[error("Policy {0} not found")]
    PolicyNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedHeader { .. } | AppError::InvalidIdentifier => StatusCode::BAD_REQUEST,
            AppError::MissingCaller => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::PolicyNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Store(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("Request failed: {self}");
        }

        (status, self.to_string()).into_response()
    }
}
