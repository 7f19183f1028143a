use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("driver {0} is already online")]
    AlreadyOnline(String),

    #[error("driver {0} is not online")]
    NotOnline(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("routing error: {0}")]
    Routing(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a consumer should ask the broker to redeliver the message that
    /// produced this error. Precondition and payload errors fail the same way
    /// on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport(_) | AppError::Internal(_))
    }
}

impl From<lapin::Error> for AppError {
    fn from(err: lapin::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) | AppError::NotOnline(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Serialization(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::AlreadyOnline(_) => StatusCode::CONFLICT,
            AppError::Transport(_) | AppError::Routing(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn only_transport_and_internal_errors_are_retried() {
        assert!(AppError::Transport("channel closed".into()).is_retryable());
        assert!(AppError::Internal("boom".into()).is_retryable());

        let malformed = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!AppError::Serialization(malformed).is_retryable());
        assert!(!AppError::NotOnline("d1".into()).is_retryable());
        assert!(!AppError::AlreadyOnline("d1".into()).is_retryable());
        assert!(!AppError::BadRequest("empty".into()).is_retryable());
    }
}
