use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use progress_core::model::{IdError, ItemTypeError};
use serde_json::json;
use services::ProgressServiceError;
use thiserror::Error;

/// Request failures, rendered as a status code and `{"error": "..."}`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("missing or unknown bearer token")]
    Unauthorized,
    #[error("access to another user's progress is forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("storage temporarily unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<progress_core::Error> for ApiError {
    fn from(err: progress_core::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        progress_core::Error::from(err).into()
    }
}

impl From<ItemTypeError> for ApiError {
    fn from(err: ItemTypeError) -> Self {
        progress_core::Error::from(err).into()
    }
}

impl From<ProgressServiceError> for ApiError {
    fn from(err: ProgressServiceError) -> Self {
        match err {
            ProgressServiceError::Validation(e) => e.into(),
            ProgressServiceError::NotFound => ApiError::NotFound,
            ProgressServiceError::Storage(e) if e.is_transient() => {
                ApiError::Unavailable(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::StorageError;

    #[test]
    fn storage_failures_map_by_transience() {
        let conflict = ApiError::from(ProgressServiceError::from(StorageError::Conflict(
            "database is locked".into(),
        )));
        assert_eq!(conflict.status(), StatusCode::SERVICE_UNAVAILABLE);

        let corrupt = ApiError::from(ProgressServiceError::from(StorageError::Serialization(
            "bad row".into(),
        )));
        assert_eq!(corrupt.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let missing = ApiError::from(ProgressServiceError::from(StorageError::NotFound));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_identifiers_are_bad_requests() {
        let err: ApiError = progress_core::model::RoleId::new("  ").unwrap_err().into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
