use axum::Json;
use axum::extract::rejection::JsonRejection;

use crate::error::ApiError;

pub mod roadmap;
pub mod skills;

/// JSON body with rejections rendered like every other client error.
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}
