//! HTTP boundary error mapping.
//!
//! `CfkError`'s own `code()`/`http_status()`/`expose()` already carry the
//! taxonomy; this wrapper's only job is turning one into the gateway's
//! `{success: false, code, message}` JSON envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cfk_core::CfkError;
use serde_json::json;

pub struct ApiError(CfkError);

impl From<CfkError> for ApiError {
    fn from(e: CfkError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if self.0.expose() { self.0.to_string() } else { "internal error".to_string() };
        tracing::warn!(code = self.0.code(), status = status.as_u16(), "request failed: {message}");
        (status, Json(json!({ "success": false, "code": self.0.code(), "message": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
