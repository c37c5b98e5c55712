use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use execbox::ExecuteError;
use tracing::error;

/// Error returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    /// The request was malformed or named an unsupported language
    BadRequest(String),
    /// The service failed to run the request
    Internal(String),
}

impl From<ExecuteError> for ApiError {
    fn from(err: ExecuteError) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else {
            error!(phase = %err.phase(), error = %err, "execution failed");
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "message": message }),
            ),
            ApiError::Internal(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "message": "Execution failed", "error": error }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
