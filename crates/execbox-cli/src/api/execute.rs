//! Code execution endpoint

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use execbox::{ExecutionRequest, ExecutionResult};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Body of `POST /api/code/execute`
///
/// Every field is optional at the JSON level so that a missing field is
/// reported as a validation error rather than a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteBody {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub stdin: Option<String>,
}

impl From<ExecuteBody> for ExecutionRequest {
    fn from(body: ExecuteBody) -> Self {
        ExecutionRequest {
            language: body.language.unwrap_or_default(),
            code: body.code.unwrap_or_default(),
            stdin: body.stdin.unwrap_or_default(),
            limits: None,
        }
    }
}

/// POST /api/code/execute
pub async fn execute_code(
    State(state): State<AppState>,
    body: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let Json(body) = body?;
    let request = ExecutionRequest::from(body);

    let result = state.runner.execute(&request).await?;
    Ok(Json(result))
}
