//! API routes

pub mod error;
pub mod execute;
pub mod health;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/code/execute", post(execute::execute_code))
        .route("/api/code/health", get(health::health_check))
        .with_state(state)
}
