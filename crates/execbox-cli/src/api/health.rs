//! Health endpoint

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use execbox::{HealthReport, HealthStatus};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// `<name>` is "Available" or "Not Available"; `<name>_version` holds the version line
    pub compilers: BTreeMap<String, String>,
    pub timestamp: String,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        let mut compilers = BTreeMap::new();
        for (name, health) in report.toolchains {
            let availability = if health.available {
                "Available"
            } else {
                "Not Available"
            };
            if let Some(version) = health.version {
                compilers.insert(format!("{name}_version"), version);
            }
            compilers.insert(name, availability.to_owned());
        }

        Self {
            status: report.status,
            compilers,
            timestamp: report.timestamp.to_rfc3339(),
        }
    }
}

/// GET /api/code/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.probe.check().await.into())
}
