//! Health and version endpoints
//!
//! - /health, /healthz - Liveness probe
//! - /version          - Build identification

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: &'static str,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    pub mode: String,
    pub node_id: String,
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub build_timestamp: &'static str,
}

/// GET /health, /healthz
pub fn handle_health(state: Arc<AppState>) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            status: "online",
            version: env!("CARGO_PKG_VERSION"),
            uptime: state.started.elapsed().as_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode: if state.args.dev_mode {
                "development".to_string()
            } else {
                "production".to_string()
            },
            node_id: state.args.node_id.to_string(),
        },
    )
}

/// GET /version
pub fn handle_version() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            git_commit: env!("GIT_COMMIT_SHORT"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
        },
    )
}
