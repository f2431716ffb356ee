//! Orchestrator status handler.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use evalflow_core::{RunSummary, Topology};

use crate::state::AppState;

/// Orchestrator status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub topology: Topology,
    pub view_id: String,
    /// Whether the polling loop is running
    pub running: bool,
    /// Whether a run is in progress right now
    pub run_in_progress: bool,
    /// Runs started since startup
    pub runs: u64,
    pub last_run: Option<RunSummary>,
    pub last_error: Option<String>,
    pub config_hash: String,
}

/// Get orchestrator status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let orchestrator = state.orchestrator();
    let status = orchestrator.status().await;
    Json(StatusResponse {
        topology: orchestrator.config().topology,
        view_id: orchestrator.config().view_id.clone(),
        running: status.running,
        run_in_progress: status.run_in_progress,
        runs: status.runs,
        last_run: status.last_run,
        last_error: status.last_error,
        config_hash: state.config_hash().to_string(),
    })
}
