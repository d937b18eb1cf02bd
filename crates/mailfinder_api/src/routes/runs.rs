//! Background run routes
//!
//! At most one run is active; its progress is polled rather than streamed.

use crate::{api_handler::*, middleware::RequestId, routes::verify::candidate_budget, AppState};
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::Json,
};
use mailfinder_core::{BatchOptions, NameEntry, RunStatus, STOPPED_BY_USER};
use std::sync::Arc;
use tracing::{info, instrument};

/// POST /v1/runs
///
/// Starts a run in the background and returns 202. Answers 409 while another
/// run is in flight.
#[instrument(skip_all, fields(entries = request.entries.len(), request_id = %request_id.0))]
pub async fn start_run_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<StartRunResponse>), ApiError> {
    let options = BatchOptions {
        timeout_per_candidate: candidate_budget(&state, request.timeout_secs)?,
        stop_on_first_valid: request
            .stop_on_first_valid
            .unwrap_or(state.config.probe.stop_on_first_valid),
    };

    let entries: Vec<NameEntry> = request.entries.into_iter().map(NameEntry::from).collect();
    let total = entries.len();

    state.supervisor.start(entries, options)?;
    info!("Started run with {} entries", total);

    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse {
            request_id: request_id.0,
            status: RunStatus::Running,
            total,
        }),
    ))
}

/// GET /v1/runs/progress
pub async fn progress_handler(State(state): State<Arc<AppState>>) -> Json<ProgressResponse> {
    Json(convert_progress(state.supervisor.progress()))
}

/// POST /v1/runs/stop
///
/// Requests cooperative cancellation; the run ends at the next person or
/// candidate boundary.
pub async fn stop_run_handler(State(state): State<Arc<AppState>>) -> Json<StopRunResponse> {
    let stopped = state.supervisor.stop();
    let message = if stopped {
        STOPPED_BY_USER.to_string()
    } else {
        "No run in progress".to_string()
    };
    Json(StopRunResponse { stopped, message })
}
