//! Single-address verification route

use crate::{api_handler::*, middleware::RequestId, AppState};
use axum::{
    extract::{Extension, State},
    response::Json,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};

/// Resolve a request's per-candidate budget against the configured default and cap
pub fn candidate_budget(state: &AppState, timeout_secs: Option<u64>) -> Result<Duration, ApiError> {
    let secs = timeout_secs.unwrap_or(state.config.probe.candidate_budget_secs);
    if secs == 0 || secs > state.config.server.max_timeout_secs {
        return Err(ApiError::InvalidInput(format!(
            "timeout_secs must be between 1 and {}",
            state.config.server.max_timeout_secs
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// POST /v1/verify
///
/// Runs the full verification state machine for one address. Every
/// classification, including a timeout, is a 200 response.
#[instrument(skip_all, fields(email = %request.email, request_id = %request_id.0))]
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<VerifyResponse> {
    let email = request.email.trim();
    if email.is_empty() {
        warn!("Empty email provided");
        return Err(ApiError::InvalidInput("email cannot be empty".to_string()));
    }

    let budget = candidate_budget(&state, request.timeout_secs)?;

    let outcome = state.verifier.verify_candidate(email, budget).await?;
    info!("Verification of {}: {:?}", email, outcome.status);

    Ok(Json(convert_outcome(outcome, request_id.0)))
}
