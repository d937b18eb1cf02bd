//! Candidate generation route

use crate::{api_handler::*, middleware::RequestId};
use axum::{extract::Extension, response::Json};
use mailfinder_core::generate_email_variations;
use tracing::{info, instrument};

/// POST /v1/variations
///
/// Returns the ordered candidate addresses for one person. Pure, no network access.
#[instrument(skip_all, fields(request_id = %request_id.0))]
pub async fn variations_handler(
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<VariationsRequest>,
) -> ApiResult<VariationsResponse> {
    let first_name = request.first_name.trim();
    let last_name = request.last_name.trim();
    let domain = request.domain.trim().to_lowercase();

    if first_name.is_empty() || last_name.is_empty() || domain.is_empty() {
        return Err(ApiError::InvalidInput(
            "first_name, last_name and domain are required".to_string(),
        ));
    }
    if !domain.contains('.') {
        return Err(ApiError::InvalidInput(format!("Not a domain: {domain}")));
    }

    let candidates = generate_email_variations(first_name, last_name, &domain);
    info!("Generated {} candidates for {} {}", candidates.len(), first_name, last_name);

    Ok(Json(VariationsResponse {
        request_id: request_id.0,
        count: candidates.len(),
        candidates,
    }))
}
