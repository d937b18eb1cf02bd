//! Shared API types and utilities
//!
//! Request and response bodies, error mapping and conversions from core
//! results used across all endpoints.

use axum::{http::StatusCode, response::Json};
use mailfinder_core::batch::{CheckedCandidate, FoundAddress};
use mailfinder_core::{
    NameEntry, PersonResult, PersonStatus, ProbeError, RunProgress, RunStatus,
    VerificationOutcome, VerificationStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;
use uuid::Uuid;

/// Request body for POST /v1/variations
#[derive(Debug, Deserialize)]
pub struct VariationsRequest {
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
}

/// Candidate list for one person
#[derive(Debug, Serialize)]
pub struct VariationsResponse {
    pub request_id: String,
    pub count: usize,
    pub candidates: Vec<String>,
}

/// Request body for POST /v1/verify
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    /// Per-candidate budget; the configured default when absent
    pub timeout_secs: Option<u64>,
}

/// Classified result of one address
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub request_id: String,
    pub email: String,
    pub accepted: bool,
    pub status: VerificationStatus,
    pub detail: String,
    pub checked_at: String,
}

/// One person in a run request
#[derive(Debug, Deserialize)]
pub struct EntryRequest {
    pub first_name: String,
    pub last_name: String,
    /// Domain, or a company name left to the domain finder
    #[serde(default)]
    pub domain: String,
}

impl From<EntryRequest> for NameEntry {
    fn from(entry: EntryRequest) -> Self {
        NameEntry::new(
            entry.first_name.trim(),
            entry.last_name.trim(),
            entry.domain.trim().to_lowercase(),
        )
    }
}

/// Request body for POST /v1/runs
#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub entries: Vec<EntryRequest>,
    pub timeout_secs: Option<u64>,
    pub stop_on_first_valid: Option<bool>,
}

/// Acknowledgement of a started run
#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub request_id: String,
    pub status: RunStatus,
    pub total: usize,
}

/// Acknowledgement of a stop request
#[derive(Debug, Serialize)]
pub struct StopRunResponse {
    pub stopped: bool,
    pub message: String,
}

/// Person-level result as reported over the API
#[derive(Debug, Serialize)]
pub struct PersonResultResponse {
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
    pub best_candidate: Option<String>,
    pub status: PersonStatus,
    pub detail: String,
    pub checked_at: String,
}

/// Checked address as reported over the API
#[derive(Debug, Serialize)]
pub struct CheckedEmailResponse {
    pub email: String,
    pub is_valid: bool,
    pub status: VerificationStatus,
    pub detail: String,
}

/// Pollable run state
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub status: RunStatus,
    pub total: usize,
    pub processed: usize,
    pub percentage: u8,
    pub current_name: String,
    pub current_email: String,
    pub current_email_index: usize,
    pub total_emails: usize,
    pub email_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub valid_emails: Vec<FoundAddress>,
    pub all_checked_emails: BTreeMap<String, Vec<CheckedEmailResponse>>,
    pub results: Vec<PersonResultResponse>,
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub request_id: String,
    pub timestamp: String,
}

/// Result type for API handlers
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    BatchRunning,
    InternalError(String),
}

impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::InvalidEntry(msg) => ApiError::InvalidInput(msg),
            ProbeError::BatchAlreadyRunning => ApiError::BatchRunning,
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
            ApiError::BatchRunning => (
                StatusCode::CONFLICT,
                "BATCH_RUNNING",
                "A batch is already running".to_string(),
            ),
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let error_response = ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            request_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Format a timestamp as RFC 3339
pub fn format_timestamp(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time).to_rfc3339()
}

fn percentage(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) * 100) / total) as u8
}

pub fn convert_outcome(outcome: VerificationOutcome, request_id: String) -> VerifyResponse {
    VerifyResponse {
        request_id,
        accepted: outcome.is_accepted(),
        email: outcome.candidate,
        status: outcome.status,
        detail: outcome.detail,
        checked_at: chrono::Utc::now().to_rfc3339(),
    }
}

pub fn convert_person_result(result: PersonResult) -> PersonResultResponse {
    PersonResultResponse {
        checked_at: format_timestamp(result.checked_at),
        first_name: result.first_name,
        last_name: result.last_name,
        domain: result.domain,
        best_candidate: result.best_candidate,
        status: result.status,
        detail: result.detail,
    }
}

fn group_checked(checked: Vec<CheckedCandidate>) -> BTreeMap<String, Vec<CheckedEmailResponse>> {
    let mut grouped: BTreeMap<String, Vec<CheckedEmailResponse>> = BTreeMap::new();
    for CheckedCandidate { person_key, outcome } in checked {
        grouped.entry(person_key).or_default().push(CheckedEmailResponse {
            is_valid: outcome.is_accepted(),
            email: outcome.candidate,
            status: outcome.status,
            detail: outcome.detail,
        });
    }
    grouped
}

pub fn convert_progress(progress: RunProgress) -> ProgressResponse {
    let error_message = match progress.status {
        RunStatus::Error | RunStatus::Stopped if !progress.error_message.is_empty() => {
            Some(progress.error_message)
        }
        _ => None,
    };

    ProgressResponse {
        status: progress.status,
        total: progress.total,
        processed: progress.processed,
        percentage: percentage(progress.processed, progress.total),
        current_name: progress.current_name,
        current_email: progress.current_candidate,
        current_email_index: progress.current_candidate_index,
        total_emails: progress.total_candidates,
        email_percentage: percentage(progress.current_candidate_index, progress.total_candidates),
        error_message,
        valid_emails: progress.valid_emails,
        all_checked_emails: group_checked(progress.checked),
        results: progress.results.into_iter().map(convert_person_result).collect(),
    }
}
