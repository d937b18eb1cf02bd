//! API Routes Module
//!
//! - `health`: liveness endpoint
//! - `variations`: candidate generation for one person
//! - `verify`: verification of a single address
//! - `runs`: background runs over many people, with progress polling and stop

pub mod health;
pub mod runs;
pub mod variations;
pub mod verify;

use crate::{middleware, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build all API routes and return a configured Router
pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/v1/variations", post(variations::variations_handler))
        .route("/v1/verify", post(verify::verify_handler))
        .route("/v1/runs", post(runs::start_run_handler))
        .route("/v1/runs/progress", get(runs::progress_handler))
        .route("/v1/runs/stop", post(runs::stop_run_handler))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use mailfinder_core::dns::{LookupError, MailDns};
    use mailfinder_core::providers::ProviderRegistry;
    use mailfinder_core::smtp_probe::{MailboxProbe, ProbeReport};
    use mailfinder_core::{EmailVerifier, ProbeConfig, VerificationStatus};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    struct StaticDns;

    #[async_trait]
    impl MailDns for StaticDns {
        async fn mx_hosts(&self, _domain: &str) -> Result<Vec<String>, LookupError> {
            Ok(vec!["mx.example.com".to_string()])
        }

        async fn has_a_records(&self, _domain: &str) -> Result<bool, LookupError> {
            Ok(true)
        }
    }

    /// Accepts one address, rejects the rest, after a fixed delay
    struct StubProbe {
        accept: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl MailboxProbe for StubProbe {
        async fn probe(&self, address: &str) -> ProbeReport {
            tokio::time::sleep(self.delay).await;
            if address == self.accept {
                ProbeReport::new(VerificationStatus::SmtpAccepted, "Valid")
            } else {
                ProbeReport::new(VerificationStatus::SmtpRejected, "Invalid recipient")
            }
        }
    }

    fn app_with_probe_delay(delay: Duration) -> Router {
        let config = AppConfig {
            probe: ProbeConfig::without_delays(),
            ..AppConfig::default()
        };
        let verifier = EmailVerifier::with_components(
            config.probe.clone(),
            Arc::new(StaticDns),
            Arc::new(StubProbe {
                accept: "ivan.petrov@example.com",
                delay,
            }),
            ProviderRegistry::default(),
        );
        build_routes(Arc::new(AppState::new(config, Arc::new(verifier))))
    }

    fn app() -> Router {
        app_with_probe_delay(Duration::ZERO)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), get_request("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["run_active"], false);
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let request = Request::builder()
            .uri("/health")
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn test_variations() {
        let (status, body) = send(
            &app(),
            post_json(
                "/v1/variations",
                json!({"first_name": "Иван", "last_name": "Петров", "domain": "Example.com"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["candidates"][0], "ivan@example.com");
        assert_eq!(body["count"].as_u64(), body["candidates"].as_array().map(|c| c.len() as u64));
    }

    #[tokio::test]
    async fn test_variations_requires_all_fields() {
        let (status, body) = send(
            &app(),
            post_json(
                "/v1/variations",
                json!({"first_name": "Иван", "last_name": "", "domain": "example.com"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_verify_accepted_address() {
        let (status, body) = send(
            &app(),
            post_json("/v1/verify", json!({"email": "ivan.petrov@example.com", "timeout_secs": 5})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], true);
        assert_eq!(body["status"], "smtp_accepted");
        assert_eq!(body["detail"], "Valid");
    }

    #[tokio::test]
    async fn test_verify_classifies_bad_syntax() {
        let (status, body) = send(&app(), post_json("/v1/verify", json!({"email": "a..b@c.com"}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], false);
        assert_eq!(body["status"], "invalid_syntax");
    }

    #[tokio::test]
    async fn test_verify_rejects_out_of_range_timeout() {
        let (status, _) = send(
            &app(),
            post_json("/v1/verify", json!({"email": "ivan@example.com", "timeout_secs": 0})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_progress_when_idle() {
        let (status, body) = send(&app(), get_request("/v1/runs/progress")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "idle");
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let app = app_with_probe_delay(Duration::from_millis(100));
        let run = json!({
            "entries": [{"first_name": "Захар", "last_name": "Гусь", "domain": "acme.io"}],
            "timeout_secs": 5,
            "stop_on_first_valid": true
        });

        let (status, body) = send(&app, post_json("/v1/runs", run.clone())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["total"], 1);

        let (status, body) = send(&app, post_json("/v1/runs", run)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_code"], "BATCH_RUNNING");

        let (status, body) = send(&app, post_json("/v1/runs/stop", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stopped"], true);

        let mut progress = Value::Null;
        for _ in 0..100 {
            progress = send(&app, get_request("/v1/runs/progress")).await.1;
            if progress["status"] == "stopped" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(progress["status"], "stopped");
        assert_eq!(progress["error_message"], "Processing stopped by user");
    }

    #[tokio::test]
    async fn test_run_completes_with_results() {
        let app = app();
        let run = json!({
            "entries": [{"first_name": "Иван", "last_name": "Петров", "domain": "example.com"}],
            "timeout_secs": 5
        });

        let (status, _) = send(&app, post_json("/v1/runs", run)).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let mut progress = Value::Null;
        for _ in 0..100 {
            progress = send(&app, get_request("/v1/runs/progress")).await.1;
            if progress["status"] == "complete" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(progress["status"], "complete");
        assert_eq!(progress["valid_emails"][0]["email"], "ivan.petrov@example.com");
        assert_eq!(progress["results"][0]["status"], "verified");
        assert_eq!(progress["percentage"], 100);
    }
}
