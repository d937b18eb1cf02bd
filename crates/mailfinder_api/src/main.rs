//! Mailbox Discovery API Server
//!
//! JSON HTTP surface over `mailfinder_core`, built with axum and tokio:
//! candidate generation, single-address verification and one background run
//! at a time with pollable progress.

use anyhow::Context;
use axum::Router;
use mailfinder_core::{
    BatchRunner, BatchSupervisor, CandidateVerifier, EmailVerifier, NoDomainFinder,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api_handler;
mod config;
mod middleware;
mod routes;

use config::{load_config, AppConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<EmailVerifier>,
    pub supervisor: Arc<BatchSupervisor>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the run supervisor around an existing verifier
    pub fn new(config: AppConfig, verifier: Arc<EmailVerifier>) -> Self {
        let runner = BatchRunner::new(
            verifier.clone() as Arc<dyn CandidateVerifier>,
            Arc::new(NoDomainFinder),
            &config.probe,
        );

        Self {
            verifier,
            supervisor: Arc::new(BatchSupervisor::new(runner)),
            config: Arc::new(config),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("Failed to load configuration")?;

    init_tracing(&config);

    info!("Starting Mailbox Discovery API v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let verifier = EmailVerifier::new(config.probe.clone())
        .context("Failed to initialize email verifier")?;
    info!(
        "Verifier initialized - SMTP port {}, {}s per candidate",
        config.probe.smtp_port, config.probe.candidate_budget_secs
    );

    let app_state = AppState::new(config.clone(), Arc::new(verifier));
    let supervisor = app_state.supervisor.clone();

    let app = create_router(app_state);

    let ip: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server host: {}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check available at http://{}/health", addr);
    info!("Runs API: http://{}/v1/runs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if supervisor.stop() {
        info!("Stopped the active run at the next boundary");
    }

    info!("Server shut down gracefully");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    routes::build_routes(Arc::new(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(tower_http::cors::Any),
        )
        .layer(CompressionLayer::new())
}

/// Initialize tracing and logging
fn init_tracing(config: &AppConfig) {
    let level = &config.observability.log_level;
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{}={level},mailfinder_core={level},tower_http=info", env!("CARGO_PKG_NAME")).into()
    });

    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
