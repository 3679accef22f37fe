//! Drowsiness Monitor API Server
//!
//! Read-only REST API over the session log, frame replay pipeline and the
//! shared pieces of the `drowsiness-monitor` binary.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use alerting::{AlertSink, BellSink, CommandSink, LogSink, SinkError, TimeoutSink};
use dms::DmsConfig;
use storage::Repository;

mod routes;
pub mod replay;
pub mod settings;

pub use replay::{replay, ReplayError, ReplayOptions, ReplaySummary, StopReason};
pub use settings::Settings;

/// Application state shared across handlers
pub struct AppState {
    /// Session log
    pub repository: Arc<Repository>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Prometheus exposition, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state
    pub fn new(repository: Arc<Repository>) -> Self {
        Self {
            repository,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub session_count: usize,
    pub log_path: Option<String>,
}

/// Create the application router
pub fn create_router(state: Arc<RwLock<AppState>>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/sessions", get(routes::sessions::list_sessions))
        .route("/api/v1/sessions/latest", get(routes::sessions::latest_session))
        .route("/api/v1/sessions/:id", get(routes::sessions::get_session))
        .route("/api/v1/summary", get(routes::sessions::get_summary))
        .route("/metrics", get(routes::metrics::render))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    let state = state.read().await;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        session_count: state.repository.session_count(),
        log_path: state
            .repository
            .log_path()
            .map(|p| p.display().to_string()),
    })
}

/// Initialize logging on stderr. `filter` takes `RUST_LOG` syntax and is
/// overridden by `RUST_LOG` itself when set.
pub fn init_logging(filter: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // Already set in tests or when embedded
    let _ = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
}

/// Install the process-wide Prometheus recorder behind `/metrics`
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Build the configured alert sink, bounded by the monitor's sink timeout
pub fn build_sink(
    settings: &settings::AlertSettings,
    config: &DmsConfig,
) -> Result<Box<dyn AlertSink>, SinkError> {
    let sink: Box<dyn AlertSink> = match CommandSink::from_argv(&settings.command) {
        Some(command) => {
            info!("Alert sink: external command {:?}", settings.command);
            Box::new(command)
        }
        None if settings.bell => {
            info!("Alert sink: terminal bell");
            Box::new(BellSink::stdout())
        }
        None => Box::new(LogSink::new()),
    };

    Ok(Box::new(TimeoutSink::spawn(sink, config.sink_timeout())?))
}

/// Run the server
pub async fn run_server(addr: &str, state: AppState) -> Result<(), std::io::Error> {
    let app = create_router(Arc::new(RwLock::new(state)));

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down API server");
        })
        .await
}
