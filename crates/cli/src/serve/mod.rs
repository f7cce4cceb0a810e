//! `quayside serve` -- HTTP JSON API over conformance sandboxes.
//!
//! Sandboxes live in process memory. Deferred party work runs on a tokio
//! task worker after `QUAYSIDE_TASK_DELAY_MS`.
//!
//! Security features:
//! - CORS headers on all responses (permissive for local dev)
//! - Optional API key authentication via QUAYSIDE_API_KEY env var
//!
//! Endpoints:
//! - GET  /health                                         - Server status (exempt from auth)
//! - POST /sandboxes                                      - Create a sandbox and start its session
//! - GET  /sandboxes/{id}                                 - Sandbox configuration
//! - POST /sandboxes/{id}/reset                           - Start a new session
//! - POST /sandboxes/{id}/stop                            - Stop the running session
//! - GET  /sandboxes/{id}/status                          - `{scenariosLeft}`
//! - GET  /sandboxes/{id}/report                          - Per-role digest
//!   (`?detailed=true` for full reports, `?role=` to select one role)
//! - GET  /sandboxes/{id}/parties/{party}/prompt          - Pending prompts of a party
//! - POST /sandboxes/{id}/parties/{party}/input           - `{actionId, input}`
//! - GET  /sandboxes/{id}/parties/{party}/log             - Operator log of a simulated party
//! - ANY  /sandboxes/{id}/parties/{party}/api/{*path}     - Standard API of a simulated party
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use quayside_pint::PintComponentFactory;
use quayside_sandbox::{Sandbox, SandboxError, TokioTaskQueue};
use quayside_storage::{MemoryLockingMap, DEFAULT_LOCK_DURATION};

use self::handlers::{
    handle_create_sandbox, handle_get_sandbox, handle_health, handle_not_found,
    handle_party_api, handle_party_input, handle_party_log, handle_party_prompt, handle_report,
    handle_reset, handle_status, handle_stop,
};
use self::middleware::auth_middleware;
use self::state::AppState;

/// Maximum request body size: 10 MB.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Default delay before a deferred task runs.
const DEFAULT_TASK_DELAY_MS: u64 = 50;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Error response for a failed sandbox call. Server-side failures are logged.
fn sandbox_error(error: SandboxError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %error, "sandbox call failed");
    } else {
        tracing::debug!(error = %error, "sandbox call rejected");
    }
    json_error(status, &error.to_string()).into_response()
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    // CORS: permissive for local dev
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sandboxes", post(handle_create_sandbox))
        .route("/sandboxes/{id}", get(handle_get_sandbox))
        .route("/sandboxes/{id}/reset", post(handle_reset))
        .route("/sandboxes/{id}/stop", post(handle_stop))
        .route("/sandboxes/{id}/status", get(handle_status))
        .route("/sandboxes/{id}/report", get(handle_report))
        .route("/sandboxes/{id}/parties/{party}/prompt", get(handle_party_prompt))
        .route("/sandboxes/{id}/parties/{party}/input", post(handle_party_input))
        .route("/sandboxes/{id}/parties/{party}/log", get(handle_party_log))
        .route("/sandboxes/{id}/parties/{party}/api/{*path}", any(handle_party_api))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server on the given port.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP.
///
/// Environment:
/// - `QUAYSIDE_API_KEY`: if set, all endpoints except /health require auth.
/// - `QUAYSIDE_LOCK_DURATION_SECS`: lock duration of stored state (default 60).
/// - `QUAYSIDE_TASK_DELAY_MS`: delay before deferred tasks run (default 50).
pub async fn start_server(
    port: u16,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let lock_duration = env_u64("QUAYSIDE_LOCK_DURATION_SECS")
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_LOCK_DURATION);
    let task_delay =
        Duration::from_millis(env_u64("QUAYSIDE_TASK_DELAY_MS").unwrap_or(DEFAULT_TASK_DELAY_MS));

    // API key: from QUAYSIDE_API_KEY env var (None = no auth)
    let api_key = std::env::var("QUAYSIDE_API_KEY")
        .ok()
        .filter(|k| !k.is_empty());

    let factory = Arc::new(PintComponentFactory::new()?);
    let (queue, worker) = TokioTaskQueue::new(task_delay);
    let sandbox = Arc::new(Sandbox::in_memory(
        factory,
        MemoryLockingMap::new(lock_duration),
        Arc::new(queue),
    ));
    tokio::spawn(worker.run(sandbox.clone()));

    tracing::info!(
        auth = api_key.is_some(),
        lock_duration_secs = lock_duration.as_secs(),
        task_delay_ms = task_delay.as_millis() as u64,
        "sandbox server configured"
    );

    let state = Arc::new(AppState { sandbox, api_key });
    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        tracing::info!("Quayside listening on https://0.0.0.0:{}", port);
        axum_server::bind_rustls(socket_addr, config)
            .serve(app.into_make_service())
            .await?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Quayside listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
