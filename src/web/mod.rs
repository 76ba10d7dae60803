// Web server: Axum-based JSON API on the loopback interface.
//
// POST /check classifies an image by path, GET /ping answers liveness checks.
// The loaded model and the policy are built once at startup and shared
// read-only with every handler through AppState.

use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::BIND_ADDR;
use crate::model::provider::ModelProvider;
use crate::policy::VerdictPolicy;

pub mod handlers;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// None only when no model has been attached; every check then gets 503
    pub provider: Option<ModelProvider>,
    pub policy: Arc<VerdictPolicy>,
}

impl AppState {
    pub fn new(provider: Option<ModelProvider>, policy: VerdictPolicy) -> Self {
        Self {
            provider,
            policy: Arc::new(policy),
        }
    }
}

/// Start the Axum web server and block until Ctrl-C.
pub async fn run_server(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    let addr = format!("{BIND_ADDR}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("NSFW check service listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/check", post(handlers::check::check_image))
        .route("/ping", get(ping))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness check: always 200, whether or not a model is loaded.
async fn ping() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}
