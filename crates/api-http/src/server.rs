//! HTTP Server
//!
//! Router assembly and the serve loop with graceful shutdown.

use crate::handler::{self, AppState};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use catalog_ingest_core::application::ShutdownToken;
use catalog_ingest_core::error::{AppError, Result};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_MAX_UPLOAD_MB: usize = 512;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    /// Upper bound on a single upload request body
    pub max_upload_mb: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }
}

/// Build the REST router
pub fn router(state: AppState, config: &HttpConfig) -> Router {
    let imports = Router::new()
        .route("/imports", post(handler::submit_import))
        .layer(DefaultBodyLimit::max(config.max_upload_mb * 1024 * 1024));

    Router::new()
        .merge(imports)
        .route("/imports/:id", get(handler::get_import))
        .route("/imports/:id/errors", get(handler::list_import_errors))
        .route("/imports/:id/cancel", post(handler::cancel_import))
        .route("/admin/stats", get(handler::stats))
        .route("/admin/dead-letters", get(handler::list_dead_letters))
        .route(
            "/admin/dead-letters/:id/replay",
            post(handler::replay_dead_letter),
        )
        .route("/healthz", get(handler::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the shutdown token fires, then drain in-flight requests
pub async fn serve(listener: TcpListener, app: Router, mut shutdown: ShutdownToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .map_err(|e| AppError::Internal(format!("HTTP server failed: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
