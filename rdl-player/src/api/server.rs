//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::playback::SharedManager;
use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub manager: SharedManager,
    /// Media backend name, reported by /health
    pub backend: &'static str,
}

/// Build the router with every route
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Page
        .route("/", get(super::ui::serve_index))
        .route("/static/app.js", get(super::ui::serve_app_js))
        // Health and build identification
        .route("/health", get(super::handlers::health))
        .route("/api/buildinfo", get(super::handlers::get_build_info))
        // Lessons and playback control
        .route("/api/lessons", get(super::handlers::list_lessons))
        .route("/api/lessons/:id", get(super::handlers::get_lesson))
        .route("/api/lessons/:id/toggle", post(super::handlers::toggle))
        .route("/api/lessons/:id/seek", post(super::handlers::seek))
        .route("/api/lessons/:id/download", get(super::handlers::download))
        // SSE event stream
        .route("/api/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API on `addr` until `shutdown` resolves
pub async fn run<F>(addr: SocketAddr, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
