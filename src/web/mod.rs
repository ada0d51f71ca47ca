// Web surface
// Single-page chat UI and the JSON API behind it

pub mod error;
pub mod handlers;


use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::Result;
use crate::chat::SessionStore;
use crate::rag::RagEngine;

pub use error::ApiError;

/// Largest accepted PDF upload
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RagEngine>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    #[inline]
    pub fn new(engine: Arc<RagEngine>) -> Self {
        Self {
            engine,
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/health", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session).delete(handlers::end_session),
        )
        .route("/api/sessions/{id}/messages", post(handlers::post_message))
        .route(
            "/api/ingest",
            post(handlers::ingest).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C
#[inline]
pub async fn serve(engine: Arc<RagEngine>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Web UI listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState::new(engine)))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await?;

    Ok(())
}
