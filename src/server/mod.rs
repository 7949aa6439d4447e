//! HTTP layer serving the module download protocol
//!
//! Maps the five proxy URIs onto backend calls and backend failures onto
//! wire status codes. `HEAD` is served by the same routes as `GET`.
//!
//! # Modules
//!
//! - [`handlers`]: URI parsing and the five request handlers
//! - [`status`]: missing / out-of-date observability maps

pub mod handlers;
pub mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::backend::Backend;
use crate::server::status::StatusBoard;

#[derive(Clone)]
pub struct AppState {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) status: Arc<StatusBoard>,
}

/// Builds the protocol router over a backend.
pub fn router(backend: Arc<dyn Backend>) -> Router {
    let state = AppState {
        backend,
        status: Arc::new(StatusBoard::new()),
    };
    Router::new()
        .route("/{*path}", get(handlers::dispatch))
        .with_state(state)
}

/// Serves the proxy until the listener fails.
pub async fn serve(listen: SocketAddr, backend: Arc<dyn Backend>) -> std::io::Result<()> {
    let app = router(backend);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("listening on {listen}");
    axum::serve(listener, app).await
}
