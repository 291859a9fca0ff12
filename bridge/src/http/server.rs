use anyhow::Result;
use axum::{
    Router,
    routing::{get, post, put},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use super::{handlers, state::AppState};

/// Operations API plus the artifact store served as static files.
///
/// Artifact URLs are `/<namespace>/<owner>/<name>/<revision>.tar.gz`, so
/// anything not matching an API route falls through to the store root.
pub fn router(state: Arc<AppState>) -> Router {
    let artifacts = ServeDir::new(&state.controller.store().config().path);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/units", get(handlers::list_units))
        .route(
            "/units/:name",
            put(handlers::apply_unit).delete(handlers::delete_unit),
        )
        .route("/units/:name/diff", post(handlers::diff_unit))
        .fallback_service(artifacts)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve until the state's shutdown token is cancelled
pub async fn start_server(state: Arc<AppState>, bind_address: SocketAddr) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Server listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
