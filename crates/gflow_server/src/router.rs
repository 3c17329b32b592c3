//! Route table.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the application router.
///
/// Evaluation and catalog routes live under `/ai/`; `/health` sits at the root.
pub fn build_router(state: AppState) -> Router {
    let ai = Router::new()
        .route("/evaluate", post(handlers::evaluate))
        .route("/providers", get(handlers::providers))
        .route("/stages", get(handlers::stages))
        .route("/streaming-config", get(handlers::streaming_config));

    Router::new()
        .nest("/ai", ai)
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
}
