pub mod config;
pub mod dispatch;
pub mod response;
pub mod routes;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::routes::AppState;

/// All routes, with access logging.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/download/{strategy}/{name}", get(routes::download))
        .route("/strategies", get(routes::strategies))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
