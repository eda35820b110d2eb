use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{abstract_text, healthz, ingest, readyz};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/ingest", post(ingest))
        .route("/v1/abstract", post(abstract_text))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
