use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    analyze, checkout, confirm_checkout, create_audit, create_lead, download, get_audit, healthz,
    readyz, upload,
};
use crate::state::AppState;

// Room for the multipart framing and the small text fields next to the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/audits", post(create_audit))
        .route("/api/audits/:id", get(get_audit))
        .route("/api/audits/:id/download", get(download))
        .route("/api/analyze", post(analyze))
        .route(
            "/api/upload",
            post(upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/checkout", post(checkout))
        .route("/api/checkout/confirm", post(confirm_checkout))
        .route("/api/leads", post(create_lead))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
