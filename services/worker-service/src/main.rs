mod app;
mod auth;
mod handlers;
mod models;
mod state;

use lease_core::bootstrap::{self, Buckets};
use lease_core::{Pipeline, PipelineConfig};
use leaseaudit_common::{bind_listener, env_or, init_tracing, shutdown_signal};
use std::sync::Arc;

use crate::auth::WorkerKey;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let _guards = init_tracing("worker-service");

    let port = env_or("PORT", 8081u16);
    let worker_key = std::env::var("LEASE_WORKER_KEY").expect("LEASE_WORKER_KEY is required");
    let link_ttl_secs = env_or("EMAIL_LINK_TTL_SECS", 3600u64);
    let buckets = Buckets::from_env();
    let limits = bootstrap::extract_limits();

    let store = bootstrap::connect_store().await.expect("connect store");
    let storage = bootstrap::build_storage().await;
    let mailer = bootstrap::build_mailer().expect("build mailer");

    tracing::info!(
        port,
        upload_bucket = buckets.upload.as_str(),
        output_bucket = buckets.output.as_str(),
        max_pdf_bytes = limits.max_bytes,
        max_pdf_pages = limits.max_pages,
        "worker service starting"
    );

    let pipeline = Pipeline::new(
        store,
        storage,
        mailer,
        PipelineConfig {
            upload_bucket: buckets.upload,
            output_bucket: buckets.output,
            limits,
            link_ttl_secs,
            mail_from: bootstrap::mail_from(),
        },
    );
    let state = AppState {
        pipeline: Arc::new(pipeline),
        key: WorkerKey::new(&worker_key),
    };

    let app = app::build_router(state);
    let listener = bind_listener(port).await.expect("bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("serve");
}
