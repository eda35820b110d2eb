mod app;
mod checkout;
mod config;
mod handlers;
mod models;
mod service;
mod state;
mod worker;

use lease_core::bootstrap::{self, Buckets};
use lease_core::{Pipeline, PipelineConfig};
use leaseaudit_common::{bind_listener, env_or, init_tracing, shutdown_signal};
use std::sync::Arc;

use crate::checkout::CheckoutClient;
use crate::config::WebConfig;
use crate::state::{AppState, Handoff};
use crate::worker::WorkerClient;

#[tokio::main]
async fn main() {
    let _guards = init_tracing("web-service");

    let config = WebConfig::from_env();
    let buckets = Buckets::from_env();
    let mail_from = bootstrap::mail_from();

    let store = bootstrap::connect_store().await.expect("connect store");
    let storage = bootstrap::build_storage().await;
    let mailer = bootstrap::build_mailer().expect("build mailer");

    let handoff = match config.worker_url.as_deref() {
        Some(url) => {
            let key = config
                .worker_key
                .clone()
                .expect("LEASE_WORKER_KEY is required when LEASE_WORKER_URL is set");
            let client =
                WorkerClient::new(url, key, config.worker_timeout).expect("build worker client");
            Handoff::Worker(client)
        }
        None => {
            tracing::warn!("LEASE_WORKER_URL not set, ingestion runs in-process");
            let pipeline = Pipeline::new(
                store.clone(),
                storage.clone(),
                mailer.clone(),
                PipelineConfig {
                    upload_bucket: buckets.upload.clone(),
                    output_bucket: buckets.output.clone(),
                    limits: bootstrap::extract_limits(),
                    link_ttl_secs: env_or("EMAIL_LINK_TTL_SECS", config.download_ttl_secs),
                    mail_from: mail_from.clone(),
                },
            );
            Handoff::Inline(Arc::new(pipeline))
        }
    };

    let checkout = match config.checkout.clone() {
        Some(checkout) => Some(
            CheckoutClient::new(checkout, bootstrap::http_timeout())
                .expect("build checkout client"),
        ),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY or STRIPE_PRICE_ID not set, checkout disabled");
            None
        }
    };

    tracing::info!(
        port = config.port,
        handoff = handoff.mode(),
        download_ttl_secs = config.download_ttl_secs,
        "web service starting"
    );

    let state = AppState {
        store,
        storage,
        mailer,
        handoff,
        checkout,
        upload_bucket: buckets.upload,
        output_bucket: buckets.output,
        download_ttl_secs: config.download_ttl_secs,
        max_upload_bytes: config.max_upload_bytes,
        mail_from,
        leads_notify_email: config.leads_notify_email,
    };

    let app = app::build_router(state);
    let listener = bind_listener(config.port).await.expect("bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("serve");
}
