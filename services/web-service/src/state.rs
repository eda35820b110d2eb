use lease_core::mailer::Mailer;
use lease_core::storage::ObjectStorage;
use lease_core::store::AuditStore;
use lease_core::Pipeline;
use std::sync::Arc;

use crate::checkout::CheckoutClient;
use crate::worker::WorkerClient;

/// Where a pending audit goes once its record exists.
#[derive(Clone)]
pub enum Handoff {
    Worker(WorkerClient),
    Inline(Arc<Pipeline>),
}

impl Handoff {
    pub fn mode(&self) -> &'static str {
        match self {
            Handoff::Worker(_) => "worker",
            Handoff::Inline(_) => "inline",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuditStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub handoff: Handoff,
    pub checkout: Option<CheckoutClient>,
    pub upload_bucket: String,
    pub output_bucket: String,
    pub download_ttl_secs: u64,
    pub max_upload_bytes: usize,
    pub mail_from: String,
    pub leads_notify_email: Option<String>,
}
