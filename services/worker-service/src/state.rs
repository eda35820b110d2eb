use lease_core::Pipeline;
use std::sync::Arc;

use crate::auth::WorkerKey;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub key: WorkerKey,
}
