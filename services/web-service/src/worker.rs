use lease_core::IngestJob;
use std::time::Duration;

pub const WORKER_KEY_HEADER: &str = "X-Lease-Worker-Key";

/// Upstream failure from the worker, passed through to the caller.
#[derive(Debug)]
pub struct WorkerError {
    pub status: Option<u16>,
    pub body: String,
}

#[derive(Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
    ingest_url: String,
    key: String,
}

impl WorkerClient {
    pub fn new(base_url: &str, key: String, timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| format!("build worker client failed: {err}"))?;
        Ok(Self {
            client,
            ingest_url: format!("{}/v1/ingest", base_url.trim_end_matches('/')),
            key,
        })
    }

    pub async fn ingest(&self, job: &IngestJob) -> Result<(), WorkerError> {
        let response = self
            .client
            .post(self.ingest_url.as_str())
            .header(WORKER_KEY_HEADER, self.key.as_str())
            .json(job)
            .send()
            .await
            .map_err(|err| WorkerError {
                status: None,
                body: format!("worker unreachable: {err}"),
            })?;

        let status = response.status();
        tracing::info!(
            audit_id = job.audit_id.as_str(),
            status = status.as_u16(),
            "worker handoff"
        );
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(WorkerError {
            status: Some(status.as_u16()),
            body,
        })
    }
}
