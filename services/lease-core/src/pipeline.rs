//! Ingestion pipeline: download the uploaded lease, extract and abstract its
//! text, publish the report PDF, persist the result and notify the customer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::abstractor::abstract_lease;
use crate::mailer::{report_ready_email, Mailer};
use crate::models::LeaseAbstract;
use crate::pdf::{extract_text_blocking, ExtractError, ExtractLimits};
use crate::report::render_report;
use crate::storage::{object_key, object_path, ObjectStorage};
use crate::store::{AuditStore, StoreError};

/// Handoff payload shared by the web service and the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJob {
    pub audit_id: String,
    pub object_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub audit_id: String,
    pub output_path: String,
    #[serde(rename = "abstract")]
    pub lease_abstract: LeaseAbstract,
    pub emailed: bool,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("audit {0} not found")]
    NotFound(String),
    #[error("audit {0} has no source document")]
    MissingSource(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("report rendering failed: {0}")]
    Report(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
    #[error("sign link failed: {0}")]
    Sign(String),
    #[error("email failed: {0}")]
    Email(String),
}

impl PipelineError {
    /// Problems with the submitted document rather than with a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::NotFound(_) | PipelineError::MissingSource(_) | PipelineError::Extract(_)
        )
    }

    pub fn http_status(&self) -> u16 {
        match self {
            PipelineError::NotFound(_) => 404,
            PipelineError::MissingSource(_) => 400,
            PipelineError::Extract(_) => 422,
            PipelineError::Download(_) | PipelineError::Upload(_) | PipelineError::Email(_) => 502,
            PipelineError::Report(_) | PipelineError::Store(_) | PipelineError::Sign(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) => "audit_not_found",
            PipelineError::MissingSource(_) => "missing_source",
            PipelineError::Extract(_) => "unreadable_document",
            PipelineError::Download(_) => "download_failed",
            PipelineError::Report(_) => "report_failed",
            PipelineError::Upload(_) => "upload_failed",
            PipelineError::Store(_) => "store_failed",
            PipelineError::Sign(_) => "sign_failed",
            PipelineError::Email(_) => "email_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub upload_bucket: String,
    pub output_bucket: String,
    pub limits: ExtractLimits,
    pub link_ttl_secs: u64,
    pub mail_from: String,
}

pub struct Pipeline {
    store: Arc<dyn AuditStore>,
    storage: Arc<dyn ObjectStorage>,
    mailer: Arc<dyn Mailer>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn AuditStore>,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn Mailer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            storage,
            mailer,
            config,
        }
    }

    pub async fn run(&self, job: &IngestJob) -> Result<IngestOutcome, PipelineError> {
        let record = self
            .store
            .find(&job.audit_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(job.audit_id.clone()))?;

        let (output_path, lease) = match self.analyze(job).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(audit_id = job.audit_id.as_str(), error = %err, "ingestion failed");
                if let Err(mark_err) = self.store.mark_failed(&job.audit_id, &err.to_string()).await
                {
                    tracing::warn!(
                        audit_id = job.audit_id.as_str(),
                        error = %mark_err,
                        "could not record failure"
                    );
                }
                return Err(err);
            }
        };

        let recipient = job.email.clone().or(record.email);
        let emailed = match recipient {
            Some(to) => {
                self.notify(&job.audit_id, &to, &lease, &output_path)
                    .await?;
                true
            }
            None => false,
        };

        Ok(IngestOutcome {
            audit_id: job.audit_id.clone(),
            output_path,
            lease_abstract: lease,
            emailed,
        })
    }

    async fn analyze(&self, job: &IngestJob) -> Result<(String, LeaseAbstract), PipelineError> {
        let source = job.object_path.trim();
        if source.is_empty() {
            return Err(PipelineError::MissingSource(job.audit_id.clone()));
        }
        let bucket = self.config.upload_bucket.as_str();
        let bytes = self
            .storage
            .get_object(bucket, object_key(bucket, source))
            .await
            .map_err(PipelineError::Download)?;

        let text = extract_text_blocking(bytes, self.config.limits).await?;
        let lease = abstract_lease(&text);
        tracing::info!(
            audit_id = job.audit_id.as_str(),
            chars = lease.raw_text_length,
            confidence = lease.confidence.as_str(),
            "lease abstracted"
        );

        let report = render_report(&job.audit_id, &lease).map_err(PipelineError::Report)?;
        let key = format!("{}.pdf", job.audit_id);
        self.storage
            .put_object(&self.config.output_bucket, &key, report, "application/pdf")
            .await
            .map_err(PipelineError::Upload)?;

        let output_path = object_path(&self.config.output_bucket, &key);
        self.store
            .complete_analysis(&job.audit_id, &lease, &output_path)
            .await?;
        tracing::info!(
            audit_id = job.audit_id.as_str(),
            output_path = output_path.as_str(),
            "analysis ready"
        );
        Ok((output_path, lease))
    }

    async fn notify(
        &self,
        audit_id: &str,
        to: &str,
        lease: &LeaseAbstract,
        output_path: &str,
    ) -> Result<(), PipelineError> {
        let bucket = self.config.output_bucket.as_str();
        let url = self
            .storage
            .presign_get(bucket, object_key(bucket, output_path), self.config.link_ttl_secs)
            .await
            .map_err(PipelineError::Sign)?;
        let message = report_ready_email(
            &self.config.mail_from,
            to,
            audit_id,
            lease,
            &url,
            self.config.link_ttl_secs,
        );
        self.mailer.send(&message).await.map_err(PipelineError::Email)
    }
}
