//! Collaborator wiring from environment variables. Missing optional settings
//! fall back to in-process implementations with a warning so a single
//! service can run locally without Postgres, S3 or a mail provider.

use leaseaudit_common::{env_flag, env_opt, env_or, env_string};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::NoTls;

use crate::mailer::{LogMailer, Mailer, ResendMailer, DEFAULT_RESEND_API_BASE};
use crate::pdf::{ExtractLimits, DEFAULT_MAX_PDF_BYTES, DEFAULT_MAX_PDF_PAGES};
use crate::storage::{MemoryStorage, ObjectStorage, S3Storage, StorageConfig};
use crate::store::{AuditStore, MemoryAuditStore, PgAuditStore};

pub const DEFAULT_UPLOAD_BUCKET: &str = "leases";
pub const DEFAULT_OUTPUT_BUCKET: &str = "audit-pdfs";
pub const DEFAULT_MAIL_FROM: &str = "Lease Audit <audits@leaseaudit.app>";

#[derive(Debug, Clone)]
pub struct Buckets {
    pub upload: String,
    pub output: String,
}

impl Buckets {
    pub fn from_env() -> Self {
        Self {
            upload: env_string("UPLOAD_BUCKET", DEFAULT_UPLOAD_BUCKET),
            output: env_string("OUTPUT_BUCKET", DEFAULT_OUTPUT_BUCKET),
        }
    }
}

pub fn http_timeout() -> Duration {
    Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 60u64))
}

pub fn extract_limits() -> ExtractLimits {
    ExtractLimits {
        max_bytes: env_or("MAX_PDF_BYTES", DEFAULT_MAX_PDF_BYTES),
        max_pages: env_or("MAX_PDF_PAGES", DEFAULT_MAX_PDF_PAGES),
    }
}

pub fn mail_from() -> String {
    env_string("MAIL_FROM", DEFAULT_MAIL_FROM)
}

pub async fn connect_store() -> Result<Arc<dyn AuditStore>, String> {
    let Some(database_url) = env_opt("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL not set, audit records are kept in memory");
        return Ok(Arc::new(MemoryAuditStore::new()));
    };

    let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
        .await
        .map_err(|err| format!("connect db failed: {err}"))?;
    tokio::spawn(async move {
        // Drive the connection in the background.
        if let Err(err) = connection.await {
            tracing::error!(error = %err, "database connection error");
        }
    });
    Ok(Arc::new(PgAuditStore::new(client)))
}

pub async fn build_storage() -> Arc<dyn ObjectStorage> {
    let configured = env_opt("STORAGE_ENDPOINT").and_then(|endpoint| {
        Some(StorageConfig {
            endpoint,
            access_key: env_opt("STORAGE_ACCESS_KEY")?,
            secret_key: env_opt("STORAGE_SECRET_KEY")?,
            region: env_string("STORAGE_REGION", "us-east-1"),
            force_path_style: env_flag("STORAGE_FORCE_PATH_STYLE", true),
        })
    });

    match configured {
        Some(config) => {
            tracing::info!(endpoint = config.endpoint.as_str(), "object storage configured");
            Arc::new(S3Storage::new(config).await)
        }
        None => {
            tracing::warn!("object storage not configured, objects are kept in memory");
            Arc::new(MemoryStorage::new())
        }
    }
}

pub fn build_mailer() -> Result<Arc<dyn Mailer>, String> {
    match env_opt("RESEND_API_KEY") {
        Some(api_key) => {
            let api_base = env_string("RESEND_API_BASE", DEFAULT_RESEND_API_BASE);
            Ok(Arc::new(ResendMailer::new(&api_base, api_key, http_timeout())?))
        }
        None => {
            tracing::warn!("RESEND_API_KEY not set, outbound email is logged only");
            Ok(Arc::new(LogMailer::new()))
        }
    }
}
