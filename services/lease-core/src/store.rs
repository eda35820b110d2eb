use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_postgres::{error::SqlState, Client, Row};

use crate::models::{AuditRecord, AuditStatus, Confidence, Lead, LeaseAbstract, NewAudit};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("audit {0} already exists")]
    Duplicate(String),
    #[error("audit {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Backend(String),
}

/// Persistence for audit records and marketing leads.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create_pending(&self, audit: &NewAudit) -> Result<AuditRecord, StoreError>;
    async fn find(&self, audit_id: &str) -> Result<Option<AuditRecord>, StoreError>;
    async fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<AuditRecord>, StoreError>;
    async fn attach_checkout_session(
        &self,
        audit_id: &str,
        session_id: &str,
    ) -> Result<(), StoreError>;
    async fn mark_paid(&self, audit_id: &str) -> Result<(), StoreError>;
    async fn complete_analysis(
        &self,
        audit_id: &str,
        lease: &LeaseAbstract,
        output_path: &str,
    ) -> Result<(), StoreError>;
    async fn mark_failed(&self, audit_id: &str, reason: &str) -> Result<(), StoreError>;
    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError>;
}

const AUDIT_COLUMNS: &str = "id, status, email, source_path, output_path, checkout_session_id, \
error, tenant_name, landlord_name, premises, lease_start, lease_end, base_rent, term_months, \
confidence, raw_text_length, \
to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS\"Z\"') AS created_at, \
to_char(updated_at AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS\"Z\"') AS updated_at";

const SQL_UPDATE_ANALYSIS: &str = "UPDATE lease_audits SET status = 'analysis_ready', \
output_path = $2, tenant_name = $3, landlord_name = $4, premises = $5, lease_start = $6, \
lease_end = $7, base_rent = $8, term_months = $9, confidence = $10, raw_text_length = $11, \
error = NULL, updated_at = NOW() WHERE id = $1";
const SQL_UPDATE_FAILED: &str =
    "UPDATE lease_audits SET status = 'failed', error = $2, updated_at = NOW() WHERE id = $1";
const SQL_UPDATE_PAID: &str =
    "UPDATE lease_audits SET status = 'paid', updated_at = NOW() WHERE id = $1";
const SQL_UPDATE_SESSION: &str =
    "UPDATE lease_audits SET checkout_session_id = $2, updated_at = NOW() WHERE id = $1";
const SQL_INSERT_LEAD: &str =
    "INSERT INTO leads (email, name, company, message, source) VALUES ($1, $2, $3, $4, $5)";

fn insert_audit_sql() -> String {
    format!(
        "INSERT INTO lease_audits (id, status, source_path, email) VALUES ($1, 'pending', $2, $3) \
RETURNING {AUDIT_COLUMNS}"
    )
}

fn select_audit_sql(column: &str) -> String {
    format!("SELECT {AUDIT_COLUMNS} FROM lease_audits WHERE {column} = $1")
}

fn record_from_row(row: &Row) -> Result<AuditRecord, StoreError> {
    let status: String = row.get("status");
    let status = status.parse::<AuditStatus>().map_err(StoreError::Backend)?;
    let raw_text_length: Option<i64> = row.get("raw_text_length");
    let lease_abstract = match raw_text_length {
        Some(length) => {
            let confidence: Option<String> = row.get("confidence");
            let term_months: Option<i32> = row.get("term_months");
            Some(LeaseAbstract {
                tenant_name: row.get("tenant_name"),
                landlord_name: row.get("landlord_name"),
                premises: row.get("premises"),
                lease_start: row.get("lease_start"),
                lease_end: row.get("lease_end"),
                base_rent: row.get("base_rent"),
                term_months: term_months.and_then(|months| u32::try_from(months).ok()),
                confidence: confidence
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(Confidence::Low),
                raw_text_length: length.max(0) as u64,
            })
        }
        None => None,
    };

    Ok(AuditRecord {
        id: row.get("id"),
        status,
        email: row.get("email"),
        source_path: row.get("source_path"),
        output_path: row.get("output_path"),
        checkout_session_id: row.get("checkout_session_id"),
        error: row.get("error"),
        lease_abstract,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// `lease_audits` / `leads` tables on Postgres.
pub struct PgAuditStore {
    db: Arc<Mutex<Client>>,
}

impl PgAuditStore {
    pub fn new(client: Client) -> Self {
        Self {
            db: Arc::new(Mutex::new(client)),
        }
    }

    async fn execute_update(
        &self,
        sql: &str,
        audit_id: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
        action: &str,
    ) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        let updated = db
            .execute(sql, params)
            .await
            .map_err(|err| StoreError::Backend(format!("{action} failed: {err}")))?;
        if updated == 0 {
            return Err(StoreError::NotFound(audit_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn create_pending(&self, audit: &NewAudit) -> Result<AuditRecord, StoreError> {
        let db = self.db.lock().await;
        let row = db
            .query_one(
                insert_audit_sql().as_str(),
                &[&audit.id, &audit.source_path, &audit.email],
            )
            .await
            .map_err(|err| {
                if let Some(db_err) = err.as_db_error() {
                    if db_err.code() == &SqlState::UNIQUE_VIOLATION {
                        return StoreError::Duplicate(audit.id.clone());
                    }
                }
                StoreError::Backend(format!("insert audit failed: {err}"))
            })?;
        record_from_row(&row)
    }

    async fn find(&self, audit_id: &str) -> Result<Option<AuditRecord>, StoreError> {
        let db = self.db.lock().await;
        let row = db
            .query_opt(select_audit_sql("id").as_str(), &[&audit_id])
            .await
            .map_err(|err| StoreError::Backend(format!("select audit failed: {err}")))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<AuditRecord>, StoreError> {
        let db = self.db.lock().await;
        let row = db
            .query_opt(select_audit_sql("checkout_session_id").as_str(), &[&session_id])
            .await
            .map_err(|err| StoreError::Backend(format!("select audit by session failed: {err}")))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn attach_checkout_session(
        &self,
        audit_id: &str,
        session_id: &str,
    ) -> Result<(), StoreError> {
        self.execute_update(
            SQL_UPDATE_SESSION,
            audit_id,
            &[&audit_id, &session_id],
            "attach checkout session",
        )
        .await
    }

    async fn mark_paid(&self, audit_id: &str) -> Result<(), StoreError> {
        self.execute_update(SQL_UPDATE_PAID, audit_id, &[&audit_id], "mark paid")
            .await
    }

    async fn complete_analysis(
        &self,
        audit_id: &str,
        lease: &LeaseAbstract,
        output_path: &str,
    ) -> Result<(), StoreError> {
        let term_months = lease.term_months.and_then(|months| i32::try_from(months).ok());
        let raw_text_length = i64::try_from(lease.raw_text_length).unwrap_or(i64::MAX);
        self.execute_update(
            SQL_UPDATE_ANALYSIS,
            audit_id,
            &[
                &audit_id,
                &output_path,
                &lease.tenant_name,
                &lease.landlord_name,
                &lease.premises,
                &lease.lease_start,
                &lease.lease_end,
                &lease.base_rent,
                &term_months,
                &lease.confidence.as_str(),
                &raw_text_length,
            ],
            "store analysis",
        )
        .await
    }

    async fn mark_failed(&self, audit_id: &str, reason: &str) -> Result<(), StoreError> {
        self.execute_update(SQL_UPDATE_FAILED, audit_id, &[&audit_id, &reason], "mark failed")
            .await
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        db.execute(
            SQL_INSERT_LEAD,
            &[
                &lead.email,
                &lead.name,
                &lead.company,
                &lead.message,
                &lead.source,
            ],
        )
        .await
        .map_err(|err| StoreError::Backend(format!("insert lead failed: {err}")))?;
        Ok(())
    }
}

/// Process-local store for development and tests. Enforces the same
/// unique-id rule as the `lease_audits` primary key.
#[derive(Default)]
pub struct MemoryAuditStore {
    audits: Mutex<HashMap<String, AuditRecord>>,
    leads: Mutex<Vec<Lead>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn leads(&self) -> Vec<Lead> {
        self.leads.lock().await.clone()
    }

    async fn update<F>(&self, audit_id: &str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut AuditRecord) + Send,
    {
        let mut audits = self.audits.lock().await;
        let record = audits
            .get_mut(audit_id)
            .ok_or_else(|| StoreError::NotFound(audit_id.to_string()))?;
        apply(record);
        record.updated_at = timestamp();
        Ok(())
    }
}

/// RFC 3339 in UTC with whole seconds, the same shape the Postgres store selects.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn create_pending(&self, audit: &NewAudit) -> Result<AuditRecord, StoreError> {
        let mut audits = self.audits.lock().await;
        if audits.contains_key(&audit.id) {
            return Err(StoreError::Duplicate(audit.id.clone()));
        }
        let now = timestamp();
        let record = AuditRecord {
            id: audit.id.clone(),
            status: AuditStatus::Pending,
            email: audit.email.clone(),
            source_path: audit.source_path.clone(),
            output_path: None,
            checkout_session_id: None,
            error: None,
            lease_abstract: None,
            created_at: now.clone(),
            updated_at: now,
        };
        audits.insert(audit.id.clone(), record.clone());
        Ok(record)
    }

    async fn find(&self, audit_id: &str) -> Result<Option<AuditRecord>, StoreError> {
        Ok(self.audits.lock().await.get(audit_id).cloned())
    }

    async fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<AuditRecord>, StoreError> {
        let audits = self.audits.lock().await;
        Ok(audits
            .values()
            .find(|record| record.checkout_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn attach_checkout_session(
        &self,
        audit_id: &str,
        session_id: &str,
    ) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        self.update(audit_id, move |record| {
            record.checkout_session_id = Some(session_id)
        })
        .await
    }

    async fn mark_paid(&self, audit_id: &str) -> Result<(), StoreError> {
        self.update(audit_id, |record| record.status = AuditStatus::Paid)
            .await
    }

    async fn complete_analysis(
        &self,
        audit_id: &str,
        lease: &LeaseAbstract,
        output_path: &str,
    ) -> Result<(), StoreError> {
        let lease = lease.clone();
        let output_path = output_path.to_string();
        self.update(audit_id, move |record| {
            record.status = AuditStatus::AnalysisReady;
            record.output_path = Some(output_path);
            record.lease_abstract = Some(lease);
            record.error = None;
        })
        .await
    }

    async fn mark_failed(&self, audit_id: &str, reason: &str) -> Result<(), StoreError> {
        let reason = reason.to_string();
        self.update(audit_id, move |record| {
            record.status = AuditStatus::Failed;
            record.error = Some(reason);
        })
        .await
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        self.leads.lock().await.push(lead.clone());
        Ok(())
    }
}
