use axum::http::StatusCode;
use lease_core::mailer::lead_notification_email;
use lease_core::storage::{object_key, object_path};
use lease_core::store::StoreError;
use lease_core::{AuditRecord, AuditStatus, IngestJob, Lead, NewAudit, PipelineError};

use crate::checkout::CheckoutError;
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, CheckoutRequest, CheckoutResponse, ConfirmCheckoutRequest,
    ConfirmCheckoutResponse, CreateAuditRequest, DownloadResponse, ErrorResponse, LeadRequest,
    LeadResponse, UploadResponse,
};
use crate::state::{AppState, Handoff};
use crate::worker::WorkerError;

const MAX_ID_LEN: usize = 128;
const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug)]
pub struct ServiceError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ServiceError {
    pub fn new(status: StatusCode, code: &'static str, error: String) -> Self {
        Self {
            status,
            body: ErrorResponse { code, error },
        }
    }

    fn bad_request(code: &'static str, error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, error.into())
    }

    fn upstream(status: Option<u16>, code: &'static str, body: String) -> Self {
        let status = status
            .and_then(|status| StatusCode::from_u16(status).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let error = if body.trim().is_empty() {
            format!("upstream returned {status}")
        } else {
            body
        };
        Self::new(status, code, error)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => Self::new(StatusCode::CONFLICT, "audit_exists", err.to_string()),
            StoreError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "audit_not_found", err.to_string())
            }
            StoreError::Backend(_) => {
                tracing::error!(error = %err, "store failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_failed", err.to_string())
            }
        }
    }
}

impl From<PipelineError> for ServiceError {
    fn from(err: PipelineError) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<WorkerError> for ServiceError {
    fn from(err: WorkerError) -> Self {
        Self::upstream(err.status, "worker_failed", err.body)
    }
}

impl From<CheckoutError> for ServiceError {
    fn from(err: CheckoutError) -> Self {
        Self::upstream(err.status, "checkout_failed", err.body)
    }
}

/// Trimmed, non-blank value or a 400 naming the field.
fn required(value: Option<String>, field: &str) -> Result<String, ServiceError> {
    match value.map(|value| value.trim().to_string()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ServiceError::bad_request(
            "missing_field",
            format!("{field} is required"),
        )),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Audit ids end up in object keys, so they are restricted to a safe alphabet.
pub fn is_valid_audit_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn audit_id_or_new(value: Option<String>) -> Result<String, ServiceError> {
    let id = optional(value).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if !is_valid_audit_id(&id) {
        return Err(ServiceError::bad_request(
            "invalid_audit_id",
            "auditId may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(id)
}

pub fn looks_like_email(value: &str) -> bool {
    if value.len() > 254 || value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

async fn dispatch(state: &AppState, job: &IngestJob) -> Result<(), ServiceError> {
    tracing::info!(
        audit_id = job.audit_id.as_str(),
        mode = state.handoff.mode(),
        "dispatching ingestion"
    );
    match &state.handoff {
        Handoff::Worker(worker) => worker.ingest(job).await.map_err(|err| {
            tracing::warn!(
                audit_id = job.audit_id.as_str(),
                status = ?err.status,
                "worker rejected ingestion"
            );
            ServiceError::from(err)
        }),
        Handoff::Inline(pipeline) => {
            pipeline.run(job).await?;
            Ok(())
        }
    }
}

pub async fn create_audit(
    state: &AppState,
    payload: CreateAuditRequest,
) -> Result<AuditRecord, ServiceError> {
    let id = audit_id_or_new(payload.audit_id)?;
    let record = state
        .store
        .create_pending(&NewAudit {
            id,
            source_path: optional(payload.object_path),
            email: optional(payload.email),
        })
        .await?;
    tracing::info!(audit_id = record.id.as_str(), "audit created");
    Ok(record)
}

pub async fn get_audit(state: &AppState, audit_id: &str) -> Result<AuditRecord, ServiceError> {
    state.store.find(audit_id).await?.ok_or_else(|| {
        ServiceError::new(
            StatusCode::NOT_FOUND,
            "audit_not_found",
            format!("audit {audit_id} not found"),
        )
    })
}

pub async fn analyze(
    state: &AppState,
    payload: AnalyzeRequest,
) -> Result<AnalyzeResponse, ServiceError> {
    let audit_id = required(payload.audit_id, "auditId")?;
    let object_path = required(payload.object_path, "objectPath")?;
    if !is_valid_audit_id(&audit_id) {
        return Err(ServiceError::bad_request(
            "invalid_audit_id",
            "auditId may only contain letters, digits, '-' and '_'",
        ));
    }
    let email = optional(payload.email);

    state
        .store
        .create_pending(&NewAudit {
            id: audit_id.clone(),
            source_path: Some(object_path.clone()),
            email: email.clone(),
        })
        .await?;

    dispatch(
        state,
        &IngestJob {
            audit_id,
            object_path,
            email,
        },
    )
    .await?;
    Ok(AnalyzeResponse { success: true })
}

/// Parsed multipart upload.
#[derive(Default)]
pub struct UploadForm {
    pub file: Option<Vec<u8>>,
    pub email: Option<String>,
    pub audit_id: Option<String>,
}

pub async fn upload(state: &AppState, form: UploadForm) -> Result<UploadResponse, ServiceError> {
    let Some(file) = form.file else {
        return Err(ServiceError::bad_request("missing_file", "file is required"));
    };
    if file.len() > state.max_upload_bytes {
        return Err(ServiceError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "file_too_large",
            format!("file exceeds {} bytes", state.max_upload_bytes),
        ));
    }
    if !file.starts_with(PDF_MAGIC) {
        return Err(ServiceError::bad_request("not_a_pdf", "file is not a PDF"));
    }

    let audit_id = audit_id_or_new(form.audit_id)?;
    let email = optional(form.email);
    let key = format!("{audit_id}.pdf");
    let source_path = object_path(&state.upload_bucket, &key);

    // Claim the id before writing, so a duplicate never overwrites a stored lease.
    state
        .store
        .create_pending(&NewAudit {
            id: audit_id.clone(),
            source_path: Some(source_path.clone()),
            email: email.clone(),
        })
        .await?;

    let size = file.len();
    if let Err(err) = state
        .storage
        .put_object(&state.upload_bucket, &key, file, "application/pdf")
        .await
    {
        tracing::error!(audit_id = audit_id.as_str(), error = %err, "lease upload failed");
        if let Err(mark_err) = state.store.mark_failed(&audit_id, &err).await {
            tracing::warn!(audit_id = audit_id.as_str(), error = %mark_err, "could not record failure");
        }
        return Err(ServiceError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upload_failed",
            err,
        ));
    }
    tracing::info!(audit_id = audit_id.as_str(), bytes = size, "lease uploaded");

    dispatch(
        state,
        &IngestJob {
            audit_id: audit_id.clone(),
            object_path: source_path.clone(),
            email,
        },
    )
    .await?;

    Ok(UploadResponse {
        success: true,
        audit_id,
        object_path: source_path,
    })
}

pub async fn download(state: &AppState, audit_id: &str) -> Result<DownloadResponse, ServiceError> {
    let record = get_audit(state, audit_id).await?;
    let Some(output_path) = record.output_path.as_deref() else {
        return Err(ServiceError::new(
            StatusCode::NOT_FOUND,
            "not_ready",
            format!("report for audit {audit_id} is not ready"),
        ));
    };

    let bucket = state.output_bucket.as_str();
    let url = state
        .storage
        .presign_get(bucket, object_key(bucket, output_path), state.download_ttl_secs)
        .await
        .map_err(|err| {
            tracing::error!(audit_id, error = %err, "signing download url failed");
            ServiceError::new(StatusCode::INTERNAL_SERVER_ERROR, "signing_failed", err)
        })?;
    Ok(DownloadResponse { url })
}

fn checkout_unavailable() -> ServiceError {
    ServiceError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "checkout_unavailable",
        "payments are not configured".to_string(),
    )
}

pub async fn checkout(
    state: &AppState,
    payload: CheckoutRequest,
) -> Result<CheckoutResponse, ServiceError> {
    let client = state.checkout.as_ref().ok_or_else(checkout_unavailable)?;
    let record = create_audit(
        state,
        CreateAuditRequest {
            audit_id: payload.audit_id,
            object_path: payload.object_path,
            email: payload.email,
        },
    )
    .await?;

    let session = client
        .create_session(&record.id, record.email.as_deref())
        .await?;
    state
        .store
        .attach_checkout_session(&record.id, &session.id)
        .await?;
    let url = session.url.ok_or_else(|| {
        ServiceError::new(
            StatusCode::BAD_GATEWAY,
            "checkout_failed",
            "checkout session has no url".to_string(),
        )
    })?;
    tracing::info!(
        audit_id = record.id.as_str(),
        session_id = session.id.as_str(),
        "checkout session created"
    );
    Ok(CheckoutResponse {
        url,
        audit_id: record.id,
    })
}

pub async fn confirm_checkout(
    state: &AppState,
    payload: ConfirmCheckoutRequest,
) -> Result<ConfirmCheckoutResponse, ServiceError> {
    let client = state.checkout.as_ref().ok_or_else(checkout_unavailable)?;
    let session_id = required(payload.session_id, "sessionId")?;
    if !is_valid_audit_id(&session_id) {
        return Err(ServiceError::bad_request(
            "invalid_session_id",
            "sessionId is malformed",
        ));
    }

    let session = client.retrieve_session(&session_id).await?;
    let record = match state.store.find_by_checkout_session(&session.id).await? {
        Some(record) => Some(record),
        None => match session.client_reference_id.as_deref() {
            Some(audit_id) => state.store.find(audit_id).await?,
            None => None,
        },
    };
    let Some(record) = record else {
        return Err(ServiceError::new(
            StatusCode::NOT_FOUND,
            "audit_not_found",
            format!("no audit for checkout session {session_id}"),
        ));
    };
    if !session.is_paid() {
        return Err(ServiceError::new(
            StatusCode::PAYMENT_REQUIRED,
            "payment_required",
            format!("checkout session {session_id} is not paid"),
        ));
    }

    if matches!(record.status, AuditStatus::Pending | AuditStatus::Paid) {
        if record.status == AuditStatus::Pending {
            state.store.mark_paid(&record.id).await?;
            tracing::info!(audit_id = record.id.as_str(), "audit paid");
        }
        if let Some(object_path) = record.source_path.clone() {
            dispatch(
                state,
                &IngestJob {
                    audit_id: record.id.clone(),
                    object_path,
                    email: record.email.clone(),
                },
            )
            .await?;
        }
    }

    let current = get_audit(state, &record.id).await?;
    Ok(ConfirmCheckoutResponse {
        success: true,
        audit_id: current.id,
        status: current.status,
    })
}

pub async fn create_lead(
    state: &AppState,
    payload: LeadRequest,
) -> Result<LeadResponse, ServiceError> {
    let email = required(payload.email, "email")?;
    if !looks_like_email(&email) {
        return Err(ServiceError::bad_request(
            "invalid_email",
            format!("{email} is not a valid email address"),
        ));
    }
    let lead = Lead {
        email,
        name: optional(payload.name),
        company: optional(payload.company),
        message: optional(payload.message),
        source: optional(payload.source),
    };
    state.store.insert_lead(&lead).await?;
    tracing::info!(source = lead.source.as_deref().unwrap_or("unknown"), "lead captured");

    if let Some(to) = state.leads_notify_email.as_deref() {
        let message = lead_notification_email(&state.mail_from, to, &lead);
        if let Err(err) = state.mailer.send(&message).await {
            tracing::warn!(error = %err, "lead notification failed");
        }
    }
    Ok(LeadResponse { success: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::{CheckoutClient, CheckoutConfig};
    use crate::worker::{WorkerClient, WORKER_KEY_HEADER};
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use lease_core::mailer::LogMailer;
    use lease_core::pdf::ExtractLimits;
    use lease_core::report::text_pdf;
    use lease_core::storage::{MemoryStorage, ObjectStorage};
    use lease_core::store::{AuditStore, MemoryAuditStore};
    use lease_core::{Confidence, LeaseAbstract, Pipeline, PipelineConfig};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct Fixture {
        state: AppState,
        store: Arc<MemoryAuditStore>,
        storage: Arc<MemoryStorage>,
        mailer: Arc<LogMailer>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryAuditStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let mailer = Arc::new(LogMailer::new());
        let pipeline = Pipeline::new(
            store.clone(),
            storage.clone(),
            mailer.clone(),
            PipelineConfig {
                upload_bucket: "leases".to_string(),
                output_bucket: "audit-pdfs".to_string(),
                limits: ExtractLimits::default(),
                link_ttl_secs: 3600,
                mail_from: "Audits <audits@example.com>".to_string(),
            },
        );
        let state = AppState {
            store: store.clone(),
            storage: storage.clone(),
            mailer: mailer.clone(),
            handoff: Handoff::Inline(Arc::new(pipeline)),
            checkout: None,
            upload_bucket: "leases".to_string(),
            output_bucket: "audit-pdfs".to_string(),
            download_ttl_secs: 3600,
            max_upload_bytes: 1024 * 1024,
            mail_from: "Audits <audits@example.com>".to_string(),
            leads_notify_email: None,
        };
        Fixture {
            state,
            store,
            storage,
            mailer,
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[derive(Clone)]
    struct FakeWorker {
        status: StatusCode,
        calls: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn fake_ingest(
        State(fake): State<FakeWorker>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        let key = headers
            .get(WORKER_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        fake.calls.lock().await.push((key, body));
        if fake.status.is_success() {
            (fake.status, "{\"success\":true}".to_string())
        } else {
            (fake.status, "document rejected by worker".to_string())
        }
    }

    async fn worker_handoff(status: StatusCode) -> (Handoff, Arc<Mutex<Vec<(Option<String>, Value)>>>) {
        let fake = FakeWorker {
            status,
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        let calls = fake.calls.clone();
        let router = Router::new()
            .route("/v1/ingest", post(fake_ingest))
            .with_state(fake);
        let base = serve(router).await;
        let client =
            WorkerClient::new(&base, "s3cret".to_string(), Duration::from_secs(5)).unwrap();
        (Handoff::Worker(client), calls)
    }

    fn analyze_request(id: &str, path: &str) -> AnalyzeRequest {
        AnalyzeRequest {
            audit_id: Some(id.to_string()),
            object_path: Some(path.to_string()),
            email: None,
        }
    }

    fn lease_pdf() -> Vec<u8> {
        text_pdf(&[vec![
            "Tenant: Blue Door Coffee".to_string(),
            "Landlord: Maple Grove Holdings".to_string(),
            "Premises: Suite 210".to_string(),
        ]])
        .unwrap()
    }

    #[tokio::test]
    async fn analyze_records_pending_audit_and_calls_worker() {
        let mut f = fixture();
        let (handoff, calls) = worker_handoff(StatusCode::OK).await;
        f.state.handoff = handoff;

        let response = analyze(&f.state, analyze_request("a1", "leases/a1.pdf"))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": true})
        );

        let record = f.store.find("a1").await.unwrap().unwrap();
        assert_eq!(record.status, AuditStatus::Pending);
        assert_eq!(record.source_path.as_deref(), Some("leases/a1.pdf"));

        let calls = calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_deref(), Some("s3cret"));
        assert_eq!(
            calls[0].1,
            json!({"auditId": "a1", "objectPath": "leases/a1.pdf"})
        );
    }

    #[tokio::test]
    async fn duplicate_audit_is_rejected_before_handoff() {
        let mut f = fixture();
        let (handoff, calls) = worker_handoff(StatusCode::OK).await;
        f.state.handoff = handoff;

        analyze(&f.state, analyze_request("a1", "leases/a1.pdf"))
            .await
            .unwrap();
        let err = analyze(&f.state, analyze_request("a1", "leases/a1.pdf"))
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.body.code, "audit_exists");
        assert_eq!(calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn worker_failure_surfaces_upstream_status_and_body() {
        let mut f = fixture();
        let (handoff, _calls) = worker_handoff(StatusCode::UNPROCESSABLE_ENTITY).await;
        f.state.handoff = handoff;

        let err = analyze(&f.state, analyze_request("a9", "leases/a9.pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body.code, "worker_failed");
        assert_eq!(err.body.error, "document rejected by worker");
    }

    #[tokio::test]
    async fn unreachable_worker_is_bad_gateway() {
        let mut f = fixture();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        f.state.handoff = Handoff::Worker(
            WorkerClient::new(&base, "s3cret".to_string(), Duration::from_secs(2)).unwrap(),
        );

        let err = analyze(&f.state, analyze_request("a2", "leases/a2.pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn analyze_requires_both_ids() {
        let f = fixture();
        let err = analyze(&f.state, analyze_request("  ", "leases/a1.pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = analyze(
            &f.state,
            AnalyzeRequest {
                audit_id: Some("a1".to_string()),
                object_path: None,
                email: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(f.store.find("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inline_analyze_completes_the_audit() {
        let f = fixture();
        f.storage.insert("leases", "a3.pdf", lease_pdf()).await;

        analyze(&f.state, analyze_request("a3", "leases/a3.pdf"))
            .await
            .unwrap();

        let record = get_audit(&f.state, "a3").await.unwrap();
        assert_eq!(record.status, AuditStatus::AnalysisReady);
        let lease = record.lease_abstract.unwrap();
        assert_eq!(lease.tenant_name.as_deref(), Some("Blue Door Coffee"));
        assert_eq!(lease.premises.as_deref(), Some("Suite 210"));
        assert_eq!(lease.landlord_name.as_deref(), Some("Maple Grove Holdings"));
    }

    #[tokio::test]
    async fn download_before_analysis_is_not_ready() {
        let f = fixture();
        f.store
            .create_pending(&NewAudit {
                id: "a4".to_string(),
                source_path: Some("leases/a4.pdf".to_string()),
                email: None,
            })
            .await
            .unwrap();

        let err = download(&f.state, "a4").await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.code, "not_ready");
        assert!(f.storage.presigned().await.is_empty());

        let err = download(&f.state, "missing").await.unwrap_err();
        assert_eq!(err.body.code, "audit_not_found");
    }

    #[tokio::test]
    async fn download_signs_the_unprefixed_key() {
        let f = fixture();
        f.store
            .create_pending(&NewAudit {
                id: "abc123".to_string(),
                source_path: None,
                email: None,
            })
            .await
            .unwrap();
        let lease = LeaseAbstract {
            tenant_name: None,
            landlord_name: None,
            premises: None,
            lease_start: None,
            lease_end: None,
            base_rent: None,
            term_months: None,
            confidence: Confidence::Low,
            raw_text_length: 0,
        };
        f.store
            .complete_analysis("abc123", &lease, "audit-pdfs/abc123.pdf")
            .await
            .unwrap();
        f.storage
            .put_object("audit-pdfs", "abc123.pdf", b"%PDF-1.5".to_vec(), "application/pdf")
            .await
            .unwrap();

        let response = download(&f.state, "abc123").await.unwrap();
        assert!(response.url.contains("abc123.pdf"));
        assert_eq!(
            f.storage.presigned().await,
            vec![("audit-pdfs".to_string(), "abc123.pdf".to_string(), 3600)]
        );
    }

    #[tokio::test]
    async fn upload_stores_lease_and_runs_ingestion() {
        let f = fixture();
        let response = upload(
            &f.state,
            UploadForm {
                file: Some(lease_pdf()),
                email: Some("owner@example.com".to_string()),
                audit_id: Some("u1".to_string()),
            },
        )
        .await
        .unwrap();

        assert_eq!(response.object_path, "leases/u1.pdf");
        assert!(f.storage.contains("leases", "u1.pdf").await);
        let record = f.store.find("u1").await.unwrap().unwrap();
        assert_eq!(record.status, AuditStatus::AnalysisReady);
        assert_eq!(f.mailer.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn upload_rejects_non_pdf_and_oversize() {
        let f = fixture();
        let err = upload(
            &f.state,
            UploadForm {
                file: Some(b"hello".to_vec()),
                ..UploadForm::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.body.code, "not_a_pdf");

        let mut big = b"%PDF".to_vec();
        big.resize(f.state.max_upload_bytes + 1, b' ');
        let err = upload(
            &f.state,
            UploadForm {
                file: Some(big),
                ..UploadForm::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::PAYLOAD_TOO_LARGE);

        let err = upload(&f.state, UploadForm::default()).await.unwrap_err();
        assert_eq!(err.body.code, "missing_file");
    }

    #[tokio::test]
    async fn generated_audit_ids_are_uuids() {
        let f = fixture();
        let record = create_audit(
            &f.state,
            CreateAuditRequest {
                audit_id: None,
                object_path: Some(" leases/x.pdf ".to_string()),
                email: Some("".to_string()),
            },
        )
        .await
        .unwrap();
        assert!(uuid::Uuid::parse_str(&record.id).is_ok());
        assert_eq!(record.source_path.as_deref(), Some("leases/x.pdf"));
        assert_eq!(record.email, None);

        let err = create_audit(
            &f.state,
            CreateAuditRequest {
                audit_id: Some("../etc".to_string()),
                object_path: None,
                email: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.body.code, "invalid_audit_id");
    }

    #[derive(Clone)]
    struct FakeStripe {
        payment_status: &'static str,
        forms: Arc<Mutex<Vec<String>>>,
    }

    async fn fake_create_session(State(fake): State<FakeStripe>, body: String) -> Json<Value> {
        let audit_id = body
            .split('&')
            .find_map(|pair| pair.strip_prefix("client_reference_id="))
            .unwrap_or_default()
            .to_string();
        fake.forms.lock().await.push(body);
        Json(json!({
            "id": "cs_test_1",
            "url": "https://checkout.example.com/cs_test_1",
            "payment_status": "unpaid",
            "client_reference_id": audit_id,
        }))
    }

    async fn fake_get_session(
        State(fake): State<FakeStripe>,
        Path(id): Path<String>,
    ) -> Json<Value> {
        Json(json!({
            "id": id,
            "url": null,
            "payment_status": fake.payment_status,
            "client_reference_id": "p1",
        }))
    }

    async fn checkout_client(payment_status: &'static str) -> (CheckoutClient, Arc<Mutex<Vec<String>>>) {
        let fake = FakeStripe {
            payment_status,
            forms: Arc::new(Mutex::new(Vec::new())),
        };
        let forms = fake.forms.clone();
        let router = Router::new()
            .route("/v1/checkout/sessions", post(fake_create_session))
            .route("/v1/checkout/sessions/:id", get(fake_get_session))
            .with_state(fake);
        let base = serve(router).await;
        let client = CheckoutClient::new(
            CheckoutConfig {
                api_base: base,
                secret_key: "sk_test".to_string(),
                price_id: "price_1".to_string(),
                success_url: "https://app.example.com/ok".to_string(),
                cancel_url: "https://app.example.com/cancel".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        (client, forms)
    }

    #[tokio::test]
    async fn checkout_without_payments_configured_is_unavailable() {
        let f = fixture();
        let err = checkout(
            &f.state,
            CheckoutRequest {
                audit_id: Some("p0".to_string()),
                object_path: None,
                email: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(f.store.find("p0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn paid_checkout_marks_audit_and_dispatches() {
        let mut f = fixture();
        let (client, forms) = checkout_client("paid").await;
        let (handoff, calls) = worker_handoff(StatusCode::OK).await;
        f.state.checkout = Some(client);
        f.state.handoff = handoff;

        let created = checkout(
            &f.state,
            CheckoutRequest {
                audit_id: Some("p1".to_string()),
                object_path: Some("leases/p1.pdf".to_string()),
                email: Some("owner@example.com".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(created.url, "https://checkout.example.com/cs_test_1");
        assert_eq!(created.audit_id, "p1");
        assert!(forms.lock().await[0].contains("client_reference_id=p1"));
        let record = f.store.find("p1").await.unwrap().unwrap();
        assert_eq!(record.checkout_session_id.as_deref(), Some("cs_test_1"));

        let confirmed = confirm_checkout(
            &f.state,
            ConfirmCheckoutRequest {
                session_id: Some("cs_test_1".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(confirmed.audit_id, "p1");
        assert_eq!(confirmed.status, AuditStatus::Paid);

        let calls = calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].1,
            json!({
                "auditId": "p1",
                "objectPath": "leases/p1.pdf",
                "email": "owner@example.com"
            })
        );
    }

    #[tokio::test]
    async fn unpaid_checkout_is_payment_required() {
        let mut f = fixture();
        let (client, _forms) = checkout_client("unpaid").await;
        f.state.checkout = Some(client);
        checkout(
            &f.state,
            CheckoutRequest {
                audit_id: Some("p1".to_string()),
                object_path: None,
                email: None,
            },
        )
        .await
        .unwrap();

        let err = confirm_checkout(
            &f.state,
            ConfirmCheckoutRequest {
                session_id: Some("cs_test_1".to_string()),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::PAYMENT_REQUIRED);
        let record = f.store.find("p1").await.unwrap().unwrap();
        assert_eq!(record.status, AuditStatus::Pending);
    }

    #[tokio::test]
    async fn leads_require_a_valid_email() {
        let f = fixture();
        for email in [None, Some(""), Some("not-an-email"), Some("a@b")] {
            let err = create_lead(
                &f.state,
                LeadRequest {
                    email: email.map(str::to_string),
                    name: None,
                    company: None,
                    message: None,
                    source: None,
                },
            )
            .await
            .unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
        assert!(f.store.leads().await.is_empty());
    }

    #[tokio::test]
    async fn lead_is_stored_and_forwarded() {
        let mut f = fixture();
        f.state.leads_notify_email = Some("sales@example.com".to_string());

        create_lead(
            &f.state,
            LeadRequest {
                email: Some(" cfo@tenant.com ".to_string()),
                name: Some("Dana".to_string()),
                company: Some("".to_string()),
                message: None,
                source: Some("pricing".to_string()),
            },
        )
        .await
        .unwrap();

        let leads = f.store.leads().await;
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].email, "cfo@tenant.com");
        assert_eq!(leads[0].company, None);
        let sent = f.mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["sales@example.com".to_string()]);
    }

    #[test]
    fn audit_id_alphabet() {
        assert!(is_valid_audit_id("a1"));
        assert!(is_valid_audit_id("7d3f2c1e-9b8a-4c5d-8e7f-6a5b4c3d2e1f"));
        assert!(!is_valid_audit_id("a/1"));
        assert!(!is_valid_audit_id(""));
        assert!(!is_valid_audit_id(&"x".repeat(MAX_ID_LEN + 1)));
    }
}
