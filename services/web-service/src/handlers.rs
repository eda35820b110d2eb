use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::models::{
    AnalyzeRequest, CheckoutRequest, ConfirmCheckoutRequest, CreateAuditRequest, LeadRequest,
};
use crate::service::{self, ServiceError, UploadForm};
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz() -> StatusCode {
    StatusCode::OK
}

pub async fn create_audit(
    State(state): State<AppState>,
    Json(payload): Json<CreateAuditRequest>,
) -> impl IntoResponse {
    match service::create_audit(&state, payload).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn get_audit(
    State(state): State<AppState>,
    Path(audit_id): Path<String>,
) -> impl IntoResponse {
    match service::get_audit(&state, &audit_id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    match service::analyze(&state, payload).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

fn multipart_error(err: MultipartError) -> ServiceError {
    ServiceError::new(err.status(), "invalid_upload", err.body_text())
}

async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm, ServiceError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.file = Some(bytes.to_vec());
            }
            "email" => form.email = Some(field.text().await.map_err(multipart_error)?),
            "auditId" => form.audit_id = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }
    Ok(form)
}

pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> impl IntoResponse {
    let result = match read_upload_form(&mut multipart).await {
        Ok(form) => service::upload(&state, form).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn download(
    State(state): State<AppState>,
    Path(audit_id): Path<String>,
) -> impl IntoResponse {
    match service::download(&state, &audit_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> impl IntoResponse {
    match service::checkout(&state, payload).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn confirm_checkout(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmCheckoutRequest>,
) -> impl IntoResponse {
    match service::confirm_checkout(&state, payload).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn create_lead(
    State(state): State<AppState>,
    Json(payload): Json<LeadRequest>,
) -> impl IntoResponse {
    match service::create_lead(&state, payload).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}
