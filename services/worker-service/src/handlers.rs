use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use lease_core::{abstract_lease, IngestJob};

use crate::models::{AbstractRequest, ErrorResponse, IngestRequest, IngestResponse};
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz() -> StatusCode {
    StatusCode::OK
}

fn error_response(status: StatusCode, code: &'static str, error: String) -> Response {
    (status, Json(ErrorResponse { code, error })).into_response()
}

fn unauthorized() -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "missing or invalid worker key".to_string(),
    )
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<IngestRequest>,
) -> impl IntoResponse {
    if !state.key.verify(&headers) {
        tracing::warn!("ingest rejected: bad worker key");
        return unauthorized();
    }
    let (Some(audit_id), Some(object_path)) =
        (non_blank(payload.audit_id), non_blank(payload.object_path))
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "missing_field",
            "auditId and objectPath are required".to_string(),
        );
    };

    let job = IngestJob {
        audit_id,
        object_path,
        email: non_blank(payload.email),
    };
    tracing::info!(
        audit_id = job.audit_id.as_str(),
        object_path = job.object_path.as_str(),
        "ingest requested"
    );

    match state.pipeline.run(&job).await {
        Ok(outcome) => {
            let response = IngestResponse {
                success: true,
                audit_id: outcome.audit_id,
                output_path: outcome.output_path,
                lease_abstract: outcome.lease_abstract,
                emailed: outcome.emailed,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            let status = StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if err.is_client_error() {
                tracing::warn!(audit_id = job.audit_id.as_str(), error = %err, "ingest rejected");
            } else {
                tracing::error!(audit_id = job.audit_id.as_str(), error = %err, "ingest failed");
            }
            error_response(status, err.code(), err.to_string())
        }
    }
}

pub async fn abstract_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AbstractRequest>,
) -> impl IntoResponse {
    if !state.key.verify(&headers) {
        return unauthorized();
    }
    let Some(text) = payload.text else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "missing_field",
            "text is required".to_string(),
        );
    };
    (StatusCode::OK, Json(abstract_lease(&text))).into_response()
}
