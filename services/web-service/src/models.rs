use lease_core::AuditStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuditRequest {
    pub audit_id: Option<String>,
    pub object_path: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub audit_id: Option<String>,
    pub object_path: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub audit_id: String,
    pub object_path: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub audit_id: Option<String>,
    pub object_path: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    pub audit_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmCheckoutRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmCheckoutResponse {
    pub success: bool,
    pub audit_id: String,
    pub status: AuditStatus,
}

#[derive(Debug, Deserialize)]
pub struct LeadRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub message: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
}
