use lease_core::LeaseAbstract;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub audit_id: Option<String>,
    pub object_path: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub audit_id: String,
    pub output_path: String,
    #[serde(rename = "abstract")]
    pub lease_abstract: LeaseAbstract,
    pub emailed: bool,
}

#[derive(Debug, Deserialize)]
pub struct AbstractRequest {
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
}
