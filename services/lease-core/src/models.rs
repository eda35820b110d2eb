use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Paid,
    AnalysisReady,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Paid => "paid",
            AuditStatus::AnalysisReady => "analysis_ready",
            AuditStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "paid" => Ok(AuditStatus::Paid),
            "analysis_ready" => Ok(AuditStatus::AnalysisReady),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(format!("unknown audit status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Low => "low",
        }
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Confidence::High),
            "low" => Ok(Confidence::Low),
            other => Err(format!("unknown confidence: {other}")),
        }
    }
}

/// Fields pulled out of a lease. Every key is always serialized, `null` when
/// the extractor found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseAbstract {
    pub tenant_name: Option<String>,
    pub landlord_name: Option<String>,
    pub premises: Option<String>,
    pub lease_start: Option<String>,
    pub lease_end: Option<String>,
    pub base_rent: Option<String>,
    pub term_months: Option<u32>,
    pub confidence: Confidence,
    pub raw_text_length: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub status: AuditStatus,
    pub email: Option<String>,
    pub source_path: Option<String>,
    pub output_path: Option<String>,
    pub checkout_session_id: Option<String>,
    pub error: Option<String>,
    pub lease_abstract: Option<LeaseAbstract>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewAudit {
    pub id: String,
    pub source_path: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lead {
    pub email: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub message: Option<String>,
    pub source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            AuditStatus::Pending,
            AuditStatus::Paid,
            AuditStatus::AnalysisReady,
            AuditStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AuditStatus>(), Ok(status));
        }
        assert!("done".parse::<AuditStatus>().is_err());
    }

    #[test]
    fn abstract_serializes_every_key() {
        let value = serde_json::to_value(LeaseAbstract {
            tenant_name: None,
            landlord_name: None,
            premises: None,
            lease_start: None,
            lease_end: None,
            base_rent: None,
            term_months: None,
            confidence: Confidence::Low,
            raw_text_length: 0,
        })
        .unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 9);
        assert!(object["tenant_name"].is_null());
        assert_eq!(object["confidence"], "low");
    }
}
