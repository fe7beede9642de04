use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record that a step has been applied to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
    pub result_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
}

impl LedgerEntry {
    pub fn new(sequence: u64, name: &str, result_ref: &str) -> Self {
        Self {
            sequence,
            name: name.to_string(),
            applied_at: Utc::now(),
            result_ref: result_ref.to_string(),
            receipt_id: None,
        }
    }

    pub fn with_receipt(mut self, receipt_id: &str) -> Self {
        self.receipt_id = Some(receipt_id.to_string());
        self
    }
}

/// Journal record of a deployment that was started but not yet recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeployment {
    pub sequence: u64,
    pub name: String,
    pub started_at: DateTime<Utc>,
    /// Set once the client has accepted the submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
    /// Set once the deployment is confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
}

impl PendingDeployment {
    pub fn new(sequence: u64, name: &str) -> Self {
        Self {
            sequence,
            name: name.to_string(),
            started_at: Utc::now(),
            receipt_id: None,
            result_ref: None,
        }
    }

    /// True when nothing is known about whether the submission took effect.
    pub fn is_unknown(&self) -> bool {
        self.receipt_id.is_none() && self.result_ref.is_none()
    }
}
