use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::Payload;
use crate::identity::Identity;
use crate::step::DeployArgs;

/// Everything a deployment client needs for one submission.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentRequest<'a> {
    pub payload: &'a Payload,
    pub identity: &'a Identity,
    pub args: &'a DeployArgs,
    pub endpoint: &'a str,
    pub expected_network_id: u64,
}

/// A confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReceipt {
    /// Reference to the deployed instance (e.g. a contract address)
    pub result_ref: String,
    /// Stable identifier of the submission that can be queried later
    /// (e.g. a transaction hash)
    pub receipt_id: String,
}

/// Failure modes of a deployment submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    #[error("network mismatch: expected network {expected}, endpoint reports {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    /// The outcome is unknown. `receipt_id` is set when the submission was
    /// accepted but never confirmed.
    #[error("deployment timed out: {message}")]
    Timeout {
        message: String,
        receipt_id: Option<String>,
    },

    /// Nothing reached the network (connection refused, 5xx, ...).
    #[error("transient deployment failure: {0}")]
    Transient(String),

    #[error("deployment rejected: {0}")]
    Rejected(String),
}

impl DeployError {
    /// Whether the runner may try this step again within the same run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeployError::Timeout { .. } | DeployError::Transient(_))
    }

    /// Whether the failed submission could nonetheless have taken effect.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, DeployError::Timeout { .. })
    }

    pub fn receipt_id(&self) -> Option<&str> {
        match self {
            DeployError::Timeout { receipt_id, .. } => receipt_id.as_deref(),
            _ => None,
        }
    }
}

/// Submits payloads to a target network.
#[async_trait]
pub trait DeploymentClient: Send + Sync {
    async fn deploy(
        &self,
        request: DeploymentRequest<'_>,
    ) -> Result<DeploymentReceipt, DeployError>;

    /// Look up an earlier submission by its receipt id.
    ///
    /// Returns the deployed instance reference when the submission took
    /// effect, `None` when the network has no record of it.
    async fn lookup(&self, receipt_id: &str, endpoint: &str) -> Result<Option<String>, DeployError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(DeployError::Transient("refused".into()).is_retryable());
        assert!(
            DeployError::Timeout {
                message: "slow".into(),
                receipt_id: None
            }
            .is_retryable()
        );
        assert!(!DeployError::Rejected("out of gas".into()).is_retryable());
        assert!(
            !DeployError::NetworkMismatch {
                expected: 1337,
                actual: 1
            }
            .is_retryable()
        );
    }

    #[test]
    fn only_timeouts_have_unknown_outcome() {
        let timeout = DeployError::Timeout {
            message: "no receipt".into(),
            receipt_id: Some("0xabc".into()),
        };
        assert!(timeout.outcome_unknown());
        assert_eq!(timeout.receipt_id(), Some("0xabc"));
        assert!(!DeployError::Transient("refused".into()).outcome_unknown());
    }

    #[test]
    fn network_mismatch_message_names_both_ids() {
        let err = DeployError::NetworkMismatch {
            expected: 1337,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("1337"));
        assert!(msg.contains('5'));
    }
}
