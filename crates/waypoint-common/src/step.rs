use serde::{Deserialize, Serialize};

use crate::identity::{HexData, Identity};

/// Per-step deployment arguments.
///
/// Unknown keys are rejected so that a typo in a step file fails when the
/// file is loaded instead of when the step is deployed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployArgs {
    /// Sending identity; falls back to the environment's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Identity>,
    /// Value in wei transferred with the deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u128>,
    /// Gas limit; the node estimates when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    /// Pre-encoded constructor arguments appended to the payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor_data: Option<HexData>,
}

/// One ordered unit of deployment work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationStep {
    /// Position in the step list, starting at 1
    pub sequence: u64,
    /// Human-readable name, unique within the list
    pub name: String,
    /// Identifier handed to the artifact provider
    pub artifact_ref: String,
    #[serde(default)]
    pub deploy_args: DeployArgs,
}

impl MigrationStep {
    pub fn new(sequence: u64, name: &str, artifact_ref: &str) -> Self {
        Self {
            sequence,
            name: name.to_string(),
            artifact_ref: artifact_ref.to_string(),
            deploy_args: DeployArgs::default(),
        }
    }

    pub fn with_args(mut self, deploy_args: DeployArgs) -> Self {
        self.deploy_args = deploy_args;
        self
    }
}
