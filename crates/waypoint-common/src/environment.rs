use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Fully resolved connection parameters for one named environment.
///
/// A profile is resolved once per run and passed explicitly to every
/// collaborator call, so all steps of a run observe the same values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    pub name: String,
    /// RPC endpoint URL
    pub endpoint: String,
    /// Network the endpoint is expected to report
    pub network_id: u64,
    /// Compiler identifier handed to the artifact provider
    pub toolchain_version: String,
    /// Default sending identity for steps that do not name one
    #[serde(default)]
    pub identity: Identity,
}
