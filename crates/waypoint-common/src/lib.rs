//! Shared domain types for the waypoint migration runner.
//!
//! This crate holds the values that flow between the runner and its
//! collaborators, plus the two collaborator traits themselves:
//! - [`ArtifactProvider`] turns an artifact reference into a deployable payload
//! - [`DeploymentClient`] submits a payload to a target network
//!
//! Nothing here performs I/O; implementations live in the `waypoint` crate.

pub mod artifact;
pub mod deploy;
pub mod environment;
pub mod identity;
pub mod ledger;
pub mod step;

pub use artifact::{ArtifactError, ArtifactProvider, Payload};
pub use deploy::{DeployError, DeploymentClient, DeploymentReceipt, DeploymentRequest};
pub use environment::EnvironmentProfile;
pub use identity::{Address, HexData, Identity, InvalidHex};
pub use ledger::{LedgerEntry, PendingDeployment};
pub use step::{DeployArgs, MigrationStep};
