//! Typed error hierarchy for the waypoint migration runner.
//!
//! Two enums cover the two subsystems:
//! - `LedgerError`: persistence failures and ledger invariant breaches
//! - `RunError`: everything that halts a migration run
//!
//! Each `RunError` kind maps to a distinct process exit code so scripts can
//! tell a misconfigured environment from a half-recorded deployment.

use std::path::PathBuf;
use thiserror::Error;
use waypoint_common::{ArtifactError, DeployError};

/// Process exit codes, one per failure kind.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERIC: i32 = 1;
    pub const CONFIGURATION: i32 = 2;
    pub const ARTIFACT: i32 = 3;
    pub const NETWORK_MISMATCH: i32 = 4;
    pub const LEDGER_WRITE: i32 = 5;
    pub const SEQUENCE_VIOLATION: i32 = 6;
    pub const RECONCILIATION_REQUIRED: i32 = 7;
    pub const ENVIRONMENT_LOCKED: i32 = 8;
    pub const TRANSIENT: i32 = 9;
    pub const REJECTED: i32 = 10;
    pub const CANCELLED: i32 = 130;
}

/// Errors from the migration ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger for '{environment}' expects step {expected} next, got {found}")]
    SequenceViolation {
        environment: String,
        expected: u64,
        found: u64,
    },

    #[error("invalid environment name '{0}': use letters, digits, '-' or '_'")]
    InvalidEnvironment(String),

    #[error("failed to read ledger at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write ledger at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt ledger at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Errors that halt a migration run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("network mismatch: expected network {expected}, endpoint reports {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("deployment timed out after {attempts} attempt(s): {message}")]
    Timeout { attempts: u32, message: String },

    #[error("deployment failed after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    #[error("deployment rejected: {0}")]
    Rejected(String),

    #[error("deployment succeeded ({result_ref}) but recording it failed: {source}")]
    LedgerWrite {
        result_ref: String,
        receipt_id: String,
        /// Whether the pending journal holds the receipt for the next run
        journaled: bool,
        #[source]
        source: LedgerError,
    },

    #[error("sequence violation: {0}")]
    SequenceViolation(String),

    #[error(
        "step {sequence} ({name}) has a deployment of unknown outcome; run 'waypoint resolve' to adopt or discard it"
    )]
    ReconciliationRequired { sequence: u64, name: String },

    #[error("environment '{0}' is locked by another run")]
    EnvironmentLocked(String),

    #[error("run cancelled before step {sequence} was submitted")]
    Cancelled { sequence: u64 },

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<LedgerError> for RunError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::SequenceViolation { .. } => RunError::SequenceViolation(err.to_string()),
            LedgerError::InvalidEnvironment(_) => RunError::Configuration(err.to_string()),
            other => RunError::Ledger(other),
        }
    }
}

impl RunError {
    /// Convert a final deployment failure, after `attempts` tries.
    pub fn from_deploy(err: DeployError, attempts: u32) -> Self {
        match err {
            DeployError::NetworkMismatch { expected, actual } => {
                RunError::NetworkMismatch { expected, actual }
            }
            DeployError::Timeout { message, .. } => RunError::Timeout { attempts, message },
            DeployError::Transient(message) => RunError::Transient { attempts, message },
            DeployError::Rejected(message) => RunError::Rejected(message),
        }
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Configuration(_) => "ConfigurationError",
            RunError::Artifact(_) => "ArtifactError",
            RunError::NetworkMismatch { .. } => "NetworkMismatch",
            RunError::Timeout { .. } => "Timeout",
            RunError::Transient { .. } => "Transient",
            RunError::Rejected(_) => "Rejected",
            RunError::LedgerWrite { .. } => "LedgerWriteError",
            RunError::SequenceViolation(_) => "SequenceViolation",
            RunError::ReconciliationRequired { .. } => "ReconciliationRequired",
            RunError::EnvironmentLocked(_) => "EnvironmentLocked",
            RunError::Cancelled { .. } => "Cancelled",
            RunError::Ledger(_) | RunError::Other(_) => "Failure",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Configuration(_) => exit_code::CONFIGURATION,
            RunError::Artifact(_) => exit_code::ARTIFACT,
            RunError::NetworkMismatch { .. } => exit_code::NETWORK_MISMATCH,
            RunError::Timeout { .. } | RunError::Transient { .. } => exit_code::TRANSIENT,
            RunError::Rejected(_) => exit_code::REJECTED,
            RunError::LedgerWrite { .. } => exit_code::LEDGER_WRITE,
            RunError::SequenceViolation(_) => exit_code::SEQUENCE_VIOLATION,
            RunError::ReconciliationRequired { .. } => exit_code::RECONCILIATION_REQUIRED,
            RunError::EnvironmentLocked(_) => exit_code::ENVIRONMENT_LOCKED,
            RunError::Cancelled { .. } => exit_code::CANCELLED,
            RunError::Ledger(_) | RunError::Other(_) => exit_code::GENERIC,
        }
    }

    /// Whether the error needs an operator to look at the target network.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            RunError::LedgerWrite { .. } | RunError::ReconciliationRequired { .. }
        )
    }
}

/// Exit code for an error that reached `main`.
///
/// Context layers added with `anyhow` are looked through, so a wrapped
/// [`RunError`] keeps its code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(failure) = err.downcast_ref::<crate::runner::RunFailure>() {
        return failure.error.exit_code();
    }
    if let Some(run_error) = err.downcast_ref::<RunError>() {
        return run_error.exit_code();
    }
    if let Some(ledger_error) = err.downcast_ref::<LedgerError>() {
        return match ledger_error {
            LedgerError::SequenceViolation { .. } => exit_code::SEQUENCE_VIOLATION,
            LedgerError::InvalidEnvironment(_) => exit_code::CONFIGURATION,
            _ => exit_code::GENERIC,
        };
    }
    exit_code::GENERIC
}
