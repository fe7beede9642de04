//! The migration ledger: which steps have been applied to which environment.
//!
//! Every implementation enforces the same invariant on write: the entries
//! for an environment are always exactly `1..=k`. An append whose sequence is
//! not `k + 1` fails with [`LedgerError::SequenceViolation`] and leaves the
//! ledger untouched.
//!
//! Alongside the entries each environment has at most one journal record, a
//! [`PendingDeployment`], describing a deployment that was started but is not
//! yet in the ledger.

pub mod file;
pub mod memory;

pub use file::FileLedger;
pub use memory::MemoryLedger;

use waypoint_common::{LedgerEntry, PendingDeployment};

use crate::errors::LedgerError;

/// Persistent per-environment record of applied steps.
pub trait MigrationLedger: Send + Sync {
    /// All entries for the environment in ascending sequence order.
    fn entries(&self, environment: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Applied sequence numbers in ascending order; empty for a new environment.
    fn list_applied(&self, environment: &str) -> Result<Vec<u64>, LedgerError> {
        Ok(self
            .entries(environment)?
            .into_iter()
            .map(|e| e.sequence)
            .collect())
    }

    /// Atomically append one entry.
    fn record_applied(&self, environment: &str, entry: LedgerEntry) -> Result<(), LedgerError>;

    fn pending(&self, environment: &str) -> Result<Option<PendingDeployment>, LedgerError>;

    fn set_pending(
        &self,
        environment: &str,
        pending: &PendingDeployment,
    ) -> Result<(), LedgerError>;

    fn clear_pending(&self, environment: &str) -> Result<(), LedgerError>;
}

/// Environment names double as file names, so keep them path-safe.
pub fn is_valid_environment_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub(crate) fn check_environment(name: &str) -> Result<(), LedgerError> {
    if is_valid_environment_name(name) {
        Ok(())
    } else {
        Err(LedgerError::InvalidEnvironment(name.to_string()))
    }
}

/// Verify that `entry` may be appended after `existing`.
pub(crate) fn check_next(
    environment: &str,
    existing: &[LedgerEntry],
    entry: &LedgerEntry,
) -> Result<(), LedgerError> {
    let expected = existing.last().map(|e| e.sequence + 1).unwrap_or(1);
    if entry.sequence != expected {
        return Err(LedgerError::SequenceViolation {
            environment: environment.to_string(),
            expected,
            found: entry.sequence,
        });
    }
    Ok(())
}

/// Verify that stored entries form the prefix `1..=k`.
pub(crate) fn check_prefix(environment: &str, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
    for (index, entry) in entries.iter().enumerate() {
        let expected = index as u64 + 1;
        if entry.sequence != expected {
            return Err(LedgerError::SequenceViolation {
                environment: environment.to_string(),
                expected,
                found: entry.sequence,
            });
        }
    }
    Ok(())
}
