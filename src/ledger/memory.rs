use std::collections::HashMap;
use std::sync::Mutex;
use waypoint_common::{LedgerEntry, PendingDeployment};

use super::{MigrationLedger, check_environment, check_next};
use crate::errors::LedgerError;

#[derive(Debug, Default)]
struct EnvironmentState {
    entries: Vec<LedgerEntry>,
    pending: Option<PendingDeployment>,
}

/// Ledger kept in process memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    environments: Mutex<HashMap<String, EnvironmentState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(
        &self,
        environment: &str,
        f: impl FnOnce(&mut EnvironmentState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        check_environment(environment)?;
        let mut guard = self
            .environments
            .lock()
            .map_err(|_| LedgerError::Unavailable("memory ledger lock poisoned".to_string()))?;
        f(guard.entry(environment.to_string()).or_default())
    }

    /// Whether the ledger has ever been touched for `environment`.
    pub fn knows(&self, environment: &str) -> bool {
        self.environments
            .lock()
            .map(|g| g.contains_key(environment))
            .unwrap_or(false)
    }
}

impl MigrationLedger for MemoryLedger {
    fn entries(&self, environment: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.with_state(environment, |state| Ok(state.entries.clone()))
    }

    fn record_applied(&self, environment: &str, entry: LedgerEntry) -> Result<(), LedgerError> {
        self.with_state(environment, |state| {
            check_next(environment, &state.entries, &entry)?;
            state.entries.push(entry);
            Ok(())
        })
    }

    fn pending(&self, environment: &str) -> Result<Option<PendingDeployment>, LedgerError> {
        self.with_state(environment, |state| Ok(state.pending.clone()))
    }

    fn set_pending(
        &self,
        environment: &str,
        pending: &PendingDeployment,
    ) -> Result<(), LedgerError> {
        self.with_state(environment, |state| {
            state.pending = Some(pending.clone());
            Ok(())
        })
    }

    fn clear_pending(&self, environment: &str) -> Result<(), LedgerError> {
        self.with_state(environment, |state| {
            state.pending = None;
            Ok(())
        })
    }
}
