//! Settling deployments that an earlier run started but never recorded.

use waypoint_common::{EnvironmentProfile, LedgerEntry};

use super::{Halt, MigrationRunner};
use crate::audit::ReconciliationOutcome;
use crate::errors::RunError;
use crate::ledger::MigrationLedger;
use crate::step::StepsFile;

/// An operator's decision about a deployment of unknown outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The deployment exists; record it as applied.
    Adopt {
        result_ref: String,
        receipt_id: Option<String>,
    },
    /// The deployment never took effect; the step runs again next time.
    Discard,
}

impl MigrationRunner<'_> {
    /// Settle the journal, if any, before pending steps are computed.
    ///
    /// Only a journal for the next unapplied step is acted on. With a receipt
    /// id the network is asked whether the deployment exists; without one the
    /// run cannot tell and stops for an operator.
    pub(super) async fn reconcile(
        &self,
        environment: &str,
        profile: &EnvironmentProfile,
        steps: &StepsFile,
        applied: u64,
    ) -> Result<Option<ReconciliationOutcome>, Halt> {
        let Some(pending) = self.ledger.pending(environment)? else {
            return Ok(None);
        };

        let next = applied + 1;
        let belongs_to_next = pending.sequence == next
            && steps
                .get_step(next)
                .is_some_and(|step| step.name == pending.name);
        if !belongs_to_next {
            tracing::warn!(
                environment,
                journal_sequence = pending.sequence,
                journal_step = %pending.name,
                next,
                "Clearing stale deployment journal"
            );
            self.ledger.clear_pending(environment)?;
            return Ok(Some(ReconciliationOutcome::Stale {
                sequence: pending.sequence,
                name: pending.name,
            }));
        }

        let Some(receipt_id) = pending.receipt_id.clone() else {
            return Err(Halt::at(
                pending.sequence,
                &pending.name,
                RunError::ReconciliationRequired {
                    sequence: pending.sequence,
                    name: pending.name.clone(),
                },
            ));
        };

        tracing::info!(
            environment,
            sequence = pending.sequence,
            receipt_id = %receipt_id,
            "Looking up deployment left by an earlier run"
        );
        let found = self
            .client
            .lookup(&receipt_id, &profile.endpoint)
            .await
            .map_err(|e| Halt::at(pending.sequence, &pending.name, RunError::from_deploy(e, 1)))?;

        match found {
            Some(found_ref) => {
                let result_ref = pending.result_ref.clone().unwrap_or(found_ref);
                let entry = LedgerEntry::new(pending.sequence, &pending.name, &result_ref)
                    .with_receipt(&receipt_id);
                self.ledger
                    .record_applied(environment, entry)
                    .map_err(|source| {
                        Halt::at(
                            pending.sequence,
                            &pending.name,
                            RunError::LedgerWrite {
                                result_ref: result_ref.clone(),
                                receipt_id: receipt_id.clone(),
                                journaled: true,
                                source,
                            },
                        )
                    })?;
                self.discard_journal(environment);
                tracing::info!(
                    environment,
                    sequence = pending.sequence,
                    result_ref = %result_ref,
                    "Adopted earlier deployment"
                );
                Ok(Some(ReconciliationOutcome::Adopted {
                    sequence: pending.sequence,
                    name: pending.name,
                    result_ref,
                }))
            }
            None => {
                self.ledger.clear_pending(environment)?;
                tracing::info!(
                    environment,
                    sequence = pending.sequence,
                    "Earlier deployment not found; step will run again"
                );
                Ok(Some(ReconciliationOutcome::Discarded {
                    sequence: pending.sequence,
                    name: pending.name,
                }))
            }
        }
    }
}

/// Apply an operator's [`Resolution`] to the environment's journal.
pub fn resolve_pending(
    ledger: &dyn MigrationLedger,
    environment: &str,
    resolution: Resolution,
) -> Result<ReconciliationOutcome, RunError> {
    let pending = ledger.pending(environment)?.ok_or_else(|| {
        RunError::Other(anyhow::anyhow!(
            "environment '{}' has no pending deployment to resolve",
            environment
        ))
    })?;

    match resolution {
        Resolution::Adopt {
            result_ref,
            receipt_id,
        } => {
            let mut entry = LedgerEntry::new(pending.sequence, &pending.name, &result_ref);
            if let Some(receipt_id) = receipt_id.or(pending.receipt_id) {
                entry = entry.with_receipt(&receipt_id);
            }
            ledger.record_applied(environment, entry)?;
            ledger.clear_pending(environment)?;
            tracing::info!(
                environment,
                sequence = pending.sequence,
                result_ref = %result_ref,
                "Operator adopted pending deployment"
            );
            Ok(ReconciliationOutcome::Adopted {
                sequence: pending.sequence,
                name: pending.name,
                result_ref,
            })
        }
        Resolution::Discard => {
            ledger.clear_pending(environment)?;
            tracing::info!(
                environment,
                sequence = pending.sequence,
                "Operator discarded pending deployment"
            );
            Ok(ReconciliationOutcome::Discarded {
                sequence: pending.sequence,
                name: pending.name,
            })
        }
    }
}
