//! The migration runner.
//!
//! A run resolves the environment once, checks the ledger against the step
//! list, settles any deployment journaled by an earlier run, and then executes
//! every pending step in ascending sequence order. Each step is compiled,
//! journaled, deployed (with retries), and recorded before the next one
//! starts. The first failure halts the run; nothing is rolled back.

mod reconcile;
pub mod retry;

pub use reconcile::{Resolution, resolve_pending};
pub use retry::RetryPolicy;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use waypoint_common::{
    ArtifactProvider, DeployError, DeploymentClient, DeploymentReceipt, DeploymentRequest,
    EnvironmentProfile, Identity, LedgerEntry, MigrationStep, PendingDeployment,
};

use crate::audit::{ReconciliationOutcome, RunErrorSummary, RunReport, StepOutcome, StepState};
use crate::environment::EnvironmentResolver;
use crate::errors::{LedgerError, RunError};
use crate::ledger::MigrationLedger;
use crate::step::StepsFile;

/// Progress callbacks, e.g. for a terminal progress bar.
pub trait RunObserver: Send + Sync {
    fn run_planned(&self, _environment: &str, _steps: &[&MigrationStep]) {}
    fn step_started(&self, _step: &MigrationStep, _identity: &Identity) {}
    fn step_retrying(
        &self,
        _step: &MigrationStep,
        _attempt: u32,
        _error: &DeployError,
        _delay: Duration,
    ) {
    }
    fn step_finished(&self, _outcome: &StepOutcome) {}
    fn reconciled(&self, _outcome: &ReconciliationOutcome) {}
}

/// A run that halted. The report covers everything that happened up to the
/// failure.
#[derive(Debug)]
pub struct RunFailure {
    /// Sequence and name of the step that failed, when one did
    pub step: Option<(u64, String)>,
    pub error: RunError,
    pub report: RunReport,
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.step {
            Some((sequence, name)) => write!(f, "step {} ({}) failed: {}", sequence, name, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Why a run stopped, before it is folded into a [`RunFailure`].
struct Halt {
    step: Option<(u64, String)>,
    error: RunError,
}

impl Halt {
    fn at(sequence: u64, name: &str, error: RunError) -> Self {
        Self {
            step: Some((sequence, name.to_string())),
            error,
        }
    }
}

impl From<RunError> for Halt {
    fn from(error: RunError) -> Self {
        Self { step: None, error }
    }
}

impl From<LedgerError> for Halt {
    fn from(error: LedgerError) -> Self {
        RunError::from(error).into()
    }
}

enum SubmitFailure {
    /// Out of attempts, or the error is not retryable
    Exhausted { error: DeployError, attempts: u32 },
    /// The submission may have reached the network but left no receipt to
    /// look up, so another attempt could deploy twice
    Unconfirmed { error: DeployError },
    /// Cancelled while waiting to retry after `error`
    Cancelled { error: DeployError },
}

pub struct MigrationRunner<'a> {
    resolver: &'a dyn EnvironmentResolver,
    ledger: &'a dyn MigrationLedger,
    artifacts: &'a dyn ArtifactProvider,
    client: &'a dyn DeploymentClient,
    retry: RetryPolicy,
    cancel: CancellationToken,
    observer: Option<&'a dyn RunObserver>,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(
        resolver: &'a dyn EnvironmentResolver,
        ledger: &'a dyn MigrationLedger,
        artifacts: &'a dyn ArtifactProvider,
        client: &'a dyn DeploymentClient,
    ) -> Self {
        Self {
            resolver,
            ledger,
            artifacts,
            client,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn RunObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Apply every pending step to `environment`.
    pub async fn run(&self, environment: &str, steps: &StepsFile) -> Result<RunReport, RunFailure> {
        self.execute(environment, steps, false).await
    }

    /// Work out which steps a run would execute, without compiling or
    /// deploying anything.
    pub async fn plan(&self, environment: &str, steps: &StepsFile) -> Result<RunReport, RunFailure> {
        self.execute(environment, steps, true).await
    }

    async fn execute(
        &self,
        environment: &str,
        steps: &StepsFile,
        dry_run: bool,
    ) -> Result<RunReport, RunFailure> {
        let mut report = RunReport::new(environment, dry_run);
        tracing::info!(
            environment,
            run_id = %report.run_id,
            dry_run,
            steps = steps.len(),
            "Migration run starting"
        );

        let result = self.drive(environment, steps, dry_run, &mut report).await;
        report.finish();

        match result {
            Ok(()) => {
                tracing::info!(
                    environment,
                    run_id = %report.run_id,
                    applied = report.applied_count(),
                    "Migration run finished"
                );
                Ok(report)
            }
            Err(halt) => {
                tracing::error!(
                    environment,
                    run_id = %report.run_id,
                    kind = halt.error.kind(),
                    sequence = halt.step.as_ref().map(|s| s.0),
                    error = %halt.error,
                    "Migration run halted"
                );
                report.error = Some(RunErrorSummary {
                    kind: halt.error.kind().to_string(),
                    message: halt.error.to_string(),
                    sequence: halt.step.as_ref().map(|s| s.0),
                    step: halt.step.as_ref().map(|s| s.1.clone()),
                });
                Err(RunFailure {
                    step: halt.step,
                    error: halt.error,
                    report,
                })
            }
        }
    }

    async fn drive(
        &self,
        environment: &str,
        steps: &StepsFile,
        dry_run: bool,
        report: &mut RunReport,
    ) -> Result<(), Halt> {
        steps
            .validate()
            .map_err(|e| RunError::Configuration(format!("invalid step list: {:#}", e)))?;

        let profile = self.resolver.resolve(environment)?;
        report.endpoint = Some(profile.endpoint.clone());
        report.network_id = Some(profile.network_id);

        let entries = self.ledger.entries(environment)?;
        let mut applied = verify_ledger(environment, steps, &entries)?;
        report.already_applied = applied;

        if dry_run {
            if let Some(pending) = self.ledger.pending(environment)? {
                tracing::warn!(
                    environment,
                    sequence = pending.sequence,
                    "A deployment journal is pending; a real run settles it first"
                );
            }
            report.planned = steps
                .get_steps_from(applied + 1)
                .iter()
                .map(|s| s.sequence)
                .collect();
            return Ok(());
        }

        if let Some(outcome) = self.reconcile(environment, &profile, steps, applied).await? {
            if matches!(outcome, ReconciliationOutcome::Adopted { .. }) {
                applied += 1;
            }
            if let Some(observer) = self.observer {
                observer.reconciled(&outcome);
            }
            report.reconciliation = Some(outcome);
        }

        let pending = steps.get_steps_from(applied + 1);
        report.planned = pending.iter().map(|s| s.sequence).collect();
        let identities: Vec<Identity> = pending
            .iter()
            .map(|step| {
                step.deploy_args
                    .from
                    .clone()
                    .unwrap_or_else(|| profile.identity.clone())
            })
            .collect();

        tracing::info!(
            environment,
            already_applied = applied,
            pending = pending.len(),
            "Pending steps determined"
        );
        if let Some(observer) = self.observer {
            observer.run_planned(environment, &pending);
        }

        for (step, identity) in pending.into_iter().zip(&identities) {
            if self.cancel.is_cancelled() {
                return Err(Halt::at(
                    step.sequence,
                    &step.name,
                    RunError::Cancelled {
                        sequence: step.sequence,
                    },
                ));
            }

            let mut outcome = StepOutcome::new(step);
            if let Some(observer) = self.observer {
                observer.step_started(step, identity);
            }
            tracing::info!(
                environment,
                sequence = step.sequence,
                name = %step.name,
                artifact = %step.artifact_ref,
                %identity,
                "Executing step"
            );

            let result = self
                .execute_step(environment, &profile, step, identity, &mut outcome)
                .await;

            if let Some(observer) = self.observer {
                observer.step_finished(&outcome);
            }
            report.steps.push(outcome);
            result.map_err(|error| Halt::at(step.sequence, &step.name, error))?;
        }

        Ok(())
    }

    async fn execute_step(
        &self,
        environment: &str,
        profile: &EnvironmentProfile,
        step: &MigrationStep,
        identity: &Identity,
        outcome: &mut StepOutcome,
    ) -> Result<(), RunError> {
        let payload = match self
            .artifacts
            .compile(&step.artifact_ref, &profile.toolchain_version)
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                outcome.fail(&e);
                return Err(e.into());
            }
        };

        if self.cancel.is_cancelled() {
            let error = RunError::Cancelled {
                sequence: step.sequence,
            };
            outcome.fail(&error);
            return Err(error);
        }

        outcome.state = StepState::Deploying;
        let mut journal = PendingDeployment::new(step.sequence, &step.name);
        if let Err(e) = self.ledger.set_pending(environment, &journal) {
            outcome.fail(&e);
            return Err(e.into());
        }

        let request = DeploymentRequest {
            payload: &payload,
            identity,
            args: &step.deploy_args,
            endpoint: &profile.endpoint,
            expected_network_id: profile.network_id,
        };

        let receipt = match self
            .submit(environment, step, request, &mut journal, outcome)
            .await
        {
            Ok(receipt) => receipt,
            Err(failure) => {
                let (last, error) = match failure {
                    SubmitFailure::Exhausted { error, attempts } => {
                        let run_error = RunError::from_deploy(error.clone(), attempts);
                        (error, run_error)
                    }
                    SubmitFailure::Unconfirmed { error } => (
                        error,
                        RunError::ReconciliationRequired {
                            sequence: step.sequence,
                            name: step.name.clone(),
                        },
                    ),
                    SubmitFailure::Cancelled { error } => (
                        error,
                        RunError::Cancelled {
                            sequence: step.sequence,
                        },
                    ),
                };
                if last.outcome_unknown() {
                    tracing::warn!(
                        environment,
                        sequence = step.sequence,
                        receipt_id = journal.receipt_id.as_deref(),
                        "Deployment outcome unknown; journal kept for reconciliation"
                    );
                } else {
                    self.discard_journal(environment);
                }
                outcome.fail(&error);
                return Err(error);
            }
        };

        outcome.state = StepState::Deployed;
        outcome.result_ref = Some(receipt.result_ref.clone());
        outcome.receipt_id = Some(receipt.receipt_id.clone());
        tracing::info!(
            environment,
            sequence = step.sequence,
            result_ref = %receipt.result_ref,
            receipt_id = %receipt.receipt_id,
            attempts = outcome.attempts,
            "Step deployed"
        );

        journal.receipt_id = Some(receipt.receipt_id.clone());
        journal.result_ref = Some(receipt.result_ref.clone());
        let journaled = match self.ledger.set_pending(environment, &journal) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    environment,
                    sequence = step.sequence,
                    receipt_id = %receipt.receipt_id,
                    result_ref = %receipt.result_ref,
                    error = %e,
                    "Failed to journal receipt"
                );
                false
            }
        };

        let entry = LedgerEntry::new(step.sequence, &step.name, &receipt.result_ref)
            .with_receipt(&receipt.receipt_id);
        if let Err(source) = self.ledger.record_applied(environment, entry) {
            tracing::error!(
                environment,
                sequence = step.sequence,
                name = %step.name,
                result_ref = %receipt.result_ref,
                receipt_id = %receipt.receipt_id,
                error = %source,
                "Step deployed but not recorded; the ledger is behind the network"
            );
            outcome.interrupt(&source);
            return Err(RunError::LedgerWrite {
                result_ref: receipt.result_ref,
                receipt_id: receipt.receipt_id,
                journaled,
                source,
            });
        }

        outcome.finish(StepState::Recorded);
        self.discard_journal(environment);
        Ok(())
    }

    /// Submit one deployment, retrying transient failures with backoff.
    ///
    /// Once a submission is known to the network (a timeout carried a
    /// receipt id), later attempts look that submission up instead of
    /// deploying again.
    async fn submit(
        &self,
        environment: &str,
        step: &MigrationStep,
        request: DeploymentRequest<'_>,
        journal: &mut PendingDeployment,
        outcome: &mut StepOutcome,
    ) -> Result<DeploymentReceipt, SubmitFailure> {
        let mut delay = self.retry.initial_delay;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            outcome.attempts = attempts;

            let result = match journal.receipt_id.clone() {
                None => self.client.deploy(request).await,
                Some(receipt_id) => self.confirm(&receipt_id, request.endpoint).await,
            };
            let error = match result {
                Ok(receipt) => return Ok(receipt),
                Err(error) => error,
            };

            if journal.receipt_id.is_none()
                && let Some(receipt_id) = error.receipt_id()
            {
                journal.receipt_id = Some(receipt_id.to_string());
                if let Err(e) = self.ledger.set_pending(environment, journal) {
                    tracing::warn!(environment, sequence = step.sequence, error = %e, "Failed to journal receipt id");
                }
            }

            if error.outcome_unknown() && journal.receipt_id.is_none() {
                tracing::error!(
                    environment,
                    sequence = step.sequence,
                    attempt = attempts,
                    error = %error,
                    "Submission outcome unknown and no receipt to look up; not resubmitting"
                );
                return Err(SubmitFailure::Unconfirmed { error });
            }

            if !error.is_retryable() || !self.retry.allows_another(attempts) {
                return Err(SubmitFailure::Exhausted { error, attempts });
            }

            tracing::warn!(
                environment,
                sequence = step.sequence,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Deployment attempt failed; retrying"
            );
            if let Some(observer) = self.observer {
                observer.step_retrying(step, attempts, &error, delay);
            }

            if !retry::backoff(delay, &self.cancel).await {
                tracing::info!(environment, sequence = step.sequence, "Retry cancelled");
                return Err(SubmitFailure::Cancelled { error });
            }
            delay = self.retry.next_delay(delay);
        }
    }

    /// Check on a submission whose outcome is not yet known.
    async fn confirm(&self, receipt_id: &str, endpoint: &str) -> Result<DeploymentReceipt, DeployError> {
        let unconfirmed = |message: String| DeployError::Timeout {
            message,
            receipt_id: Some(receipt_id.to_string()),
        };
        match self.client.lookup(receipt_id, endpoint).await {
            Ok(Some(result_ref)) => Ok(DeploymentReceipt {
                result_ref,
                receipt_id: receipt_id.to_string(),
            }),
            Ok(None) => Err(unconfirmed(format!(
                "submission {} is still unconfirmed",
                receipt_id
            ))),
            Err(e) => Err(unconfirmed(format!(
                "lookup of submission {} failed: {}",
                receipt_id, e
            ))),
        }
    }

    fn discard_journal(&self, environment: &str) {
        if let Err(e) = self.ledger.clear_pending(environment) {
            tracing::warn!(environment, error = %e, "Failed to clear deployment journal");
        }
    }
}

/// Check recorded entries against the step list and return how many are
/// applied.
fn verify_ledger(
    environment: &str,
    steps: &StepsFile,
    entries: &[LedgerEntry],
) -> Result<u64, RunError> {
    if entries.len() > steps.len() {
        return Err(RunError::SequenceViolation(format!(
            "ledger for '{}' has {} entries but the step list has only {} steps",
            environment,
            entries.len(),
            steps.len()
        )));
    }
    for entry in entries {
        match steps.get_step(entry.sequence) {
            Some(step) if step.name == entry.name => {}
            Some(step) => {
                return Err(RunError::SequenceViolation(format!(
                    "ledger for '{}' records step {} as '{}' but the step list has '{}'",
                    environment, entry.sequence, entry.name, step.name
                )));
            }
            None => {
                return Err(RunError::SequenceViolation(format!(
                    "ledger for '{}' records step {} which is not in the step list",
                    environment, entry.sequence
                )));
            }
        }
    }
    Ok(entries.len() as u64)
}
