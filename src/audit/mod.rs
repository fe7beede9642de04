//! Run reports: what a migration run did, step by step.
//!
//! The runner builds a [`RunReport`] as it goes; the CLI persists it with
//! [`RunRecorder`] so `waypoint history` can show past runs.

mod logger;

pub use logger::RunRecorder;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use waypoint_common::MigrationStep;

/// Lifecycle of one step within a run.
///
/// `Pending → Deploying → Deployed → Recorded` on success,
/// `Pending → Deploying → Failed` otherwise. `Deployed` without `Recorded`
/// means the deployment happened but the ledger does not know about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Deploying,
    Deployed,
    Recorded,
    Failed,
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepState::Pending => "pending",
            StepState::Deploying => "deploying",
            StepState::Deployed => "deployed",
            StepState::Recorded => "recorded",
            StepState::Failed => "failed",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub sequence: u64,
    pub name: String,
    pub artifact_ref: String,
    pub state: StepState,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn new(step: &MigrationStep) -> Self {
        Self {
            sequence: step.sequence,
            name: step.name.clone(),
            artifact_ref: step.artifact_ref.clone(),
            state: StepState::Pending,
            attempts: 0,
            started_at: Utc::now(),
            ended_at: None,
            result_ref: None,
            receipt_id: None,
            error: None,
        }
    }

    pub fn fail(&mut self, error: &impl std::fmt::Display) {
        self.state = StepState::Failed;
        self.error = Some(error.to_string());
        self.ended_at = Some(Utc::now());
    }

    pub fn finish(&mut self, state: StepState) {
        self.state = state;
        self.ended_at = Some(Utc::now());
    }

    /// Stop in the current state, e.g. `Deployed` when recording failed.
    pub fn interrupt(&mut self, error: &impl std::fmt::Display) {
        self.error = Some(error.to_string());
        self.ended_at = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// What reconciliation did with a journal left by an earlier run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// The deployment exists on the network and is now in the ledger.
    Adopted {
        sequence: u64,
        name: String,
        result_ref: String,
    },
    /// The network has no record of the deployment; the step runs again.
    Discarded { sequence: u64, name: String },
    /// The journal did not belong to the next unapplied step.
    Stale { sequence: u64, name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunErrorSummary {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub environment: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<u64>,
    /// Steps already in the ledger when the run started
    pub already_applied: u64,
    /// Steps the run set out to execute
    pub planned: Vec<u64>,
    pub steps: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunErrorSummary>,
}

impl RunReport {
    pub fn new(environment: &str, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            environment: environment.to_string(),
            dry_run,
            started_at: Utc::now(),
            ended_at: None,
            endpoint: None,
            network_id: None,
            already_applied: 0,
            planned: Vec::new(),
            steps: Vec::new(),
            reconciliation: None,
            error: None,
        }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Number of steps recorded by this run, including an adopted deployment.
    pub fn applied_count(&self) -> usize {
        let executed = self
            .steps
            .iter()
            .filter(|s| s.state == StepState::Recorded)
            .count();
        let adopted = matches!(
            self.reconciliation,
            Some(ReconciliationOutcome::Adopted { .. })
        );
        executed + usize::from(adopted)
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
