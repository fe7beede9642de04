//! Step list definition and JSON loading.
//!
//! The step list lives in `.waypoint/steps.json`:
//!
//! ```json
//! {
//!   "steps": [
//!     { "sequence": 1, "name": "deploy_shop", "artifact_ref": "Shop",
//!       "deploy_args": { "from": 0 } }
//!   ]
//! }
//! ```
//!
//! Loading validates the whole list up front, so a malformed file never
//! reaches the runner.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use waypoint_common::{DeployArgs, Identity, MigrationStep};

/// The full steps.json file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepsFile {
    pub steps: Vec<MigrationStep>,
}

impl StepsFile {
    pub fn new(steps: Vec<MigrationStep>) -> Self {
        Self { steps }
    }

    /// Load and validate steps from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read steps file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid steps file: {}", path.display()))
    }

    /// Parse and validate steps from a JSON string.
    pub fn parse(content: &str) -> Result<Self> {
        let file: StepsFile =
            serde_json::from_str(content).context("Failed to parse steps JSON")?;
        file.validate()?;
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize steps to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write steps file: {}", path.display()))?;

        Ok(())
    }

    /// Check the ordering and naming invariants.
    ///
    /// Sequence numbers must run 1, 2, 3, ... in file order so the ledger for
    /// any environment is always a prefix of this list.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            let expected = index as u64 + 1;
            if step.sequence != expected {
                bail!(
                    "step '{}' has sequence {} but position {} requires {}",
                    step.name,
                    step.sequence,
                    expected,
                    expected
                );
            }
            if step.name.trim().is_empty() {
                bail!("step {} has an empty name", step.sequence);
            }
            if step.artifact_ref.trim().is_empty() {
                bail!("step {} ({}) has an empty artifact_ref", step.sequence, step.name);
            }
            if !names.insert(step.name.as_str()) {
                bail!("duplicate step name '{}'", step.name);
            }
        }
        Ok(())
    }

    pub fn get_step(&self, sequence: u64) -> Option<&MigrationStep> {
        self.steps.iter().find(|s| s.sequence == sequence)
    }

    /// Steps with a sequence number at or after `start`.
    pub fn get_steps_from(&self, start: u64) -> Vec<&MigrationStep> {
        self.steps.iter().filter(|s| s.sequence >= start).collect()
    }

    pub fn last_sequence(&self) -> u64 {
        self.steps.last().map(|s| s.sequence).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step list written by `waypoint init`.
    pub fn starter() -> Self {
        Self::new(vec![MigrationStep::new(1, "deploy_shop", "Shop").with_args(
            DeployArgs {
                from: Some(Identity::Account(0)),
                ..DeployArgs::default()
            },
        )])
    }
}
