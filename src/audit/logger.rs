use super::RunReport;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Persists run reports under `<runs_dir>/<environment>/`.
pub struct RunRecorder {
    runs_dir: PathBuf,
}

impl RunRecorder {
    pub fn new(runs_dir: &Path) -> Self {
        Self {
            runs_dir: runs_dir.to_path_buf(),
        }
    }

    fn environment_dir(&self, environment: &str) -> PathBuf {
        self.runs_dir.join(environment)
    }

    /// Write a finished report and return its path.
    pub fn save(&self, report: &RunReport) -> Result<PathBuf> {
        let dir = self.environment_dir(&report.environment);
        fs::create_dir_all(&dir).context("Failed to create runs directory")?;

        let filename = format!(
            "{}_{}.json",
            report.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &report.run_id.to_string()[..8]
        );
        let path = dir.join(filename);
        let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
        fs::write(&path, json).context("Failed to write run report")?;
        Ok(path)
    }

    /// Report files for an environment, most recent first.
    pub fn list_runs(&self, environment: &str) -> Result<Vec<PathBuf>> {
        let dir = self.environment_dir(environment);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }

    pub fn load_run(&self, path: &Path) -> Result<RunReport> {
        let content = fs::read_to_string(path).context("Failed to read run report")?;
        serde_json::from_str(&content).context("Failed to parse run report")
    }
}
