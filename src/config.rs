use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::init::WAYPOINT_DIR;
use crate::waypoint_config::WaypointToml;

/// Runtime configuration for waypoint.
///
/// Bridges `waypoint.toml` with the paths the runner and its stores need.
/// Every piece of state lives under `<project>/.waypoint/`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub waypoint_dir: PathBuf,
    pub steps_file: PathBuf,
    pub ledger_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub log_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub verbose: bool,
    pub toml: WaypointToml,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let waypoint_dir = project_dir.join(WAYPOINT_DIR);
        let toml = WaypointToml::load_or_default(&waypoint_dir)?;
        let artifacts_dir = resolve_relative(&project_dir, &toml.project.artifacts_dir);

        Ok(Self {
            steps_file: waypoint_dir.join("steps.json"),
            ledger_dir: waypoint_dir.join("ledger"),
            lock_dir: waypoint_dir.join("locks"),
            runs_dir: waypoint_dir.join("runs"),
            log_dir: waypoint_dir.join("logs"),
            artifacts_dir,
            project_dir,
            waypoint_dir,
            verbose,
            toml,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.ledger_dir).context("Failed to create ledger directory")?;
        std::fs::create_dir_all(&self.lock_dir).context("Failed to create lock directory")?;
        std::fs::create_dir_all(&self.runs_dir).context("Failed to create runs directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }

    /// The environment to use when a command is not given one.
    pub fn default_environment(&self) -> &str {
        &self.toml.project.default_environment
    }

    /// Pick the explicit environment name or fall back to the default.
    pub fn environment_or_default(&self, name: Option<&str>) -> String {
        name.unwrap_or_else(|| self.default_environment()).to_string()
    }
}

fn resolve_relative(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
