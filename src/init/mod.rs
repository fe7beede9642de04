//! Initialization module for waypoint projects.
//!
//! `waypoint init` creates the `.waypoint/` directory structure:
//!
//! ```text
//! .waypoint/
//! ├── waypoint.toml    # Environments, retry and RPC settings
//! ├── steps.json       # Ordered migration steps
//! ├── ledger/          # Per-environment applied-step ledgers and journals
//! ├── locks/           # Per-environment advisory run locks
//! ├── runs/            # Run reports, one directory per environment
//! └── logs/            # Rolling log files
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::step::StepsFile;
use crate::waypoint_config::WaypointToml;

/// The name of the waypoint state directory.
pub const WAYPOINT_DIR: &str = ".waypoint";

/// Result of initializing a waypoint project.
#[derive(Debug)]
pub struct InitResult {
    pub waypoint_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Initialize a waypoint project in the given directory.
///
/// Existing files are never overwritten; running init again only fills in
/// whatever is missing.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let waypoint_dir = project_dir.join(WAYPOINT_DIR);
    let created = !waypoint_dir.exists();

    std::fs::create_dir_all(&waypoint_dir)
        .with_context(|| format!("Failed to create directory: {}", waypoint_dir.display()))?;
    ensure_directory_structure(&waypoint_dir)?;

    Ok(InitResult {
        waypoint_dir,
        created,
    })
}

fn ensure_directory_structure(waypoint_dir: &Path) -> Result<()> {
    for sub in ["ledger", "locks", "runs", "logs"] {
        let path = waypoint_dir.join(sub);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    let config_file = waypoint_dir.join("waypoint.toml");
    if !config_file.exists() {
        WaypointToml::starter().save(&config_file)?;
    }

    let steps_file = waypoint_dir.join("steps.json");
    if !steps_file.exists() {
        StepsFile::starter().save(&steps_file)?;
    }

    Ok(())
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(WAYPOINT_DIR).exists()
}

pub fn get_waypoint_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(WAYPOINT_DIR)
}

/// Check if a steps file exists and contains valid JSON.
pub fn has_steps(project_dir: &Path) -> bool {
    let steps_file = project_dir.join(WAYPOINT_DIR).join("steps.json");
    match std::fs::read_to_string(&steps_file) {
        Ok(content) => serde_json::from_str::<serde_json::Value>(&content).is_ok(),
        Err(_) => false,
    }
}
