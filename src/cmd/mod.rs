//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                          |
//! |-----------------|-------------------------------------------|
//! | `run`           | `Run`                                     |
//! | `status`        | `Status`, `List`, `Envs`, `History`       |
//! | `resolve`       | `Resolve`                                 |
//! | `project`       | `Init`                                    |
//! | `config`        | `Config`                                  |

pub mod config;
pub mod project;
pub mod resolve;
pub mod run;
pub mod status;

pub use config::cmd_config;
pub use project::cmd_init;
pub use resolve::cmd_resolve;
pub use run::cmd_run;
pub use status::{cmd_envs, cmd_history, cmd_list, cmd_status};

use anyhow::Result;
use std::path::Path;
use waypoint::config::Config;
use waypoint::errors::RunError;
use waypoint::init::is_initialized;
use waypoint::step::StepsFile;

/// Load project configuration. Anything wrong with it is a configuration
/// error, so the process exits with the configuration code.
pub(crate) fn load_config(project_dir: &Path, verbose: bool) -> Result<Config> {
    if !is_initialized(project_dir) {
        return Err(RunError::Configuration(format!(
            "{} is not a waypoint project; run 'waypoint init' first",
            project_dir.display()
        ))
        .into());
    }
    Config::new(project_dir.to_path_buf(), verbose)
        .map_err(|e| RunError::Configuration(format!("{:#}", e)).into())
}

pub(crate) fn load_steps(config: &Config) -> Result<StepsFile> {
    StepsFile::load(&config.steps_file)
        .map_err(|e| RunError::Configuration(format!("{:#}", e)).into())
}
