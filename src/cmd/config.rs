//! Configuration view and validation commands: `waypoint config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use waypoint::environment::EnvOverrides;
    use waypoint::errors::RunError;
    use waypoint::init::get_waypoint_dir;
    use waypoint::waypoint_config::WaypointToml;

    let waypoint_dir = get_waypoint_dir(project_dir);
    let config_path = waypoint_dir.join("waypoint.toml");
    let load = || {
        WaypointToml::load(&config_path).map_err(|e| RunError::Configuration(format!("{:#}", e)))
    };

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Waypoint Configuration");
            println!("======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                load()?
            } else {
                println!("No waypoint.toml found at {}", config_path.display());
                println!("Using default configuration.");
                WaypointToml::default()
            };
            println!();

            println!("[project]");
            if let Some(name) = &toml.project.name {
                println!("  name = \"{}\"", name);
            }
            println!("  artifacts_dir = \"{}\"", toml.project.artifacts_dir);
            println!(
                "  default_environment = \"{}\"",
                toml.project.default_environment
            );
            println!();

            println!("[retry]");
            println!("  max_attempts = {}", toml.retry.max_attempts);
            println!("  initial_delay_ms = {}", toml.retry.initial_delay_ms);
            println!("  max_delay_ms = {}", toml.retry.max_delay_ms);
            println!("  multiplier = {}", toml.retry.multiplier);
            println!();

            println!("[rpc]");
            println!("  request_timeout_secs = {}", toml.rpc.request_timeout_secs);
            println!(
                "  receipt_poll_interval_ms = {}",
                toml.rpc.receipt_poll_interval_ms
            );
            println!("  receipt_timeout_secs = {}", toml.rpc.receipt_timeout_secs);
            println!();

            for name in toml.environment_names() {
                let Some(env) = toml.environment(&name) else {
                    continue;
                };
                println!("[environments.{}]", name);
                match env.endpoint() {
                    Ok(endpoint) => println!("  endpoint = \"{}\"", endpoint),
                    Err(reason) => println!("  endpoint = <invalid: {}>", reason),
                }
                println!("  network_id = {}", env.network_id);
                println!("  toolchain_version = \"{}\"", env.toolchain_version);
                if let Some(from) = &env.from {
                    println!("  from = {}", from);
                }
                println!();
            }

            let overrides = EnvOverrides::from_env();
            if !overrides.is_empty() {
                println!("Environment variable overrides:");
                if let Some(endpoint) = &overrides.endpoint {
                    println!("  WAYPOINT_ENDPOINT = \"{}\"", endpoint);
                }
                if let Some(network_id) = &overrides.network_id {
                    println!("  WAYPOINT_NETWORK_ID = \"{}\"", network_id);
                }
                if let Some(toolchain) = &overrides.toolchain_version {
                    println!("  WAYPOINT_TOOLCHAIN = \"{}\"", toolchain);
                }
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No waypoint.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = load()?.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("waypoint.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !waypoint_dir.exists() {
                std::fs::create_dir_all(&waypoint_dir)?;
            }

            WaypointToml::starter().save(&config_path)?;

            println!("Created waypoint.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] artifacts_dir, default_environment");
            println!("  - [retry] and [rpc] timing");
            println!("  - [environments.<name>] url or host/port, network_id, toolchain_version");
            println!();
        }
    }

    Ok(())
}
