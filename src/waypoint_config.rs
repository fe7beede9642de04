//! Project configuration read from `.waypoint/waypoint.toml`.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "shop"
//! artifacts_dir = "build/contracts"
//! default_environment = "development"
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 500
//! max_delay_ms = 10000
//! multiplier = 2.0
//!
//! [rpc]
//! request_timeout_secs = 30
//! receipt_poll_interval_ms = 500
//! receipt_timeout_secs = 120
//!
//! [environments.development]
//! host = "127.0.0.1"
//! port = 8545
//! network_id = 1337
//! toolchain_version = "./node_modules/solc"
//!
//! [environments.staging]
//! url = "https://rpc.staging.example:8545"
//! network_id = 5
//! toolchain_version = "0.8.19"
//! from = "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1"
//! ```
//!
//! A `development` environment is always available, even when the file does
//! not define one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use waypoint_common::Identity;

use crate::runner::RetryPolicy;

/// Name of the environment used when none is given.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name (optional, defaults to directory name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Directory holding compiled artifact JSON, relative to the project
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,
    /// Environment used by commands that are not given one
    #[serde(default = "default_environment")]
    pub default_environment: String,
}

fn default_artifacts_dir() -> String {
    "build/contracts".to_string()
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            artifacts_dir: default_artifacts_dir(),
            default_environment: default_environment(),
        }
    }
}

/// Backoff settings for transient deployment failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    /// Total attempts per step, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetrySection {
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

/// Timeouts for the JSON-RPC deployment client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSection {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_receipt_poll_interval_ms() -> u64 {
    500
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
        }
    }
}

/// One `[environments.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSection {
    /// Full endpoint URL; takes precedence over `host`/`port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub network_id: u64,
    #[serde(default = "default_toolchain_version")]
    pub toolchain_version: String,
    /// Default sending identity for this environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Identity>,
}

fn default_toolchain_version() -> String {
    "./node_modules/solc".to_string()
}

impl EnvironmentSection {
    /// The built-in local development network.
    pub fn development() -> Self {
        Self {
            url: None,
            host: Some("127.0.0.1".to_string()),
            port: Some(8545),
            network_id: 1337,
            toolchain_version: default_toolchain_version(),
            from: None,
        }
    }

    /// Build the endpoint URL, or explain why it cannot be built.
    pub fn endpoint(&self) -> std::result::Result<String, String> {
        if let Some(url) = &self.url {
            return check_endpoint_url(url).map(|_| url.trim_end_matches('/').to_string());
        }
        match (&self.host, self.port) {
            (Some(host), Some(port)) if !host.is_empty() && port != 0 => {
                Ok(format!("http://{}:{}", host, port))
            }
            (Some(_), Some(0)) => Err("port must be non-zero".to_string()),
            (Some(_), None) | (None, Some(_)) => {
                Err("both host and port are required when url is not set".to_string())
            }
            _ => Err("either url or host and port must be set".to_string()),
        }
    }
}

/// Check that an endpoint URL has an http(s) scheme and a host.
pub fn check_endpoint_url(url: &str) -> std::result::Result<(), String> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| format!("endpoint '{}' must start with http:// or https://", url))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(format!("endpoint '{}' has no host", url));
    }
    Ok(())
}

/// Root of `waypoint.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaypointToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub rpc: RpcSection,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentSection>,
}

impl WaypointToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse waypoint.toml")
    }

    /// Load `waypoint.toml` from the given directory, or defaults when absent.
    pub fn load_or_default(waypoint_dir: &Path) -> Result<Self> {
        let config_path = waypoint_dir.join("waypoint.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// The configuration written by `waypoint init`.
    pub fn starter() -> Self {
        let mut environments = BTreeMap::new();
        environments.insert(
            DEFAULT_ENVIRONMENT.to_string(),
            EnvironmentSection::development(),
        );
        Self {
            environments,
            ..Self::default()
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize waypoint.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Look up an environment table, falling back to the built-in
    /// `development` network.
    pub fn environment(&self, name: &str) -> Option<EnvironmentSection> {
        match self.environments.get(name) {
            Some(section) => Some(section.clone()),
            None if name == DEFAULT_ENVIRONMENT => Some(EnvironmentSection::development()),
            None => None,
        }
    }

    /// Names of every resolvable environment, sorted.
    pub fn environment_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.environments.keys().cloned().collect();
        if !self.environments.contains_key(DEFAULT_ENVIRONMENT) {
            names.push(DEFAULT_ENVIRONMENT.to_string());
            names.sort();
        }
        names
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts is 0; one attempt will be made".to_string());
        }
        if self.retry.multiplier < 1.0 {
            warnings.push(format!(
                "retry.multiplier {} is below 1.0; delays will shrink",
                self.retry.multiplier
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            warnings.push("retry.initial_delay_ms exceeds retry.max_delay_ms".to_string());
        }
        if self.environment(&self.project.default_environment).is_none() {
            warnings.push(format!(
                "default_environment '{}' is not defined",
                self.project.default_environment
            ));
        }

        for (name, env) in &self.environments {
            if let Err(reason) = env.endpoint() {
                warnings.push(format!("environment '{}': {}", name, reason));
            }
            if env.toolchain_version.trim().is_empty() {
                warnings.push(format!("environment '{}': toolchain_version is empty", name));
            }
            if !crate::ledger::is_valid_environment_name(name) {
                warnings.push(format!(
                    "environment '{}': names may only use letters, digits, '-' or '_'",
                    name
                ));
            }
        }

        warnings
    }
}
