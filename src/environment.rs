//! Environment resolution.
//!
//! Values are layered file → environment variables: a profile is built from
//! the `[environments.<name>]` table in `waypoint.toml`, then
//! `WAYPOINT_ENDPOINT`, `WAYPOINT_NETWORK_ID` and `WAYPOINT_TOOLCHAIN` may
//! replace individual fields.

use waypoint_common::EnvironmentProfile;

use crate::errors::RunError;
use crate::waypoint_config::{WaypointToml, check_endpoint_url};

/// Turns an environment name into a fully resolved profile.
pub trait EnvironmentResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<EnvironmentProfile, RunError>;
}

/// Process-level overrides applied on top of the file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub endpoint: Option<String>,
    pub network_id: Option<String>,
    pub toolchain_version: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            endpoint: read("WAYPOINT_ENDPOINT"),
            network_id: read("WAYPOINT_NETWORK_ID"),
            toolchain_version: read("WAYPOINT_TOOLCHAIN"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoint.is_none() && self.network_id.is_none() && self.toolchain_version.is_none()
    }
}

/// Resolves environments from `waypoint.toml`.
pub struct ConfigResolver {
    toml: WaypointToml,
    overrides: EnvOverrides,
}

impl ConfigResolver {
    pub fn new(toml: WaypointToml, overrides: EnvOverrides) -> Self {
        Self { toml, overrides }
    }
}

impl EnvironmentResolver for ConfigResolver {
    fn resolve(&self, name: &str) -> Result<EnvironmentProfile, RunError> {
        let section = self.toml.environment(name).ok_or_else(|| {
            RunError::Configuration(format!(
                "unknown environment '{}' (configured: {})",
                name,
                self.toml.environment_names().join(", ")
            ))
        })?;

        let endpoint = match &self.overrides.endpoint {
            Some(url) => {
                check_endpoint_url(url).map_err(|reason| {
                    RunError::Configuration(format!("WAYPOINT_ENDPOINT: {}", reason))
                })?;
                url.trim_end_matches('/').to_string()
            }
            None => section.endpoint().map_err(|reason| {
                RunError::Configuration(format!("environment '{}': {}", name, reason))
            })?,
        };

        let network_id = match &self.overrides.network_id {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                RunError::Configuration(format!(
                    "WAYPOINT_NETWORK_ID '{}' is not a valid network id",
                    raw
                ))
            })?,
            None => section.network_id,
        };

        let toolchain_version = self
            .overrides
            .toolchain_version
            .clone()
            .unwrap_or(section.toolchain_version);
        if toolchain_version.trim().is_empty() {
            return Err(RunError::Configuration(format!(
                "environment '{}' has an empty toolchain_version",
                name
            )));
        }

        let profile = EnvironmentProfile {
            name: name.to_string(),
            endpoint,
            network_id,
            toolchain_version,
            identity: section.from.unwrap_or_default(),
        };
        tracing::debug!(
            environment = %profile.name,
            endpoint = %profile.endpoint,
            network_id = profile.network_id,
            toolchain = %profile.toolchain_version,
            overridden = !self.overrides.is_empty(),
            "Resolved environment"
        );
        Ok(profile)
    }
}
