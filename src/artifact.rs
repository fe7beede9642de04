//! Loads compiled artifacts from the build output directory.
//!
//! Artifacts are the JSON documents a Solidity build writes per contract,
//! e.g. `build/contracts/Shop.json`. Only `bytecode` and the optional
//! `compiler.version` are read.

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use waypoint_common::{ArtifactError, ArtifactProvider, Payload};

#[derive(Debug, Deserialize)]
struct ArtifactDocument {
    bytecode: String,
    #[serde(default)]
    compiler: Option<CompilerInfo>,
}

#[derive(Debug, Deserialize)]
struct CompilerInfo {
    #[serde(default)]
    version: Option<String>,
}

/// Reads `<dir>/<artifact_ref>.json`.
pub struct FsArtifactProvider {
    dir: PathBuf,
}

impl FsArtifactProvider {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

/// A toolchain version pins the compiler only when it looks like a version
/// number; paths such as `./node_modules/solc` accept any build.
fn pins_version(toolchain_version: &str) -> bool {
    toolchain_version
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit())
}

/// `0.8.19+commit.7dd6d404` and `0.8.19-nightly.2023.1.1` are both `0.8.19`.
fn base_version(version: &str) -> &str {
    let version = version.trim();
    version.split(['+', '-']).next().unwrap_or(version)
}

#[async_trait]
impl ArtifactProvider for FsArtifactProvider {
    async fn compile(
        &self,
        artifact_ref: &str,
        toolchain_version: &str,
    ) -> Result<Payload, ArtifactError> {
        if artifact_ref.contains(['/', '\\']) || artifact_ref.starts_with('.') {
            return Err(ArtifactError::new(artifact_ref, "artifact names may not contain paths"));
        }
        let path = self.dir.join(format!("{}.json", artifact_ref));
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ArtifactError::new(artifact_ref, format!("cannot read {}: {}", path.display(), e))
        })?;
        let document: ArtifactDocument = serde_json::from_str(&content).map_err(|e| {
            ArtifactError::new(artifact_ref, format!("cannot parse {}: {}", path.display(), e))
        })?;

        if pins_version(toolchain_version)
            && let Some(built_with) = document.compiler.and_then(|c| c.version)
            && base_version(&built_with) != base_version(toolchain_version)
        {
            return Err(ArtifactError::new(
                artifact_ref,
                format!(
                    "built with compiler {} but the environment requires {}",
                    built_with, toolchain_version
                ),
            ));
        }

        let digits = document
            .bytecode
            .strip_prefix("0x")
            .unwrap_or(&document.bytecode);
        let bytecode = hex::decode(digits)
            .map_err(|e| ArtifactError::new(artifact_ref, format!("invalid bytecode: {}", e)))?;
        if bytecode.is_empty() {
            return Err(ArtifactError::new(
                artifact_ref,
                "bytecode is empty (abstract contract or interface?)",
            ));
        }

        let digest = hex::encode(Sha256::digest(&bytecode));
        tracing::debug!(artifact = artifact_ref, bytes = bytecode.len(), %digest, "Artifact loaded");
        Ok(Payload {
            artifact_ref: artifact_ref.to_string(),
            bytecode,
            digest,
        })
    }
}
