use async_trait::async_trait;

/// A compiled artifact ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub artifact_ref: String,
    /// Creation bytecode
    pub bytecode: Vec<u8>,
    /// Hex SHA-256 of `bytecode`
    pub digest: String,
}

/// Compiling or loading an artifact failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("artifact '{artifact_ref}': {message}")]
pub struct ArtifactError {
    pub artifact_ref: String,
    pub message: String,
}

impl ArtifactError {
    pub fn new(artifact_ref: &str, message: impl Into<String>) -> Self {
        Self {
            artifact_ref: artifact_ref.to_string(),
            message: message.into(),
        }
    }
}

/// Produces deployable payloads from artifact references.
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    async fn compile(
        &self,
        artifact_ref: &str,
        toolchain_version: &str,
    ) -> Result<Payload, ArtifactError>;
}
