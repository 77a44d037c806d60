use thiserror::Error;

/// Failures that callers are expected to tell apart.
///
/// Everything else travels as a plain `anyhow::Error` with context attached.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ArchitectError {
    #[error("malformed version '{0}'")]
    MalformedVersion(String),
    #[error("malformed dependency '{0}'")]
    MalformedDependency(String),
    #[error("unknown repository '{0}'")]
    UnknownRepository(String),
    #[error("unknown package '{0}'")]
    UnknownPackage(String),
    #[error("not found")]
    NotFound,
    #[error("artifact {0} already exists in the destination repository")]
    ArtifactExists(String),
}
