use std::path::PathBuf;
use thiserror::Error;

/// Core error type for soldeps operations outside a resolution pass.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Workspace root not found from {start}")]
    WorkspaceNotFound { start: PathBuf },

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Orchestration-level failure of a whole resolution pass.
///
/// Single-import failures never surface here; they are recorded as diagnostics
/// on the pass. This type is `Clone` so one in-flight pass can be awaited by
/// several callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Compilation target not found: {path}")]
    TargetNotFound { path: String },

    #[error("Failed to read compilation target {path}: {message}")]
    TargetUnreadable { path: String, message: String },

    #[error("Resolution index at {path} is corrupt: {message}")]
    IndexCorrupt { path: String, message: String },

    #[error("Resolution of {target} was abandoned after a workspace switch")]
    Abandoned { target: String },

    #[error("Resolver failure: {0}")]
    Internal(String),
}
