//! Content fetching.
//!
//! Combines the workspace file system with remote fetch, and persists remote
//! content under the canonical `.deps/` layout.

pub mod fs;
pub mod http;
pub mod terminal;

pub use fs::{FileSystem, LocalFs, MemoryFs};
pub use http::{HttpFetcher, RemoteFetch};
pub use terminal::{RecordingTerminal, Severity, Terminal, TracingTerminal};

use crate::normalize::{classify, RefKind};
use crate::paths;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure to obtain content for one reference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{target} not found")]
    NotFound { target: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request for {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{path}: {message}")]
    Io { path: String, message: String },

    #[error("cannot fetch {reference}: not a remote reference")]
    Unsupported { reference: String },
}

impl FetchError {
    /// Short machine-readable code for diagnostics.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "FILE_NOT_FOUND",
            Self::Status { .. } => "FETCH_STATUS",
            Self::Transport { .. } => "FETCH_TRANSPORT",
            Self::Io { .. } => "FS_IO",
            Self::Unsupported { .. } => "FETCH_UNSUPPORTED",
        }
    }
}

/// File system plus remote fetch.
#[derive(Clone)]
pub struct ContentFetcher {
    fs: Arc<dyn FileSystem>,
    remote: Arc<dyn RemoteFetch>,
}

impl ContentFetcher {
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, remote: Arc<dyn RemoteFetch>) -> Self {
        Self { fs, remote }
    }

    #[must_use]
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub async fn read_local(&self, path: &str) -> Result<String, FetchError> {
        self.fs.read_file(path).await
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.fs.exists(path).await
    }

    /// Write `content`, creating the parent directory first.
    pub async fn write_local(&self, path: &str, content: &str) -> Result<(), FetchError> {
        let parent = paths::dirname(path);
        if !parent.is_empty() {
            self.fs.mkdir(parent).await?;
        }
        self.fs.write_file(path, content).await
    }

    pub async fn fetch_remote(&self, url: &str) -> Result<String, FetchError> {
        self.remote.fetch(url).await
    }

    /// Fetch `url` and persist it, returning the workspace path written.
    ///
    /// Without `target_path` the destination follows the canonical `.deps/`
    /// layout; with `use_original` an HTTP(S) URL keeps its own host and path.
    /// Content already on disk at the destination is not fetched again.
    pub async fn resolve_and_save(
        &self,
        url: &str,
        target_path: Option<&str>,
        use_original: bool,
    ) -> Result<String, FetchError> {
        let reference = classify(url);
        if !reference.kind.is_remote() {
            return Err(FetchError::Unsupported {
                reference: url.to_string(),
            });
        }

        let destination = match target_path {
            Some(path) => paths::normalize(path),
            None => save_path(url, &reference.kind, &reference.canonical_path, use_original),
        };

        if self.fs.exists(&destination).await {
            debug!(url, path = %destination, "Already persisted");
            return Ok(destination);
        }

        let fetch_url = reference.fetch_url.as_deref().unwrap_or(url);
        let content = self.remote.fetch(fetch_url).await?;
        self.write_local(&destination, &content).await?;
        Ok(destination)
    }
}

/// On-disk location for a remote reference.
fn save_path(url: &str, kind: &RefKind, canonical: &str, use_original: bool) -> String {
    if use_original {
        if let Some(original) = original_layout(url) {
            return paths::deps_file_path(&original);
        }
    }
    match kind {
        RefKind::Npm => paths::npm_file_path(canonical),
        _ => paths::deps_file_path(canonical),
    }
}

/// `https://host/a/b.sol` to `host/a/b.sol`.
fn original_layout(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    Some(format!("{}{}", parsed.host_str()?, parsed.path()))
}
