//! Virtual file system port.
//!
//! Paths are workspace-relative strings with `/` separators.

use super::FetchError;
use crate::paths;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Workspace file access used by the resolver.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<String, FetchError>;

    /// Write `content`, creating missing parent directories.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FetchError>;

    async fn exists(&self, path: &str) -> bool;

    async fn mkdir(&self, path: &str) -> Result<(), FetchError>;

    async fn remove_file(&self, path: &str) -> Result<(), FetchError>;
}

/// File system rooted at a workspace directory on disk.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> PathBuf {
        paths::to_host_path(&self.root, path)
    }
}

fn io_error(path: &str, e: &io::Error) -> FetchError {
    if e.kind() == io::ErrorKind::NotFound {
        FetchError::NotFound {
            target: path.to_string(),
        }
    } else {
        FetchError::Io {
            path: path.to_string(),
            message: e.to_string(),
        }
    }
}

fn join_error(path: &str, e: &tokio::task::JoinError) -> FetchError {
    FetchError::Io {
        path: path.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl FileSystem for LocalFs {
    async fn read_file(&self, path: &str) -> Result<String, FetchError> {
        let host = self.host_path(path);
        tokio::task::spawn_blocking(move || soldeps_util::fs::read_to_string_lossy(&host))
            .await
            .map_err(|e| join_error(path, &e))?
            .map_err(|e| io_error(path, &e))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FetchError> {
        let host = self.host_path(path);
        let bytes = content.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || soldeps_util::fs::atomic_write(&host, &bytes))
            .await
            .map_err(|e| join_error(path, &e))?
            .map_err(|e| io_error(path, &e))
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.host_path(path))
            .await
            .unwrap_or(false)
    }

    async fn mkdir(&self, path: &str) -> Result<(), FetchError> {
        tokio::fs::create_dir_all(self.host_path(path))
            .await
            .map_err(|e| io_error(path, &e))
    }

    async fn remove_file(&self, path: &str) -> Result<(), FetchError> {
        tokio::fs::remove_file(self.host_path(path))
            .await
            .map_err(|e| io_error(path, &e))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
}

/// In-memory file system, for editor buffers and tests.
#[derive(Debug, Default)]
pub struct MemoryFs {
    state: RwLock<MemoryState>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a file system pre-populated with `files`.
    #[must_use]
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let files = files
            .into_iter()
            .map(|(path, content)| (paths::normalize(path.as_ref()), content.into()))
            .collect();
        Self {
            state: RwLock::new(MemoryState {
                files,
                dirs: BTreeSet::new(),
            }),
        }
    }

    /// Copy of every file currently stored.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.state.read().await.files.clone()
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn read_file(&self, path: &str) -> Result<String, FetchError> {
        self.state
            .read()
            .await
            .files
            .get(&paths::normalize(path))
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                target: path.to_string(),
            })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FetchError> {
        let path = paths::normalize(path);
        let mut state = self.state.write().await;
        let mut dir = paths::dirname(&path);
        while !dir.is_empty() {
            state.dirs.insert(dir.to_string());
            dir = paths::dirname(dir);
        }
        state.files.insert(path, content.to_string());
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        let path = paths::normalize(path);
        let state = self.state.read().await;
        if state.files.contains_key(&path) || state.dirs.contains(&path) {
            return true;
        }
        let prefix = format!("{path}/");
        state
            .files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    async fn mkdir(&self, path: &str) -> Result<(), FetchError> {
        let path = paths::normalize(path);
        let mut state = self.state.write().await;
        let mut dir = path.as_str();
        while !dir.is_empty() {
            state.dirs.insert(dir.to_string());
            dir = paths::dirname(dir);
        }
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), FetchError> {
        self.state
            .write()
            .await
            .files
            .remove(&paths::normalize(path))
            .map(|_| ())
            .ok_or_else(|| FetchError::NotFound {
                target: path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_fs_round_trip() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path());

        fs.write_file(".deps/npm/solmate@6.2.0/src/auth/Owned.sol", "contract Owned {}")
            .await
            .unwrap();

        assert!(fs.exists(".deps/npm/solmate@6.2.0").await);
        assert_eq!(
            fs.read_file(".deps/npm/solmate@6.2.0/src/auth/Owned.sol").await.unwrap(),
            "contract Owned {}"
        );
        assert!(dir.path().join(".deps/npm/solmate@6.2.0/src/auth/Owned.sol").exists());

        fs.remove_file(".deps/npm/solmate@6.2.0/src/auth/Owned.sol").await.unwrap();
        assert!(!fs.exists(".deps/npm/solmate@6.2.0/src/auth/Owned.sol").await);
    }

    #[tokio::test]
    async fn test_local_fs_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let err = fs.read_file("contracts/Missing.sol").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_local_fs_lossy_read() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("A.sol"), b"// caf\xe9\ncontract A {}").unwrap();
        let content = LocalFs::new(dir.path()).read_file("A.sol").await.unwrap();
        assert!(content.contains("contract A {}"));
    }

    #[tokio::test]
    async fn test_memory_fs_dirs_and_prefix_exists() {
        let fs = MemoryFs::with_files([("contracts/token/Token.sol", "contract Token {}")]);
        assert!(fs.exists("contracts").await);
        assert!(fs.exists("./contracts/token/Token.sol").await);
        assert!(!fs.exists("contracts/tok").await);

        fs.mkdir(".deps/npm").await.unwrap();
        assert!(fs.exists(".deps").await);

        fs.write_file("lib/A.sol", "a").await.unwrap();
        assert!(fs.exists("lib").await);
        assert_eq!(fs.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_fs_remove() {
        let fs = MemoryFs::with_files([("A.sol", "a")]);
        fs.remove_file("A.sol").await.unwrap();
        assert!(fs.remove_file("A.sol").await.is_err());
    }
}
