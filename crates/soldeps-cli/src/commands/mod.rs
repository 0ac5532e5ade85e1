//! CLI command implementations.

pub mod compile;
pub mod index;
pub mod normalize;
pub mod resolve;
pub mod version;

use miette::{IntoDiagnostic, Result};
use soldeps_core::paths;
use soldeps_core::{Config, DependencyResolver, ResolverSettings};
use std::path::{Path, PathBuf};

/// The workspace a command operates on.
pub struct Workspace {
    pub root: PathBuf,
    pub settings: ResolverSettings,
}

impl Workspace {
    /// Find the workspace around `config.cwd` and load its settings.
    ///
    /// Without a marker file the working directory itself is the root.
    pub fn open(config: &Config) -> Result<Self> {
        let root = paths::workspace_root(&config.cwd).unwrap_or_else(|| config.cwd.clone());
        let settings = ResolverSettings::load(&root).into_diagnostic()?;
        tracing::debug!(root = %root.display(), "Opened workspace");
        Ok(Self { root, settings })
    }

    pub fn resolver(&self) -> Result<DependencyResolver> {
        DependencyResolver::for_workspace(&self.root, self.settings.clone()).into_diagnostic()
    }

    /// Workspace path of a file named relative to `cwd`.
    pub fn path_of(&self, cwd: &Path, file: &str) -> String {
        let host = if Path::new(file).is_absolute() {
            PathBuf::from(file)
        } else {
            cwd.join(file)
        };
        match host.strip_prefix(&self.root) {
            Ok(relative) => paths::normalize(&relative.to_string_lossy().replace('\\', "/")),
            Err(_) => paths::normalize(file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(root: &str) -> Workspace {
        Workspace {
            root: PathBuf::from(root),
            settings: ResolverSettings::default(),
        }
    }

    #[test]
    fn test_path_of_nested_cwd() {
        let ws = workspace("/work");
        assert_eq!(
            ws.path_of(Path::new("/work/contracts"), "token/A.sol"),
            "contracts/token/A.sol"
        );
        assert_eq!(ws.path_of(Path::new("/work"), "./A.sol"), "A.sol");
        assert_eq!(ws.path_of(Path::new("/elsewhere"), "/work/B.sol"), "B.sol");
    }
}
