use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the optional settings file at the workspace root.
pub const SETTINGS_FILE: &str = "soldeps.json";

/// Environment variable overriding the npm registry URL.
pub const REGISTRY_ENV: &str = "SOLDEPS_NPM_REGISTRY";

/// Environment variable overriding the npm CDN base URL.
pub const CDN_ENV: &str = "SOLDEPS_NPM_CDN";

/// Runtime configuration for the soldeps CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory (workspace root).
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// Resolver tuning loaded from `soldeps.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverSettings {
    /// npm registry used for packuments.
    pub registry_url: String,
    /// jsdelivr-style CDN serving `{pkg}@{version}/{path}`.
    pub npm_cdn_url: String,
    /// HTTP gateway for `ipfs://` references.
    pub ipfs_gateway: String,
    /// HTTP gateway for `bzz-raw://` references.
    pub swarm_gateway: String,
    /// Maximum import depth below the compilation target.
    pub max_depth: usize,
    /// Maximum number of files in one source bundle.
    pub max_files: usize,
    /// Share one in-flight pass between concurrent callers for the same target.
    pub share_in_flight: bool,
    /// Register the built-in testing library handlers.
    pub builtin_handlers: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            registry_url: "https://registry.npmjs.org/".to_string(),
            npm_cdn_url: "https://cdn.jsdelivr.net/npm/".to_string(),
            ipfs_gateway: "https://ipfs.io/ipfs/".to_string(),
            swarm_gateway: "https://api.gateway.ethswarm.org/bzz/".to_string(),
            max_depth: 64,
            max_files: 2000,
            share_in_flight: true,
            builtin_handlers: true,
        }
    }
}

impl ResolverSettings {
    /// Load settings for a workspace.
    ///
    /// A missing `soldeps.json` yields defaults. Environment overrides are
    /// applied last.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(workspace_root: &Path) -> Result<Self, Error> {
        let path = workspace_root.join(SETTINGS_FILE);
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
                path: path.clone(),
                source,
            })?
        } else {
            Self::default()
        };

        settings.apply_env();
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(REGISTRY_ENV) {
            if !url.trim().is_empty() {
                self.registry_url = url;
            }
        }
        if let Ok(url) = std::env::var(CDN_ENV) {
            if !url.trim().is_empty() {
                self.npm_cdn_url = url;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_config_builder() {
        let config = Config::new(PathBuf::from("/work"))
            .with_verbosity(2)
            .with_json_logs(true);
        assert_eq!(config.cwd, PathBuf::from("/work"));
        assert_eq!(config.verbosity, 2);
        assert!(config.json_logs);
    }

    #[test]
    #[serial]
    fn test_missing_settings_file_is_default() {
        let dir = tempdir().unwrap();
        let settings = ResolverSettings::load(dir.path()).unwrap();
        assert_eq!(settings, ResolverSettings::default());
    }

    #[test]
    #[serial]
    fn test_partial_settings_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "maxDepth": 8, "shareInFlight": false }"#,
        )
        .unwrap();

        let settings = ResolverSettings::load(dir.path()).unwrap();
        assert_eq!(settings.max_depth, 8);
        assert!(!settings.share_in_flight);
        assert_eq!(settings.max_files, 2000);
    }

    #[test]
    #[serial]
    fn test_malformed_settings_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ nope").unwrap();

        let err = ResolverSettings::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    #[serial]
    fn test_registry_env_override() {
        let dir = tempdir().unwrap();
        std::env::set_var(REGISTRY_ENV, "http://127.0.0.1:9/");
        let settings = ResolverSettings::load(dir.path()).unwrap();
        std::env::remove_var(REGISTRY_ENV);
        assert_eq!(settings.registry_url, "http://127.0.0.1:9/");
    }
}
