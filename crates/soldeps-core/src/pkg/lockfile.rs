//! Lock file readers.
//!
//! Only pinned versions are extracted: the resolver needs `name -> version`,
//! not integrity hashes or the install tree.
//!
//! ## Supported formats
//!
//! - `package-lock.json` v1 (`dependencies` tree)
//! - `package-lock.json` v2/v3 (`packages["node_modules/<name>"]`)
//! - `yarn.lock` v1 (text format)

use super::error::PkgError;
use serde_json::Value;
use std::collections::BTreeMap;

/// npm lock file name.
pub const NPM_LOCKFILE: &str = "package-lock.json";

/// Yarn lock file name.
pub const YARN_LOCKFILE: &str = "yarn.lock";

/// Pinned versions read from a lock file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedVersions {
    versions: BTreeMap<String, String>,
}

impl LockedVersions {
    /// Parse a `package-lock.json`.
    ///
    /// Top-level installs win over nested ones: for v2/v3 only
    /// `node_modules/<name>` entries directly below the root are read, for v1
    /// only the first level of the `dependencies` tree.
    ///
    /// # Errors
    /// Returns an error if the text is not a JSON object.
    pub fn from_package_lock(content: &str) -> Result<Self, PkgError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| PkgError::lockfile_invalid(format!("{NPM_LOCKFILE}: {e}")))?;
        let Some(root) = value.as_object() else {
            return Err(PkgError::lockfile_invalid(format!(
                "{NPM_LOCKFILE} must be a JSON object"
            )));
        };

        let mut versions = BTreeMap::new();

        if let Some(packages) = root.get("packages").and_then(Value::as_object) {
            for (key, entry) in packages {
                let Some(name) = key.strip_prefix("node_modules/") else {
                    continue;
                };
                if name.contains("/node_modules/") {
                    continue;
                }
                if let Some(version) = entry.get("version").and_then(Value::as_str) {
                    versions.insert(name.to_string(), version.to_string());
                }
            }
        }

        if let Some(deps) = root.get("dependencies").and_then(Value::as_object) {
            for (name, entry) in deps {
                if let Some(version) = entry.get("version").and_then(Value::as_str) {
                    versions
                        .entry(name.clone())
                        .or_insert_with(|| version.to_string());
                }
            }
        }

        Ok(Self { versions })
    }

    /// Parse a v1 `yarn.lock`.
    ///
    /// Each block starts with an unindented, comma-separated list of
    /// `name@range` selectors and carries an indented `version "x.y.z"` line.
    /// The first block for a name wins.
    #[must_use]
    pub fn from_yarn_lock(content: &str) -> Self {
        let mut versions = BTreeMap::new();
        let mut current: Vec<String> = Vec::new();

        for line in content.lines() {
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }

            if !line.starts_with(' ') && !line.starts_with('\t') {
                current = line
                    .trim_end_matches(':')
                    .split(',')
                    .filter_map(|selector| yarn_selector_name(selector.trim()))
                    .collect();
                continue;
            }

            let trimmed = line.trim();
            let Some(rest) = trimmed.strip_prefix("version") else {
                continue;
            };
            let version = rest.trim().trim_matches('"');
            if version.is_empty() {
                continue;
            }
            for name in current.drain(..) {
                versions.entry(name).or_insert_with(|| version.to_string());
            }
        }

        Self { versions }
    }

    /// Pinned version of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.versions.get(name).map(String::as_str)
    }

    /// Number of pinned packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether nothing is pinned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Merge `other` in, keeping entries already present.
    pub fn merge(&mut self, other: Self) {
        for (name, version) in other.versions {
            self.versions.entry(name).or_insert(version);
        }
    }
}

/// `"@scope/name@^1.0.0"` to `@scope/name`.
fn yarn_selector_name(selector: &str) -> Option<String> {
    let selector = selector.trim_matches('"');
    if selector.is_empty() {
        return None;
    }
    // Skip a leading scope '@' when looking for the range separator.
    let search_from = usize::from(selector.starts_with('@'));
    let at = selector[search_from..].find('@')? + search_from;
    Some(selector[..at].to_string())
}
