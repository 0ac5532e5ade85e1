//! package.json parsing.
//!
//! Only the fields that matter for Solidity dependency resolution are read;
//! everything else in the manifest is ignored.

use super::error::PkgError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Kind of declared dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
    Regular,
    Peer,
    Dev,
}

/// A parsed package.json.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(deserialize_with = "string_map")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "string_map")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "string_map")]
    pub peer_dependencies: BTreeMap<String, String>,
    pub peer_dependencies_meta: BTreeMap<String, PeerMeta>,
}

/// Entry of `peerDependenciesMeta`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PeerMeta {
    pub optional: bool,
}

impl PackageManifest {
    /// Parse a package.json document.
    ///
    /// # Errors
    /// Returns an error if the text is not a JSON object.
    pub fn parse(content: &str) -> Result<Self, PkgError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| PkgError::manifest_invalid(format!("Invalid JSON: {e}")))?;
        if !value.is_object() {
            return Err(PkgError::manifest_invalid(
                "package.json must be a JSON object",
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| PkgError::manifest_invalid(format!("Invalid package.json: {e}")))
    }

    /// Range declared for `name` in the workspace sense: dependencies win over
    /// devDependencies, which win over peerDependencies.
    #[must_use]
    pub fn declared_range(&self, name: &str) -> Option<&str> {
        self.dependencies
            .get(name)
            .or_else(|| self.dev_dependencies.get(name))
            .or_else(|| self.peer_dependencies.get(name))
            .map(String::as_str)
    }

    /// Runtime and peer dependencies, in name order, as consumed by conflict checks.
    pub fn checked_dependencies(&self) -> impl Iterator<Item = (&str, &str, DependencyKind)> {
        let regular = self
            .dependencies
            .iter()
            .map(|(n, r)| (n.as_str(), r.as_str(), DependencyKind::Regular));
        let peer = self
            .peer_dependencies
            .iter()
            .map(|(n, r)| (n.as_str(), r.as_str(), DependencyKind::Peer));
        regular.chain(peer)
    }

    /// Whether a peer dependency is marked optional.
    #[must_use]
    pub fn is_optional_peer(&self, name: &str) -> bool {
        self.peer_dependencies_meta
            .get(name)
            .is_some_and(|meta| meta.optional)
    }
}

/// Accept only string values in a dependency section, dropping the rest.
///
/// Real-world manifests occasionally carry `null` or objects in these maps;
/// they cannot be resolved but must not make the whole manifest unreadable.
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, range)| range.as_str().map(|r| (name, r.to_string())))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections() {
        let manifest = PackageManifest::parse(
            r#"{
                "name": "@openzeppelin/contracts-upgradeable",
                "version": "5.0.2",
                "dependencies": { "solady": "^0.0.200" },
                "peerDependencies": { "@openzeppelin/contracts": "5.0.2" },
                "peerDependenciesMeta": { "@openzeppelin/contracts": { "optional": false } }
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.name.as_deref(), Some("@openzeppelin/contracts-upgradeable"));
        assert_eq!(manifest.peer_dependencies["@openzeppelin/contracts"], "5.0.2");
        assert!(!manifest.is_optional_peer("@openzeppelin/contracts"));

        let checked: Vec<_> = manifest.checked_dependencies().collect();
        assert_eq!(checked.len(), 2);
        assert_eq!(checked[0].2, DependencyKind::Regular);
        assert_eq!(checked[1].2, DependencyKind::Peer);
    }

    #[test]
    fn test_declared_range_precedence() {
        let manifest = PackageManifest::parse(
            r#"{
                "dependencies": { "a": "^1.0.0" },
                "devDependencies": { "a": "^2.0.0", "b": "~3.1.0" },
                "peerDependencies": { "c": "*" }
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.declared_range("a"), Some("^1.0.0"));
        assert_eq!(manifest.declared_range("b"), Some("~3.1.0"));
        assert_eq!(manifest.declared_range("c"), Some("*"));
        assert_eq!(manifest.declared_range("d"), None);
    }

    #[test]
    fn test_non_string_ranges_dropped() {
        let manifest =
            PackageManifest::parse(r#"{ "dependencies": { "a": "^1.0.0", "b": 42, "c": null } }"#)
                .unwrap();
        assert_eq!(manifest.dependencies.len(), 1);
    }

    #[test]
    fn test_not_an_object() {
        let err = PackageManifest::parse("[1, 2]").unwrap_err();
        assert_eq!(err.code(), super::super::error::codes::PKG_MANIFEST_INVALID);
        assert!(PackageManifest::parse("{").is_err());
    }
}
