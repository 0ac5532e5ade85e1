//! Version conflict detection.
//!
//! After a package is resolved, every range its package.json declares in
//! `dependencies` and `peerDependencies` is compared with the version in effect
//! for that dependency. Mismatches are logged once per signature and never
//! fail the build. A required peer with no version in effect is logged as a
//! warning; optional peers may be absent.

use super::manifest::{DependencyKind, PackageManifest};
use super::resolve::PackageVersionResolver;
use super::store::{DependencyStore, VersionSource};
use super::version::{parse_version, NpmRange};
use crate::fetch::terminal::{Severity, Terminal};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// How serious a mismatch is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Same major version, outside the declared range.
    Potential,
    /// Major version differs from the declared range.
    Breaking,
    /// Any peer dependency mismatch.
    PeerBreaking,
}

impl ConflictKind {
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::Potential => Severity::Warning,
            Self::Breaking | Self::PeerBreaking => Severity::Error,
        }
    }
}

/// A declared range not satisfied by the version in effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub consumer: String,
    pub consumer_version: String,
    pub dependency: String,
    pub requested_range: String,
    pub resolved_version: String,
    pub source: VersionSource,
    pub kind: ConflictKind,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relation = if self.kind == ConflictKind::PeerBreaking {
            "peer-depends on"
        } else {
            "depends on"
        };
        write!(
            f,
            "{}@{} {relation} {}@{} but {} is in use (from {})",
            self.consumer,
            self.consumer_version,
            self.dependency,
            self.requested_range,
            self.resolved_version,
            self.source,
        )
    }
}

type Signature = (String, String, String, String);

/// Checks resolved packages against the versions chosen elsewhere.
///
/// Shared across passes so a conflict is reported once per signature
/// `(consumer, dependency, range, resolved version)`.
pub struct ConflictChecker {
    terminal: Arc<dyn Terminal>,
    seen: Mutex<HashSet<Signature>>,
}

impl ConflictChecker {
    #[must_use]
    pub fn new(terminal: Arc<dyn Terminal>) -> Self {
        Self {
            terminal,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Check `package@version`'s declared dependencies.
    ///
    /// Returns every conflict found; only ones not reported before are logged.
    pub async fn check_package_dependencies(
        &self,
        package: &str,
        version: &str,
        manifest: &PackageManifest,
        versions: &mut PackageVersionResolver,
        store: &DependencyStore,
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for (dependency, range, kind) in manifest.checked_dependencies() {
            let Ok(parsed) = NpmRange::parse(range) else {
                debug!(consumer = package, dependency, range, "Skipping unparseable range");
                continue;
            };

            let Some(in_effect) = versions.version_in_effect(store, dependency).await else {
                if kind == DependencyKind::Peer && !manifest.is_optional_peer(dependency) {
                    self.report_missing_peer(package, version, dependency, range);
                }
                continue;
            };

            let Ok(resolved) = parse_version(&in_effect.version) else {
                continue;
            };
            if parsed.matches(&resolved) {
                continue;
            }

            let conflict_kind = if kind == DependencyKind::Peer {
                ConflictKind::PeerBreaking
            } else {
                let majors = parsed.majors();
                if !majors.is_empty() && !majors.contains(&resolved.major) {
                    ConflictKind::Breaking
                } else {
                    ConflictKind::Potential
                }
            };

            conflicts.push(Conflict {
                consumer: package.to_string(),
                consumer_version: version.to_string(),
                dependency: dependency.to_string(),
                requested_range: range.to_string(),
                resolved_version: in_effect.version,
                source: in_effect.source,
                kind: conflict_kind,
            });
        }

        for conflict in &conflicts {
            if self.first_report(conflict) {
                self.terminal.log(conflict.kind.severity(), &conflict.to_string());
            }
        }

        conflicts
    }

    fn report_missing_peer(&self, package: &str, version: &str, dependency: &str, range: &str) {
        let signature = (
            package.to_string(),
            dependency.to_string(),
            range.to_string(),
            String::new(),
        );
        if self.insert_signature(signature) {
            self.terminal.log(
                Severity::Warning,
                &format!(
                    "{package}@{version} peer-depends on {dependency}@{range} but no version of {dependency} is configured"
                ),
            );
        }
    }

    fn first_report(&self, conflict: &Conflict) -> bool {
        self.insert_signature((
            conflict.consumer.clone(),
            conflict.dependency.clone(),
            conflict.requested_range.clone(),
            conflict.resolved_version.clone(),
        ))
    }

    fn insert_signature(&self, signature: Signature) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(signature),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::terminal::RecordingTerminal;
    use crate::pkg::lockfile::LockedVersions;
    use crate::pkg::resolve::tests::StaticRegistry;
    use crate::pkg::store::ResolvedVersion;

    fn setup(workspace: &str) -> (Arc<RecordingTerminal>, ConflictChecker, PackageVersionResolver) {
        let terminal = Arc::new(RecordingTerminal::new());
        let checker = ConflictChecker::new(terminal.clone());
        let versions = PackageVersionResolver::new(
            Arc::new(StaticRegistry::default()),
            Some(Arc::new(PackageManifest::parse(workspace).unwrap())),
            Arc::new(LockedVersions::default()),
        );
        (terminal, checker, versions)
    }

    #[tokio::test]
    async fn test_satisfied_is_silent() {
        let (terminal, checker, mut versions) =
            setup(r#"{ "dependencies": { "@openzeppelin/contracts": "5.0.2" } }"#);
        let manifest = PackageManifest::parse(
            r#"{ "peerDependencies": { "@openzeppelin/contracts": "^5.0.0" } }"#,
        )
        .unwrap();

        let conflicts = checker
            .check_package_dependencies(
                "@openzeppelin/contracts-upgradeable",
                "5.0.2",
                &manifest,
                &mut versions,
                &DependencyStore::new(),
            )
            .await;
        assert!(conflicts.is_empty());
        assert!(terminal.entries().is_empty());
    }

    #[tokio::test]
    async fn test_classification() {
        let (terminal, checker, mut versions) = setup("{}");
        let mut store = DependencyStore::new();
        for (name, version) in [("a", "1.4.0"), ("b", "2.0.0"), ("c", "1.0.0")] {
            store.record_package(name, &ResolvedVersion::new(version, VersionSource::Registry), None);
        }
        let manifest = PackageManifest::parse(
            r#"{
                "dependencies": { "a": "~1.2.0", "b": "^1.0.0" },
                "peerDependencies": { "c": "~1.1.0" }
            }"#,
        )
        .unwrap();

        let conflicts = checker
            .check_package_dependencies("lib", "0.1.0", &manifest, &mut versions, &store)
            .await;
        let kinds: Vec<_> = conflicts.iter().map(|c| (c.dependency.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a", ConflictKind::Potential),
                ("b", ConflictKind::Breaking),
                ("c", ConflictKind::PeerBreaking),
            ]
        );
        assert_eq!(terminal.messages(Severity::Warning).len(), 1);
        assert_eq!(terminal.messages(Severity::Error).len(), 2);
        assert!(conflicts[1].to_string().contains("from npm registry"));
    }

    #[tokio::test]
    async fn test_same_conflict_logged_once() {
        let (terminal, checker, mut versions) =
            setup(r#"{ "dependencies": { "@openzeppelin/contracts": "4.9.6" } }"#);
        let manifest = PackageManifest::parse(
            r#"{ "dependencies": { "@openzeppelin/contracts": "^5.0.0" } }"#,
        )
        .unwrap();
        let store = DependencyStore::new();

        for _ in 0..2 {
            let conflicts = checker
                .check_package_dependencies("oz-helpers", "1.0.0", &manifest, &mut versions, &store)
                .await;
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].source, VersionSource::Workspace);
        }
        assert_eq!(terminal.entries().len(), 1);

        let other = ConflictChecker::new(terminal.clone());
        other
            .check_package_dependencies("oz-helpers", "1.0.0", &manifest, &mut versions, &store)
            .await;
        assert_eq!(terminal.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_conflict_names_origin_of_version() {
        let (_terminal, checker, mut versions) = setup("{}");
        let mut store = DependencyStore::new();
        store.record_package(
            "solmate",
            &ResolvedVersion::new("5.0.0", VersionSource::Dependent("lib-b".to_string())),
            Some("lib-b"),
        );
        let manifest =
            PackageManifest::parse(r#"{ "dependencies": { "solmate": "^6.0.0" } }"#).unwrap();

        let conflicts = checker
            .check_package_dependencies("lib-a", "1.0.0", &manifest, &mut versions, &store)
            .await;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].source, VersionSource::Dependent("lib-b".to_string()));
        assert!(conflicts[0]
            .to_string()
            .ends_with("but 5.0.0 is in use (from package.json of lib-b)"));
    }

    #[tokio::test]
    async fn test_missing_required_peer_warned_once() {
        let (terminal, checker, mut versions) = setup("{}");
        let manifest = PackageManifest::parse(
            r#"{ "peerDependencies": { "@openzeppelin/contracts": "^5.0.0" } }"#,
        )
        .unwrap();

        for _ in 0..2 {
            let conflicts = checker
                .check_package_dependencies(
                    "@openzeppelin/contracts-upgradeable",
                    "5.0.2",
                    &manifest,
                    &mut versions,
                    &DependencyStore::new(),
                )
                .await;
            assert!(conflicts.is_empty());
        }

        let warnings = terminal.messages(Severity::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("peer-depends on @openzeppelin/contracts@^5.0.0"));
    }

    #[tokio::test]
    async fn test_absent_and_unparseable_skipped() {
        let (terminal, checker, mut versions) = setup("{}");
        let manifest = PackageManifest::parse(
            r#"{
                "dependencies": { "missing": "^1.0.0", "git-dep": "github:foo/bar" },
                "peerDependencies": { "optional-peer": "^2.0.0" },
                "peerDependenciesMeta": { "optional-peer": { "optional": true } }
            }"#,
        )
        .unwrap();

        let conflicts = checker
            .check_package_dependencies("lib", "1.0.0", &manifest, &mut versions, &DependencyStore::new())
            .await;
        assert!(conflicts.is_empty());
        assert!(terminal.entries().is_empty());
    }
}
