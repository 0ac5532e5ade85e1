//! Per-pass dependency store.
//!
//! Records which package version satisfied which import, and which package
//! introduced each transitive dependency. One store exists per resolution
//! pass; a package name maps to exactly one version within it.

use super::manifest::PackageManifest;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Where a chosen package version came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "package", rename_all = "camelCase")]
pub enum VersionSource {
    /// Pinned in the import path itself (`pkg@1.2.3/...`).
    ImportPath,
    /// The workspace's own package.json.
    Workspace,
    /// `package-lock.json` or `yarn.lock`.
    LockFile,
    /// Declared by an already-resolved package's package.json.
    Dependent(String),
    /// `dist-tags.latest` on the registry.
    Registry,
    /// A mapping persisted by an earlier pass, used when nothing else answers.
    ResolutionIndex,
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImportPath => f.write_str("import path"),
            Self::Workspace => f.write_str("workspace package.json"),
            Self::LockFile => f.write_str("lock file"),
            Self::Dependent(package) => write!(f, "package.json of {package}"),
            Self::Registry => f.write_str("npm registry"),
            Self::ResolutionIndex => f.write_str("resolution index"),
        }
    }
}

/// A version chosen for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedVersion {
    pub version: String,
    pub source: VersionSource,
}

impl ResolvedVersion {
    #[must_use]
    pub fn new(version: impl Into<String>, source: VersionSource) -> Self {
        Self {
            version: version.into(),
            source,
        }
    }
}

/// A package recorded in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageEntry {
    pub version: String,
    pub source: VersionSource,
    /// Package whose file first imported this one, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_package: Option<String>,
}

/// A later request for a different version than the one already recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedVersion {
    pub package: String,
    pub kept: String,
    pub requested: String,
    pub requested_by: Option<String>,
}

/// Outcome of [`DependencyStore::record_package`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    AlreadyRecorded,
    Rejected { kept: String },
}

/// A file in the source bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFile {
    pub path: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ResolvedFile {
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            source_package: None,
            version: None,
        }
    }

    #[must_use]
    pub fn with_package(mut self, package: &str, version: &str) -> Self {
        self.source_package = Some(package.to_string());
        self.version = Some(version.to_string());
        self
    }
}

/// Range declared for a dependency by an already-resolved package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredRange {
    pub declared_by: String,
    pub range: String,
}

/// In-memory record of one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct DependencyStore {
    packages: BTreeMap<String, PackageEntry>,
    files: BTreeMap<String, ResolvedFile>,
    declared: BTreeMap<String, DeclaredRange>,
    rejected: Vec<RejectedVersion>,
}

impl DependencyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the version used for `name`. The first writer wins.
    pub fn record_package(
        &mut self,
        name: &str,
        resolved: &ResolvedVersion,
        source_package: Option<&str>,
    ) -> RecordOutcome {
        if let Some(existing) = self.packages.get(name) {
            if existing.version == resolved.version {
                return RecordOutcome::AlreadyRecorded;
            }
            let kept = existing.version.clone();
            self.rejected.push(RejectedVersion {
                package: name.to_string(),
                kept: kept.clone(),
                requested: resolved.version.clone(),
                requested_by: source_package.map(String::from),
            });
            return RecordOutcome::Rejected { kept };
        }

        self.packages.insert(
            name.to_string(),
            PackageEntry {
                version: resolved.version.clone(),
                source: resolved.source.clone(),
                source_package: source_package.map(String::from),
            },
        );
        RecordOutcome::Inserted
    }

    #[must_use]
    pub fn package(&self, name: &str) -> Option<&PackageEntry> {
        self.packages.get(name)
    }

    #[must_use]
    pub fn packages(&self) -> &BTreeMap<String, PackageEntry> {
        &self.packages
    }

    #[must_use]
    pub fn rejected(&self) -> &[RejectedVersion] {
        &self.rejected
    }

    /// Remember the ranges a resolved package declares for its dependencies.
    ///
    /// The first declaration of a dependency name is kept.
    pub fn declare_ranges(&mut self, package: &str, manifest: &PackageManifest) {
        for (dependency, range, _) in manifest.checked_dependencies() {
            self.declared
                .entry(dependency.to_string())
                .or_insert_with(|| DeclaredRange {
                    declared_by: package.to_string(),
                    range: range.to_string(),
                });
        }
    }

    #[must_use]
    pub fn declared_range(&self, dependency: &str) -> Option<&DeclaredRange> {
        self.declared.get(dependency)
    }

    /// Add a file to the bundle. Returns `false` if the path is already present.
    pub fn insert_file(&mut self, file: ResolvedFile) -> bool {
        if self.files.contains_key(&file.path) {
            return false;
        }
        self.files.insert(file.path.clone(), file);
        true
    }

    #[must_use]
    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    #[must_use]
    pub fn file(&self, path: &str) -> Option<&ResolvedFile> {
        self.files.get(path)
    }

    #[must_use]
    pub fn files(&self) -> &BTreeMap<String, ResolvedFile> {
        &self.files
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let mut store = DependencyStore::new();
        let first = ResolvedVersion::new("5.0.2", VersionSource::Workspace);
        let second = ResolvedVersion::new("4.9.6", VersionSource::ImportPath);

        assert_eq!(
            store.record_package("@openzeppelin/contracts", &first, None),
            RecordOutcome::Inserted
        );
        assert_eq!(
            store.record_package("@openzeppelin/contracts", &first, Some("solady")),
            RecordOutcome::AlreadyRecorded
        );
        assert_eq!(
            store.record_package("@openzeppelin/contracts", &second, Some("old-lib")),
            RecordOutcome::Rejected {
                kept: "5.0.2".to_string()
            }
        );

        assert_eq!(store.package("@openzeppelin/contracts").unwrap().version, "5.0.2");
        assert_eq!(store.rejected().len(), 1);
        assert_eq!(store.rejected()[0].requested_by.as_deref(), Some("old-lib"));
    }

    #[test]
    fn test_declared_ranges_keep_first() {
        let mut store = DependencyStore::new();
        let a = PackageManifest::parse(r#"{ "dependencies": { "solmate": "^6.0.0" } }"#).unwrap();
        let b = PackageManifest::parse(r#"{ "peerDependencies": { "solmate": "^5.0.0" } }"#).unwrap();

        store.declare_ranges("pkg-a", &a);
        store.declare_ranges("pkg-b", &b);

        let declared = store.declared_range("solmate").unwrap();
        assert_eq!(declared.declared_by, "pkg-a");
        assert_eq!(declared.range, "^6.0.0");
    }

    #[test]
    fn test_insert_file_once() {
        let mut store = DependencyStore::new();
        assert!(store.insert_file(ResolvedFile::new("contracts/A.sol", "a")));
        assert!(!store.insert_file(ResolvedFile::new("contracts/A.sol", "changed")));
        assert_eq!(store.file("contracts/A.sol").unwrap().content, "a");
        assert_eq!(store.file_count(), 1);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(
            VersionSource::Dependent("@openzeppelin/contracts-upgradeable".into()).to_string(),
            "package.json of @openzeppelin/contracts-upgradeable"
        );
        assert_eq!(VersionSource::Registry.to_string(), "npm registry");
    }
}
