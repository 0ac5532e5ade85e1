//! Package version resolution.
//!
//! Picks the version of an npm package to use for an import, in order:
//! 1. the version already chosen earlier in the pass, keeping its origin
//! 2. the workspace package.json
//! 3. the lock file
//! 4. the range declared by an already-resolved package that depends on it
//! 5. `dist-tags.latest` from the registry, remembered for the rest of the pass

use super::error::PkgError;
use super::lockfile::LockedVersions;
use super::manifest::PackageManifest;
use super::registry::{get_latest_version, PackageRegistry};
use super::store::{DependencyStore, ResolvedVersion, VersionSource};
use super::version::{parse_version, resolve_version, NpmRange};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Version resolver for one resolution pass.
pub struct PackageVersionResolver {
    registry: Arc<dyn PackageRegistry>,
    workspace: Option<Arc<PackageManifest>>,
    locked: Arc<LockedVersions>,
    packuments: HashMap<String, Arc<Value>>,
    latest: HashMap<String, String>,
    registry_lookups: usize,
}

impl PackageVersionResolver {
    #[must_use]
    pub fn new(
        registry: Arc<dyn PackageRegistry>,
        workspace: Option<Arc<PackageManifest>>,
        locked: Arc<LockedVersions>,
    ) -> Self {
        Self {
            registry,
            workspace,
            locked,
            packuments: HashMap::new(),
            latest: HashMap::new(),
            registry_lookups: 0,
        }
    }

    /// Number of packuments requested from the registry during this pass.
    #[must_use]
    pub fn registry_lookups(&self) -> usize {
        self.registry_lookups
    }

    /// Resolve the version of `name` to use.
    ///
    /// # Errors
    /// Returns an error if no source yields a version, or the registry fails
    /// while one is being consulted.
    pub async fn resolve(
        &mut self,
        store: &DependencyStore,
        name: &str,
    ) -> Result<ResolvedVersion, PkgError> {
        if let Some(resolved) = self.configured(store, name).await {
            return Ok(resolved);
        }

        if let Some(declared) = store.declared_range(name) {
            let declared_by = declared.declared_by.clone();
            let range = declared.range.clone();
            match self.resolve_range(name, &range).await {
                Ok(version) => {
                    return Ok(ResolvedVersion::new(
                        version,
                        VersionSource::Dependent(declared_by),
                    ));
                }
                Err(e) => {
                    debug!(package = name, range = %range, declared_by = %declared_by, error = %e, "Declared range did not resolve");
                }
            }
        }

        self.latest(name)
            .await
            .map(|version| ResolvedVersion::new(version, VersionSource::Registry))
    }

    /// The version in effect for `name` from explicit configuration only.
    ///
    /// Consults the pass, the workspace package.json and the lock file, never
    /// the registry's latest. Used to check declared ranges against.
    pub async fn version_in_effect(
        &mut self,
        store: &DependencyStore,
        name: &str,
    ) -> Option<ResolvedVersion> {
        self.configured(store, name).await
    }

    /// A registry failure while resolving the workspace range falls through to
    /// the lock file.
    async fn configured(&mut self, store: &DependencyStore, name: &str) -> Option<ResolvedVersion> {
        if let Some(entry) = store.package(name) {
            return Some(ResolvedVersion::new(
                entry.version.clone(),
                entry.source.clone(),
            ));
        }

        let workspace_range = self
            .workspace
            .as_ref()
            .and_then(|manifest| manifest.declared_range(name))
            .map(String::from);

        if let Some(range) = workspace_range {
            match self.workspace_version(name, &range).await {
                Ok(Some(version)) => {
                    return Some(ResolvedVersion::new(version, VersionSource::Workspace));
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(package = name, range = %range, error = %e, "Workspace range did not resolve");
                }
            }
        }

        self.locked
            .get(name)
            .map(|version| ResolvedVersion::new(version, VersionSource::LockFile))
    }

    /// Turn a workspace range into a version.
    ///
    /// Exact versions are used as written. A lock file pin satisfying the range
    /// is preferred over asking the registry. Non-semver specifiers fall
    /// through to the lock file.
    async fn workspace_version(
        &mut self,
        name: &str,
        range: &str,
    ) -> Result<Option<String>, PkgError> {
        if let Ok(exact) = parse_version(range) {
            return Ok(Some(exact.to_string()));
        }

        let Ok(parsed) = NpmRange::parse(range) else {
            debug!(package = name, range, "Ignoring non-semver workspace specifier");
            return Ok(None);
        };

        if let Some(locked) = self.locked.get(name) {
            if parse_version(locked).is_ok_and(|v| parsed.matches(&v)) {
                return Ok(Some(locked.to_string()));
            }
        }

        self.resolve_range(name, range).await.map(Some)
    }

    async fn resolve_range(&mut self, name: &str, range: &str) -> Result<String, PkgError> {
        let packument = self.packument(name).await?;
        resolve_version(&packument, Some(range))
    }

    async fn latest(&mut self, name: &str) -> Result<String, PkgError> {
        if let Some(version) = self.latest.get(name) {
            return Ok(version.clone());
        }

        let packument = self.packument(name).await?;
        let version = get_latest_version(&packument)
            .map(String::from)
            .ok_or_else(|| PkgError::version_not_found(name, "latest"))?;

        self.latest.insert(name.to_string(), version.clone());
        Ok(version)
    }

    /// Packument of `name`, fetched at most once per pass. Failures are not
    /// remembered.
    async fn packument(&mut self, name: &str) -> Result<Arc<Value>, PkgError> {
        if let Some(packument) = self.packuments.get(name) {
            return Ok(Arc::clone(packument));
        }

        self.registry_lookups += 1;
        let packument = self.registry.fetch_packument(name).await?;
        self.packuments.insert(name.to_string(), Arc::clone(&packument));
        Ok(packument)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Registry serving fixed packuments and counting requests.
    #[derive(Default)]
    pub(crate) struct StaticRegistry {
        packuments: HashMap<String, Arc<Value>>,
        pub(crate) requests: AtomicUsize,
    }

    impl StaticRegistry {
        pub(crate) fn with(mut self, name: &str, versions: &[&str], latest: &str) -> Self {
            let versions: serde_json::Map<String, Value> = versions
                .iter()
                .map(|v| ((*v).to_string(), json!({ "version": v })))
                .collect();
            self.packuments.insert(
                name.to_string(),
                Arc::new(json!({
                    "name": name,
                    "dist-tags": { "latest": latest },
                    "versions": versions,
                })),
            );
            self
        }
    }

    #[async_trait]
    impl PackageRegistry for StaticRegistry {
        async fn fetch_packument(&self, name: &str) -> Result<Arc<Value>, PkgError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.packuments
                .get(name)
                .cloned()
                .ok_or_else(|| PkgError::not_found(name))
        }
    }

    fn registry() -> Arc<StaticRegistry> {
        Arc::new(
            StaticRegistry::default()
                .with("@openzeppelin/contracts", &["4.9.6", "5.0.1", "5.0.2"], "5.0.2")
                .with("solmate", &["6.1.0", "6.2.0"], "6.2.0"),
        )
    }

    fn resolver(
        registry: Arc<StaticRegistry>,
        workspace: Option<&str>,
        locked: LockedVersions,
    ) -> PackageVersionResolver {
        PackageVersionResolver::new(
            registry,
            workspace.map(|text| Arc::new(PackageManifest::parse(text).unwrap())),
            Arc::new(locked),
        )
    }

    #[tokio::test]
    async fn test_earlier_import_wins() {
        let mut store = DependencyStore::new();
        store.record_package(
            "solmate",
            &ResolvedVersion::new("6.1.0", VersionSource::ImportPath),
            None,
        );

        let mut versions = resolver(
            registry(),
            Some(r#"{ "dependencies": { "solmate": "6.2.0" } }"#),
            LockedVersions::default(),
        );
        let resolved = versions.resolve(&store, "solmate").await.unwrap();
        assert_eq!(resolved.version, "6.1.0");
        assert_eq!(resolved.source, VersionSource::ImportPath);
    }

    #[tokio::test]
    async fn test_workspace_range_against_registry() {
        let registry = registry();
        let mut versions = resolver(
            Arc::clone(&registry),
            Some(r#"{ "devDependencies": { "@openzeppelin/contracts": "^4.8.0" } }"#),
            LockedVersions::default(),
        );
        let resolved = versions
            .resolve(&DependencyStore::new(), "@openzeppelin/contracts")
            .await
            .unwrap();
        assert_eq!(resolved.version, "4.9.6");
        assert_eq!(resolved.source, VersionSource::Workspace);
    }

    #[tokio::test]
    async fn test_workspace_range_prefers_matching_lock_pin() {
        let registry = registry();
        let locked = LockedVersions::from_package_lock(
            r#"{ "packages": { "node_modules/@openzeppelin/contracts": { "version": "5.0.1" } } }"#,
        )
        .unwrap();
        let mut versions = resolver(
            Arc::clone(&registry),
            Some(r#"{ "dependencies": { "@openzeppelin/contracts": "^5.0.0" } }"#),
            locked,
        );
        let resolved = versions
            .resolve(&DependencyStore::new(), "@openzeppelin/contracts")
            .await
            .unwrap();
        assert_eq!(resolved.version, "5.0.1");
        assert_eq!(resolved.source, VersionSource::Workspace);
        assert_eq!(registry.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lock_file_before_registry() {
        let locked = LockedVersions::from_yarn_lock("solmate@^6.0.0:\n  version \"6.1.0\"\n");
        let mut versions = resolver(registry(), None, locked);
        let resolved = versions.resolve(&DependencyStore::new(), "solmate").await.unwrap();
        assert_eq!(resolved.version, "6.1.0");
        assert_eq!(resolved.source, VersionSource::LockFile);
    }

    #[tokio::test]
    async fn test_dependent_declared_range() {
        let mut store = DependencyStore::new();
        let manifest = PackageManifest::parse(
            r#"{ "peerDependencies": { "@openzeppelin/contracts": "^4.0.0" } }"#,
        )
        .unwrap();
        store.declare_ranges("@openzeppelin/contracts-upgradeable", &manifest);

        let mut versions = resolver(registry(), None, LockedVersions::default());
        let resolved = versions.resolve(&store, "@openzeppelin/contracts").await.unwrap();
        assert_eq!(resolved.version, "4.9.6");
        assert_eq!(
            resolved.source,
            VersionSource::Dependent("@openzeppelin/contracts-upgradeable".to_string())
        );
    }

    #[tokio::test]
    async fn test_registry_latest_cached_for_pass() {
        let registry = registry();
        let mut versions = resolver(Arc::clone(&registry), None, LockedVersions::default());
        let store = DependencyStore::new();

        let first = versions.resolve(&store, "solmate").await.unwrap();
        let second = versions.resolve(&store, "solmate").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.source, VersionSource::Registry);
        assert_eq!(registry.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_package_fails() {
        let mut versions = resolver(registry(), None, LockedVersions::default());
        let err = versions
            .resolve(&DependencyStore::new(), "does-not-exist")
            .await
            .unwrap_err();
        assert_eq!(err.code(), super::super::error::codes::PKG_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_offline_workspace_range_falls_back_to_lock_pin() {
        let registry = Arc::new(StaticRegistry::default());
        let locked = LockedVersions::from_package_lock(
            r#"{ "packages": { "node_modules/solmate": { "version": "6.1.0" } } }"#,
        )
        .unwrap();
        let mut versions = resolver(
            Arc::clone(&registry),
            Some(r#"{ "dependencies": { "solmate": "^7.0.0" } }"#),
            locked,
        );

        let resolved = versions.resolve(&DependencyStore::new(), "solmate").await.unwrap();
        assert_eq!(resolved.version, "6.1.0");
        assert_eq!(resolved.source, VersionSource::LockFile);
        assert_eq!(registry.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_packument_fetched_once_per_pass() {
        let registry = registry();
        let mut versions = resolver(
            Arc::clone(&registry),
            Some(r#"{ "dependencies": { "solmate": "^6.0.0" } }"#),
            LockedVersions::default(),
        );
        let store = DependencyStore::new();

        let resolved = versions.resolve(&store, "solmate").await.unwrap();
        assert_eq!(resolved.version, "6.2.0");
        for _ in 0..3 {
            let in_effect = versions.version_in_effect(&store, "solmate").await.unwrap();
            assert_eq!(in_effect.version, "6.2.0");
        }
        assert_eq!(registry.requests.load(Ordering::SeqCst), 1);
        assert_eq!(versions.registry_lookups(), 1);
    }

    #[tokio::test]
    async fn test_version_in_effect_skips_latest() {
        let registry = registry();
        let mut versions = resolver(Arc::clone(&registry), None, LockedVersions::default());
        assert!(versions
            .version_in_effect(&DependencyStore::new(), "solmate")
            .await
            .is_none());
        assert_eq!(registry.requests.load(Ordering::SeqCst), 0);
    }
}
