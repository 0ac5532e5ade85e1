//! One resolution pass over the import graph of a target.
//!
//! Files are visited breadth-first. Each file's imports are resolved in source
//! order; new files are queued, files already in the bundle are only indexed.
//! A file enters the bundle under one key: an import reaching a file already
//! bundled under another key is rewritten to that key. A failing import
//! becomes an [`ImportDiagnostic`] and the walk continues.

use super::tree::{codes, DependencyTree, ImportDiagnostic, PassStats};
use super::ResolverInner;
use crate::error::ResolveError;
use crate::fetch::{ContentFetcher, FetchError, Severity};
use crate::handlers::ImportHandlerContext;
use crate::imports::{extract_imports, ImportReference};
use crate::index::PassTicket;
use crate::normalize::{classify, is_url, NormalizedReference, RefKind};
use crate::paths::{self, NPM_DEPS_DIR};
use crate::pkg::{
    Conflict, DependencyStore, LockedVersions, PackageImport, PackageManifest,
    PackageVersionResolver, PkgError, RecordOutcome, ResolvedFile, ResolvedVersion,
    VersionSource, NPM_LOCKFILE, YARN_LOCKFILE,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A file whose imports are still to be scanned.
struct Visit {
    /// `path` is the bundle key.
    file: ResolvedFile,
    disk: Option<String>,
    url: Option<String>,
    depth: usize,
}

impl Visit {
    fn package(&self) -> Option<(&str, &str)> {
        match (&self.file.source_package, &self.file.version) {
            (Some(name), Some(version)) => Some((name, version)),
            _ => None,
        }
    }

    /// Source-file key of this file in the resolution index.
    fn index_key(&self) -> &str {
        self.disk.as_deref().unwrap_or(&self.file.path)
    }
}

/// Where the content of one import lives.
struct Location {
    key: String,
    disk: Option<String>,
    url: Option<String>,
    package: Option<(String, String)>,
    from_index: bool,
}

impl Location {
    fn resolved_path(&self) -> &str {
        self.disk.as_deref().unwrap_or(&self.key)
    }
}

enum Via {
    Sources,
    Disk,
    Remote,
}

/// Why a single import could not be resolved.
struct ImportFailure {
    code: String,
    message: String,
}

impl ImportFailure {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<FetchError> for ImportFailure {
    fn from(e: FetchError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<PkgError> for ImportFailure {
    fn from(e: PkgError) -> Self {
        Self::new(e.code(), e.message())
    }
}

pub(crate) struct Pass<'a> {
    inner: &'a ResolverInner,
    ticket: PassTicket,
    target: String,
    sources: &'a BTreeMap<String, String>,
    cdn: String,
    store: DependencyStore,
    versions: PackageVersionResolver,
    seen: HashSet<String>,
    /// Bundle key of each file read from disk, by disk path.
    bundled: HashMap<String, String>,
    manifests: HashSet<String>,
    queue: VecDeque<Visit>,
    diagnostics: Vec<ImportDiagnostic>,
    conflicts: Vec<Conflict>,
    stats: PassStats,
}

impl<'a> Pass<'a> {
    /// Prepare a pass: take a session ticket, load the index and read the
    /// workspace package.json and lock files.
    pub(crate) async fn start(
        inner: &'a ResolverInner,
        target: String,
        sources: &'a BTreeMap<String, String>,
    ) -> Result<Self, ResolveError> {
        let ticket = inner.index.begin_pass();
        inner.index.load().await?;

        let (workspace, locked) = workspace_inputs(&inner.fetcher).await;
        let versions =
            PackageVersionResolver::new(Arc::clone(&inner.registry), workspace, Arc::new(locked));

        let mut cdn = inner.settings.npm_cdn_url.clone();
        if !cdn.ends_with('/') {
            cdn.push('/');
        }

        Ok(Self {
            inner,
            ticket,
            target,
            sources,
            cdn,
            store: DependencyStore::new(),
            versions,
            seen: HashSet::new(),
            bundled: HashMap::new(),
            manifests: HashSet::new(),
            queue: VecDeque::new(),
            diagnostics: Vec::new(),
            conflicts: Vec::new(),
            stats: PassStats::default(),
        })
    }

    pub(crate) async fn run(mut self) -> Result<DependencyTree, ResolveError> {
        let content = self.read_target().await?;
        self.seen.insert(self.target.clone());
        self.bundled.insert(self.target.clone(), self.target.clone());
        self.queue.push_back(Visit {
            file: ResolvedFile::new(self.target.clone(), content),
            disk: Some(self.target.clone()),
            url: None,
            depth: 0,
        });

        while let Some(visit) = self.queue.pop_front() {
            self.ensure_current()?;
            self.scan(visit).await?;
        }
        self.ensure_current()?;

        self.stats.registry_lookups = self.versions.registry_lookups();
        info!(
            entry = %self.target,
            files = self.store.file_count(),
            diagnostics = self.diagnostics.len(),
            conflicts = self.conflicts.len(),
            "Resolution pass complete"
        );

        Ok(DependencyTree::new(
            self.target,
            self.store,
            self.diagnostics,
            self.conflicts,
            self.stats,
        ))
    }

    fn ensure_current(&self) -> Result<(), ResolveError> {
        if self.inner.index.is_current(self.ticket) {
            Ok(())
        } else {
            debug!(entry = %self.target, "Abandoning pass from previous workspace");
            Err(ResolveError::Abandoned {
                target: self.target.clone(),
            })
        }
    }

    async fn read_target(&self) -> Result<String, ResolveError> {
        if let Some(content) = self.sources.get(&self.target) {
            return Ok(content.clone());
        }
        self.inner
            .fetcher
            .read_local(&self.target)
            .await
            .map_err(|e| match e {
                FetchError::NotFound { .. } => ResolveError::TargetNotFound {
                    path: self.target.clone(),
                },
                other => ResolveError::TargetUnreadable {
                    path: self.target.clone(),
                    message: other.to_string(),
                },
            })
    }

    async fn scan(&mut self, mut visit: Visit) -> Result<(), ResolveError> {
        self.stats.files_scanned += 1;
        let imports = extract_imports(&visit.file.path, &visit.file.content);
        debug!(file = %visit.file.path, imports = imports.len(), "Scanning imports");

        let mut rewrites = Vec::new();
        for import in &imports {
            self.ensure_current()?;
            match self.resolve_import(&visit, import).await {
                Ok(Some(rewritten)) => rewrites.push((import.raw_text.clone(), rewritten)),
                Ok(None) => {}
                Err(failure) => self.diagnose(&visit, import, failure),
            }
        }

        if !rewrites.is_empty() {
            visit.file.content = rewrite_imports(&visit.file.content, &rewrites);
        }
        self.store.insert_file(visit.file);
        Ok(())
    }

    fn diagnose(&mut self, visit: &Visit, import: &ImportReference, failure: ImportFailure) {
        let diagnostic = ImportDiagnostic {
            importer: visit.file.path.clone(),
            import: import.raw_text.clone(),
            line: import.line,
            code: failure.code,
            message: failure.message,
        };
        warn!(
            importer = %diagnostic.importer,
            import = %diagnostic.import,
            code = %diagnostic.code,
            "Import unresolved"
        );
        self.inner
            .terminal
            .log(Severity::Error, &diagnostic.to_string());
        self.diagnostics.push(diagnostic);
    }

    /// Resolve one import. Returns the text the import should be rewritten to,
    /// if any.
    async fn resolve_import(
        &mut self,
        visit: &Visit,
        import: &ImportReference,
    ) -> Result<Option<String>, ImportFailure> {
        let raw = import.raw_text.as_str();

        let ctx = ImportHandlerContext {
            import_path: raw,
            importer: &visit.file.path,
        };
        if let Some(handled) = self.inner.handlers.resolve(&ctx).await {
            self.stats.handler_hits += 1;
            self.record(visit, raw, &handled.path);
            if !self.seen.contains(&handled.path) {
                self.admit(visit)?;
                self.seen.insert(handled.path.clone());
                self.queue.push_back(Visit {
                    file: ResolvedFile::new(handled.path, handled.content),
                    disk: None,
                    url: None,
                    depth: visit.depth + 1,
                });
            }
            return Ok(None);
        }

        if paths::is_relative(raw) {
            return self.resolve_relative(visit, raw).await;
        }

        let reference = classify(raw);
        let workspace_file = reference.kind == RefKind::Npm
            && reference.fetch_url.is_none()
            && self.in_workspace(raw).await;
        match reference.kind {
            RefKind::Local => self.resolve_local(visit, raw).await,
            RefKind::Npm if workspace_file => self.resolve_local(visit, raw).await,
            RefKind::Npm => self.resolve_npm(visit, raw, &reference).await,
            RefKind::Github | RefKind::Ipfs | RefKind::Swarm | RefKind::Http => {
                self.resolve_remote(visit, raw, &reference).await
            }
        }
    }

    async fn in_workspace(&self, raw: &str) -> bool {
        self.sources.contains_key(raw) || self.inner.fetcher.exists(&paths::normalize(raw)).await
    }

    /// Relative imports of a persisted dependency stay inside its package,
    /// repository or host directory under `.deps/`.
    async fn resolve_relative(
        &mut self,
        visit: &Visit,
        raw: &str,
    ) -> Result<Option<String>, ImportFailure> {
        let disk = match visit.disk.as_deref() {
            Some(importer) => Some(paths::join_confined(importer, raw).ok_or_else(|| {
                ImportFailure::new(
                    codes::OUTSIDE_ROOT,
                    format!("{raw} resolves outside the directory of {importer}"),
                )
            })?),
            None => None,
        };
        let key = join_import(&visit.file.path, raw);
        let location = Location {
            key: key.clone(),
            disk,
            url: visit.url.as_deref().and_then(|url| join_url(url, raw)),
            package: visit
                .package()
                .map(|(name, version)| (name.to_string(), version.to_string())),
            from_index: false,
        };
        let bundled = self.include(visit, raw, location).await?;
        Ok((bundled != key).then_some(bundled))
    }

    async fn resolve_local(
        &mut self,
        visit: &Visit,
        raw: &str,
    ) -> Result<Option<String>, ImportFailure> {
        let key = paths::normalize(raw);
        let location = Location {
            disk: Some(key.clone()),
            key: key.clone(),
            url: None,
            package: None,
            from_index: false,
        };
        let bundled = self.include(visit, raw, location).await?;
        Ok((bundled != key).then_some(bundled))
    }

    async fn resolve_remote(
        &mut self,
        visit: &Visit,
        raw: &str,
        reference: &NormalizedReference,
    ) -> Result<Option<String>, ImportFailure> {
        let mut indexed = None;
        if let Some(local) = self.inner.index.resolve_import_from_index(visit.index_key(), raw) {
            if self.inner.fetcher.exists(&local).await {
                indexed = Some(local);
            }
        }

        let location = Location {
            key: raw.to_string(),
            from_index: indexed.is_some(),
            disk: Some(indexed.unwrap_or_else(|| paths::deps_file_path(&reference.canonical_path))),
            url: reference.fetch_url.clone(),
            package: None,
        };
        let bundled = self.include(visit, raw, location).await?;
        Ok((bundled != raw).then_some(bundled))
    }

    async fn resolve_npm(
        &mut self,
        visit: &Visit,
        raw: &str,
        reference: &NormalizedReference,
    ) -> Result<Option<String>, ImportFailure> {
        // CDN URLs carry their version.
        if let Some(fetch_url) = &reference.fetch_url {
            let import = PackageImport::parse(&reference.canonical_path)?;
            let pinned = import.version.clone().unwrap_or_default();
            let version = self.use_version(
                visit,
                &import.name,
                &ResolvedVersion::new(pinned, VersionSource::ImportPath),
            );
            let location = Location {
                key: raw.to_string(),
                disk: Some(paths::npm_file_path(&reference.canonical_path)),
                url: Some(fetch_url.clone()),
                package: Some((import.name.clone(), version.clone())),
                from_index: false,
            };
            let bundled = self.include(visit, raw, location).await?;
            self.load_manifest(&import.name, &version).await;
            return Ok((bundled != raw).then_some(bundled));
        }

        let import = PackageImport::parse(raw)?;
        let resolved = match &import.version {
            Some(version) => ResolvedVersion::new(version.clone(), VersionSource::ImportPath),
            None => self.resolve_version(visit, raw, &import.name).await?,
        };
        let version = self.use_version(visit, &import.name, &resolved);

        let versioned = import.versioned_path(&version);
        let rewrite = visit.package().is_some() && import.version.is_none();
        let location = Location {
            key: if rewrite { versioned.clone() } else { raw.to_string() },
            disk: Some(paths::npm_file_path(&versioned)),
            url: Some(format!("{}{versioned}", self.cdn)),
            package: Some((import.name.clone(), version.clone())),
            from_index: false,
        };
        let bundled = self.include(visit, raw, location).await?;
        self.load_manifest(&import.name, &version).await;

        Ok((bundled != raw).then_some(bundled))
    }

    async fn resolve_version(
        &mut self,
        visit: &Visit,
        raw: &str,
        name: &str,
    ) -> Result<ResolvedVersion, ImportFailure> {
        match self.versions.resolve(&self.store, name).await {
            Ok(resolved) => Ok(resolved),
            Err(cause) => {
                if let Some(version) = self.version_from_index(visit, raw) {
                    debug!(package = name, version = %version, error = %cause, "Using indexed version");
                    return Ok(ResolvedVersion::new(version, VersionSource::ResolutionIndex));
                }
                Err(PkgError::dependency_resolution(name, &visit.file.path, &cause).into())
            }
        }
    }

    /// Version of the npm path an earlier pass resolved this import to.
    fn version_from_index(&self, visit: &Visit, raw: &str) -> Option<String> {
        let stored = self
            .inner
            .index
            .resolve_import_from_index(visit.index_key(), raw)?;
        let npm_path = stored.strip_prefix(NPM_DEPS_DIR)?.strip_prefix('/')?;
        PackageImport::parse(npm_path).ok()?.version
    }

    /// Record `resolved` for `name` and return the version the file is read at.
    ///
    /// A version pinned in the import path is honoured even when the store
    /// already holds another one; the mismatch is reported.
    fn use_version(&mut self, visit: &Visit, name: &str, resolved: &ResolvedVersion) -> String {
        let requested_by = visit.package().map(|(package, _)| package);
        match self.store.record_package(name, resolved, requested_by) {
            RecordOutcome::Inserted | RecordOutcome::AlreadyRecorded => resolved.version.clone(),
            RecordOutcome::Rejected { kept } => {
                self.inner.terminal.log(
                    Severity::Warning,
                    &format!(
                        "{} requests {name}@{} but {name}@{kept} is already in use",
                        visit.file.path, resolved.version
                    ),
                );
                if resolved.source == VersionSource::ImportPath {
                    resolved.version.clone()
                } else {
                    kept
                }
            }
        }
    }

    /// Read `name@version`'s package.json once per pass, check its declared
    /// dependencies and remember its ranges.
    async fn load_manifest(&mut self, name: &str, version: &str) {
        let id = format!("{name}@{version}");
        if !self.manifests.insert(id.clone()) {
            return;
        }

        let disk = format!("{}/package.json", paths::npm_package_dir(name, version));
        let text = if self.inner.fetcher.exists(&disk).await {
            self.inner.fetcher.read_local(&disk).await
        } else {
            let url = format!("{}{id}/package.json", self.cdn);
            match self.inner.fetcher.fetch_remote(&url).await {
                Ok(text) => {
                    if let Err(e) = self.inner.fetcher.write_local(&disk, &text).await {
                        warn!(path = %disk, error = %e, "Failed to persist package.json");
                    }
                    Ok(text)
                }
                Err(e) => Err(e),
            }
        };

        let parsed = text
            .map_err(|e| e.to_string())
            .and_then(|text| PackageManifest::parse(&text).map_err(|e| e.to_string()));
        let manifest = match parsed {
            Ok(manifest) => manifest,
            Err(message) => {
                self.inner.terminal.log(
                    Severity::Warning,
                    &format!("Cannot read package.json of {id}: {message}"),
                );
                return;
            }
        };

        let found = self
            .inner
            .conflicts
            .check_package_dependencies(name, version, &manifest, &mut self.versions, &self.store)
            .await;
        self.conflicts.extend(found);
        self.store.declare_ranges(name, &manifest);
    }

    /// Queue the file at `location` unless it is already in the bundle, and
    /// index the resolution either way.
    ///
    /// Returns the bundle key of the file, which differs from `location.key`
    /// when the same disk file was bundled earlier under another key.
    async fn include(
        &mut self,
        visit: &Visit,
        raw: &str,
        location: Location,
    ) -> Result<String, ImportFailure> {
        if self.seen.contains(&location.key) {
            self.record(visit, raw, location.resolved_path());
            return Ok(location.key);
        }
        if let Some(existing) = location.disk.as_ref().and_then(|disk| self.bundled.get(disk)) {
            let existing = existing.clone();
            debug!(import = raw, key = %existing, "File already bundled under another key");
            self.record(visit, raw, location.resolved_path());
            return Ok(existing);
        }
        self.admit(visit)?;

        let (content, via) = self.load(&location).await?;
        match via {
            Via::Remote => self.stats.fetched_remote += 1,
            Via::Disk if location.from_index => self.stats.from_index += 1,
            Via::Sources | Via::Disk => self.stats.from_disk += 1,
        }
        self.record(visit, raw, location.resolved_path());

        let mut file = ResolvedFile::new(location.key.clone(), content);
        if let Some((name, version)) = &location.package {
            file = file.with_package(name, version);
        }
        self.seen.insert(location.key.clone());
        if let Some(disk) = &location.disk {
            self.bundled.insert(disk.clone(), location.key.clone());
        }
        self.queue.push_back(Visit {
            file,
            disk: location.disk,
            url: location.url,
            depth: visit.depth + 1,
        });
        Ok(location.key)
    }

    /// Enforce the depth and bundle size bounds before adding a file.
    fn admit(&self, visit: &Visit) -> Result<(), ImportFailure> {
        let settings = &self.inner.settings;
        if visit.depth + 1 > settings.max_depth {
            return Err(ImportFailure::new(
                codes::DEPTH_LIMIT,
                format!("import depth limit of {} reached", settings.max_depth),
            ));
        }
        if self.seen.len() >= settings.max_files {
            return Err(ImportFailure::new(
                codes::FILE_LIMIT,
                format!("bundle limit of {} files reached", settings.max_files),
            ));
        }
        Ok(())
    }

    /// Provided sources first, then the file system, then the network.
    async fn load(&self, location: &Location) -> Result<(String, Via), ImportFailure> {
        if let Some(content) = self.sources.get(&location.key) {
            return Ok((content.clone(), Via::Sources));
        }

        let fetcher = &self.inner.fetcher;
        if let Some(disk) = &location.disk {
            if fetcher.exists(disk).await {
                return Ok((fetcher.read_local(disk).await?, Via::Disk));
            }
        }

        let Some(url) = &location.url else {
            return Err(FetchError::NotFound {
                target: location.resolved_path().to_string(),
            }
            .into());
        };
        let content = fetcher.fetch_remote(url).await?;
        if let Some(disk) = &location.disk {
            if let Err(e) = fetcher.write_local(disk, &content).await {
                warn!(path = %disk, error = %e, "Failed to persist fetched content");
            }
        }
        Ok((content, Via::Remote))
    }

    fn record(&self, visit: &Visit, raw: &str, resolved: &str) {
        self.inner
            .index
            .record_resolution(self.ticket, visit.index_key(), raw, resolved);
    }
}

/// Read the workspace package.json and lock files. Unreadable inputs are
/// logged and ignored.
async fn workspace_inputs(
    fetcher: &ContentFetcher,
) -> (Option<Arc<PackageManifest>>, LockedVersions) {
    let workspace = match read_optional(fetcher, "package.json").await {
        Some(text) => match PackageManifest::parse(&text) {
            Ok(manifest) => Some(Arc::new(manifest)),
            Err(e) => {
                warn!(error = %e, "Ignoring workspace package.json");
                None
            }
        },
        None => None,
    };

    let mut locked = LockedVersions::default();
    if let Some(text) = read_optional(fetcher, NPM_LOCKFILE).await {
        match LockedVersions::from_package_lock(&text) {
            Ok(versions) => locked.merge(versions),
            Err(e) => warn!(file = NPM_LOCKFILE, error = %e, "Ignoring lock file"),
        }
    }
    if let Some(text) = read_optional(fetcher, YARN_LOCKFILE).await {
        locked.merge(LockedVersions::from_yarn_lock(&text));
    }

    (workspace, locked)
}

async fn read_optional(fetcher: &ContentFetcher, path: &str) -> Option<String> {
    if !fetcher.exists(path).await {
        return None;
    }
    match fetcher.read_local(path).await {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(path, error = %e, "Failed to read workspace file");
            None
        }
    }
}

/// Bundle key of a relative import.
fn join_import(importer: &str, raw: &str) -> String {
    if is_url(importer) {
        if let Some(joined) = join_url(importer, raw) {
            return joined;
        }
    }
    paths::join(paths::dirname(importer), raw)
}

fn join_url(base: &str, relative: &str) -> Option<String> {
    let base = url::Url::parse(base).ok()?;
    base.join(relative).ok().map(String::from)
}

/// Replace quoted import paths.
fn rewrite_imports(content: &str, rewrites: &[(String, String)]) -> String {
    let mut out = content.to_string();
    for (from, to) in rewrites {
        for quote in ['"', '\''] {
            out = out.replace(&format!("{quote}{from}{quote}"), &format!("{quote}{to}{quote}"));
        }
    }
    out
}
