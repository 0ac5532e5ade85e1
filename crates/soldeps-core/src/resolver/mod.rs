//! Dependency resolver.
//!
//! Walks the import graph of a compilation target and produces a flat source
//! bundle, recording every resolution in the workspace [`ResolutionIndex`].
//!
//! Each call to [`DependencyResolver::build_dependency_tree`] runs a fresh pass
//! with its own [`DependencyStore`](crate::pkg::DependencyStore). Concurrent
//! calls for the same target and sources share one in-flight pass.

mod pass;
pub mod tree;

pub use tree::{
    codes as diagnostic_codes, BundleEntry, DependencyTree, ImportDiagnostic, PassStats,
    TreeSummary,
};

use crate::config::ResolverSettings;
use crate::error::{Error, ResolveError};
use crate::fetch::{ContentFetcher, FetchError, HttpFetcher, LocalFs, Terminal, TracingTerminal};
use crate::handlers::ImportHandlerRegistry;
use crate::index::ResolutionIndex;
use crate::paths;
use crate::pkg::{ConflictChecker, PackageRegistry, RegistryClient};
use futures::future::{BoxFuture, FutureExt, Shared};
use pass::Pass;
use soldeps_util::hash::blake3_pairs;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type PassResult = Result<Arc<DependencyTree>, ResolveError>;
type SharedPass = Shared<BoxFuture<'static, PassResult>>;

pub(crate) struct ResolverInner {
    pub(crate) fetcher: ContentFetcher,
    pub(crate) registry: Arc<dyn PackageRegistry>,
    pub(crate) index: Arc<ResolutionIndex>,
    pub(crate) handlers: Arc<ImportHandlerRegistry>,
    pub(crate) conflicts: ConflictChecker,
    pub(crate) terminal: Arc<dyn Terminal>,
    pub(crate) settings: ResolverSettings,
    in_flight: Mutex<HashMap<String, SharedPass>>,
}

/// Import graph resolver for one workspace.
///
/// Cheap to clone; clones share the index, handlers and in-flight passes.
#[derive(Clone)]
pub struct DependencyResolver {
    inner: Arc<ResolverInner>,
}

/// Builder for [`DependencyResolver`].
pub struct ResolverBuilder {
    fetcher: ContentFetcher,
    registry: Arc<dyn PackageRegistry>,
    settings: ResolverSettings,
    index: Option<Arc<ResolutionIndex>>,
    handlers: Option<Arc<ImportHandlerRegistry>>,
    terminal: Option<Arc<dyn Terminal>>,
}

impl ResolverBuilder {
    #[must_use]
    pub fn settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share an index with other components, e.g. a file watcher.
    #[must_use]
    pub fn index(mut self, index: Arc<ResolutionIndex>) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn handlers(mut self, handlers: Arc<ImportHandlerRegistry>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    #[must_use]
    pub fn terminal(mut self, terminal: Arc<dyn Terminal>) -> Self {
        self.terminal = Some(terminal);
        self
    }

    #[must_use]
    pub fn build(self) -> DependencyResolver {
        let index = self
            .index
            .unwrap_or_else(|| Arc::new(ResolutionIndex::new(Arc::clone(self.fetcher.fs()))));
        let handlers = self.handlers.unwrap_or_else(|| {
            Arc::new(if self.settings.builtin_handlers {
                ImportHandlerRegistry::with_builtins()
            } else {
                ImportHandlerRegistry::new()
            })
        });
        let terminal = self
            .terminal
            .unwrap_or_else(|| Arc::new(TracingTerminal) as Arc<dyn Terminal>);

        DependencyResolver {
            inner: Arc::new(ResolverInner {
                fetcher: self.fetcher,
                registry: self.registry,
                index,
                handlers,
                conflicts: ConflictChecker::new(Arc::clone(&terminal)),
                terminal,
                settings: self.settings,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl DependencyResolver {
    #[must_use]
    pub fn builder(fetcher: ContentFetcher, registry: Arc<dyn PackageRegistry>) -> ResolverBuilder {
        ResolverBuilder {
            fetcher,
            registry,
            settings: ResolverSettings::default(),
            index: None,
            handlers: None,
            terminal: None,
        }
    }

    /// Resolver over the workspace at `root`, using the real file system, HTTP
    /// and the configured npm registry.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be created or the registry
    /// URL is invalid.
    pub fn for_workspace(root: &Path, settings: ResolverSettings) -> Result<Self, Error> {
        let fs = Arc::new(LocalFs::new(root.to_path_buf()));
        let remote = Arc::new(HttpFetcher::new(&settings).map_err(|e| Error::other(e.to_string()))?);
        let registry = Arc::new(
            RegistryClient::new(&settings.registry_url).map_err(|e| Error::other(e.to_string()))?,
        );
        Ok(Self::builder(ContentFetcher::new(fs, remote), registry)
            .settings(settings)
            .build())
    }

    #[must_use]
    pub fn index(&self) -> &Arc<ResolutionIndex> {
        &self.inner.index
    }

    #[must_use]
    pub fn handlers(&self) -> &Arc<ImportHandlerRegistry> {
        &self.inner.handlers
    }

    #[must_use]
    pub fn fetcher(&self) -> &ContentFetcher {
        &self.inner.fetcher
    }

    #[must_use]
    pub fn settings(&self) -> &ResolverSettings {
        &self.inner.settings
    }

    /// Resolve `target` as stored in the workspace.
    ///
    /// # Errors
    /// Returns an error only for failures of the whole pass; unresolved
    /// imports are reported in [`DependencyTree::diagnostics`].
    pub async fn build_dependency_tree(&self, target: &str) -> PassResult {
        self.build_dependency_tree_with_sources(target, BTreeMap::new())
            .await
    }

    /// Resolve `target`, preferring `sources` over the workspace for any path
    /// they contain (e.g. unsaved editor buffers).
    ///
    /// # Errors
    /// Returns an error only for failures of the whole pass.
    pub async fn build_dependency_tree_with_sources(
        &self,
        target: &str,
        sources: BTreeMap<String, String>,
    ) -> PassResult {
        let target = paths::normalize(target);

        if !self.inner.settings.share_in_flight {
            return self.run_pass(target, sources).await;
        }

        let key = format!(
            "{target}#{}",
            blake3_pairs(sources.iter().map(|(p, c)| (p.as_str(), c.as_str())))
        );

        let shared = {
            let mut in_flight = self.in_flight();
            if let Some(existing) = in_flight.get(&key) {
                debug!(entry = %target, "Joining in-flight resolution");
                existing.clone()
            } else {
                let this = self.clone();
                let future = async move { this.run_pass(target, sources).await }
                    .boxed()
                    .shared();
                in_flight.insert(key.clone(), future.clone());
                future
            }
        };

        let result = shared.clone().await;

        let mut in_flight = self.in_flight();
        if in_flight.get(&key).is_some_and(|current| current.ptr_eq(&shared)) {
            in_flight.remove(&key);
        }
        result
    }

    /// Whether a pass for `target` is currently running.
    #[must_use]
    pub fn is_building(&self, target: &str) -> bool {
        let prefix = format!("{}#", paths::normalize(target));
        self.in_flight().keys().any(|key| key.starts_with(&prefix))
    }

    /// Persist the resolution index if it has unsaved changes.
    ///
    /// # Errors
    /// Returns an error if the index file cannot be written; the index stays
    /// dirty for the next attempt.
    pub async fn save_resolution_index(&self) -> Result<bool, FetchError> {
        self.inner.index.save().await
    }

    async fn run_pass(&self, target: String, sources: BTreeMap<String, String>) -> PassResult {
        let pass = Pass::start(&self.inner, target, &sources).await?;
        pass.run().await.map(Arc::new)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, SharedPass>> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
