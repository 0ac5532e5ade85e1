//! Persistent resolution index.
//!
//! Maps `source file -> (import as written -> resolved workspace path)` and is
//! stored as pretty-printed JSON at [`RESOLUTION_INDEX_PATH`]. Editors use it to
//! jump from an import to the file that was actually compiled; the resolver
//! uses it to find previously persisted content.
//!
//! ## Lifecycle
//!
//! `Unloaded -> Loading -> Loaded`. Deleting the index file on disk moves the
//! index back to `Unloaded`; writes recorded but not yet saved survive the
//! deletion and any reload.

pub mod watch;

pub use watch::{IndexWatcher, WatchError};

use crate::error::ResolveError;
use crate::fetch::{FetchError, FileSystem};
use crate::normalize::{github_alias_for, github_alias_to_raw_url, is_url, normalize_github_blob_url};
use crate::paths::{self, RESOLUTION_INDEX_PATH};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// `source file -> (import -> resolved path)`.
pub type IndexData = BTreeMap<String, BTreeMap<String, String>>;

/// Load state of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Unloaded,
    Loading,
    Loaded,
}

/// External change affecting the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEvent {
    /// The host switched workspace. In-flight passes are abandoned.
    WorkspaceSwitched,
    /// The index file was created or rewritten on disk.
    IndexFileChanged,
    /// The index file was removed from disk.
    IndexFileDeleted,
}

/// Identifies the session a resolution pass started in.
///
/// Writes carrying a ticket from before the last workspace switch are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassTicket {
    epoch: u64,
}

#[derive(Debug)]
struct IndexInner {
    state: IndexState,
    data: IndexData,
    /// Recorded since the last successful save.
    pending: IndexData,
    dirty: bool,
    generation: u64,
}

/// Workspace-wide resolution index.
pub struct ResolutionIndex {
    fs: Arc<dyn FileSystem>,
    path: String,
    inner: Mutex<IndexInner>,
    load_lock: tokio::sync::Mutex<()>,
    save_lock: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
}

impl ResolutionIndex {
    /// Index stored at the standard location.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_path(fs, RESOLUTION_INDEX_PATH)
    }

    #[must_use]
    pub fn with_path(fs: Arc<dyn FileSystem>, path: impl Into<String>) -> Self {
        Self {
            fs,
            path: path.into(),
            inner: Mutex::new(IndexInner {
                state: IndexState::Unloaded,
                data: IndexData::new(),
                pending: IndexData::new(),
                dirty: false,
                generation: 0,
            }),
            load_lock: tokio::sync::Mutex::new(()),
            save_lock: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    fn inner(&self) -> MutexGuard<'_, IndexInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn state(&self) -> IndexState {
        self.inner().state
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner().dirty
    }

    /// Copy of the in-memory mappings.
    #[must_use]
    pub fn entries(&self) -> IndexData {
        self.inner().data.clone()
    }

    /// Start a resolution pass in the current session.
    #[must_use]
    pub fn begin_pass(&self) -> PassTicket {
        PassTicket {
            epoch: self.epoch.load(Ordering::SeqCst),
        }
    }

    /// Whether `ticket` still belongs to the current session.
    #[must_use]
    pub fn is_current(&self, ticket: PassTicket) -> bool {
        ticket.epoch == self.epoch.load(Ordering::SeqCst)
    }

    /// Load the index from disk if not loaded yet.
    ///
    /// Concurrent callers wait on one load. A missing file is an empty index.
    ///
    /// # Errors
    /// Returns [`ResolveError::IndexCorrupt`] if the file is not a valid index.
    pub async fn load(&self) -> Result<(), ResolveError> {
        if self.state() == IndexState::Loaded {
            return Ok(());
        }

        let _guard = self.load_lock.lock().await;
        if self.state() == IndexState::Loaded {
            return Ok(());
        }

        self.inner().state = IndexState::Loading;
        let result = self.read_from_disk().await;

        let mut inner = self.inner();
        match result {
            Ok(mut data) => {
                merge_into(&mut data, &inner.pending);
                debug!(path = %self.path, files = data.len(), "Resolution index loaded");
                inner.data = data;
                inner.state = IndexState::Loaded;
                Ok(())
            }
            Err(e) => {
                inner.state = IndexState::Unloaded;
                Err(e)
            }
        }
    }

    async fn read_from_disk(&self) -> Result<IndexData, ResolveError> {
        let content = match self.fs.read_file(&self.path).await {
            Ok(content) => content,
            Err(FetchError::NotFound { .. }) => return Ok(IndexData::new()),
            Err(e) => {
                return Err(ResolveError::IndexCorrupt {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(IndexData::new());
        }

        serde_json::from_str(&content).map_err(|e| ResolveError::IndexCorrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Record that `original_import` in `source_file` resolved to `resolved_path`.
    ///
    /// Identity mappings, unchanged mappings and writes from an abandoned
    /// session are ignored. Returns whether the index changed.
    pub fn record_resolution(
        &self,
        ticket: PassTicket,
        source_file: &str,
        original_import: &str,
        resolved_path: &str,
    ) -> bool {
        if original_import == resolved_path {
            return false;
        }
        if !self.is_current(ticket) {
            debug!(source_file, original_import, "Dropping write from abandoned pass");
            return false;
        }

        let mut guard = self.inner();
        let inner = &mut *guard;
        let unchanged = inner
            .data
            .get(source_file)
            .and_then(|imports| imports.get(original_import))
            .is_some_and(|existing| existing == resolved_path);
        if unchanged {
            return false;
        }

        for map in [&mut inner.data, &mut inner.pending] {
            map.entry(source_file.to_string())
                .or_default()
                .insert(original_import.to_string(), resolved_path.to_string());
        }
        inner.dirty = true;
        inner.generation += 1;
        true
    }

    /// Look up where `import_path` in `source_file` resolved to.
    ///
    /// Candidates are the import itself plus its GitHub alias and raw URL
    /// forms. Tiers, first local hit wins:
    /// 1. exact `(source_file, candidate)` entry
    /// 2. any file's entry for a candidate
    /// 3. a stored path whose GitHub-alias form ends with a candidate
    ///
    /// The last tier can pick the wrong version when two versions of a
    /// repository share a path suffix; entries are scanned in file order.
    #[must_use]
    pub fn resolve_import_from_index(&self, source_file: &str, import_path: &str) -> Option<String> {
        let candidates = candidates(import_path);
        let inner = self.inner();

        if let Some(imports) = inner.data.get(source_file) {
            for candidate in &candidates {
                if let Some(hit) = imports.get(candidate).filter(|p| is_local(p)) {
                    return Some(hit.clone());
                }
            }
        }

        for imports in inner.data.values() {
            for candidate in &candidates {
                if let Some(hit) = imports.get(candidate).filter(|p| is_local(p)) {
                    return Some(hit.clone());
                }
            }
        }

        let suffixes: Vec<&String> = candidates.iter().filter(|c| c.contains('/')).collect();
        for imports in inner.data.values() {
            for stored in imports.values().filter(|p| is_local(p)) {
                let alias = stored
                    .strip_prefix(paths::DEPS_DIR)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .unwrap_or(stored);
                if !alias.starts_with("github/") {
                    continue;
                }
                let matched = suffixes
                    .iter()
                    .any(|s| alias == s.as_str() || alias.ends_with(&format!("/{s}")));
                if matched {
                    return Some(stored.clone());
                }
            }
        }

        None
    }

    /// Load if needed, then look up.
    ///
    /// # Errors
    /// Returns an error if the index cannot be loaded.
    pub async fn lookup(
        &self,
        source_file: &str,
        import_path: &str,
    ) -> Result<Option<String>, ResolveError> {
        self.load().await?;
        Ok(self.resolve_import_from_index(source_file, import_path))
    }

    /// Write the index to disk if it has unsaved changes.
    ///
    /// Saves are serialised. The dirty flag is cleared only when no write was
    /// recorded while the file was being written. On failure the index stays
    /// dirty so the next save retries.
    ///
    /// Returns whether the file was written.
    pub async fn save(&self) -> Result<bool, FetchError> {
        let _guard = self.save_lock.lock().await;

        let (json, generation) = {
            let inner = self.inner();
            if !inner.dirty {
                return Ok(false);
            }
            let json = serde_json::to_string_pretty(&inner.data).map_err(|e| FetchError::Io {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
            (json, inner.generation)
        };

        let result = async {
            let dir = paths::dirname(&self.path);
            if !dir.is_empty() {
                self.fs.mkdir(dir).await?;
            }
            self.fs.write_file(&self.path, &json).await
        }
        .await;

        match result {
            Ok(()) => {
                let mut inner = self.inner();
                if inner.generation == generation {
                    inner.dirty = false;
                    inner.pending.clear();
                }
                debug!(path = %self.path, "Resolution index saved");
                Ok(true)
            }
            Err(e) => {
                warn!(path = %self.path, error = %e, "Failed to save resolution index");
                Err(e)
            }
        }
    }

    /// React to a change outside the resolver.
    ///
    /// # Errors
    /// Returns an error if a reload finds a corrupt index file.
    pub async fn handle_event(&self, event: IndexEvent) -> Result<(), ResolveError> {
        match event {
            IndexEvent::WorkspaceSwitched => {
                let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                {
                    let mut inner = self.inner();
                    if inner.dirty {
                        debug!(path = %self.path, "Discarding unsaved writes of previous workspace");
                    }
                    inner.pending.clear();
                    inner.dirty = false;
                    inner.generation += 1;
                    inner.data.clear();
                    inner.state = IndexState::Unloaded;
                }
                info!(epoch, "Workspace switched, reloading resolution index");
                self.load().await
            }
            IndexEvent::IndexFileChanged => {
                self.inner().state = IndexState::Unloaded;
                self.load().await
            }
            IndexEvent::IndexFileDeleted => {
                let mut inner = self.inner();
                inner.data = inner.pending.clone();
                inner.dirty = !inner.pending.is_empty();
                inner.state = IndexState::Unloaded;
                debug!(path = %self.path, "Resolution index file deleted");
                Ok(())
            }
        }
    }
}

fn merge_into(target: &mut IndexData, pending: &IndexData) {
    for (file, imports) in pending {
        let entry = target.entry(file.clone()).or_default();
        for (import, resolved) in imports {
            entry.insert(import.clone(), resolved.clone());
        }
    }
}

fn candidates(import_path: &str) -> Vec<String> {
    let mut out = vec![import_path.to_string()];
    let mut push = |candidate: Option<String>| {
        if let Some(candidate) = candidate {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
    };
    push(github_alias_for(import_path));
    push(normalize_github_blob_url(import_path));
    push(github_alias_to_raw_url(import_path));
    out
}

/// A workspace path, as opposed to a URL or a bare GitHub alias.
fn is_local(path: &str) -> bool {
    !is_url(path) && !path.starts_with("github/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFs;

    const BLOB: &str = "https://github.com/OpenZeppelin/openzeppelin-contracts/blob/v5.0.2/contracts/access/Ownable.sol";
    const RAW: &str = "https://raw.githubusercontent.com/OpenZeppelin/openzeppelin-contracts/v5.0.2/contracts/access/Ownable.sol";
    const SAVED: &str =
        ".deps/github/OpenZeppelin/openzeppelin-contracts@v5.0.2/contracts/access/Ownable.sol";

    fn index_with(files: &[(&str, &str)]) -> (Arc<MemoryFs>, ResolutionIndex) {
        let fs = Arc::new(MemoryFs::with_files(files.iter().copied()));
        let index = ResolutionIndex::new(fs.clone());
        (fs, index)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let (_fs, index) = index_with(&[]);
        assert_eq!(index.state(), IndexState::Unloaded);
        index.load().await.unwrap();
        assert_eq!(index.state(), IndexState::Loaded);
        assert!(index.entries().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let (_fs, index) = index_with(&[(RESOLUTION_INDEX_PATH, "{ not json")]);
        let err = index.load().await.unwrap_err();
        assert!(matches!(err, ResolveError::IndexCorrupt { .. }));
        assert_eq!(index.state(), IndexState::Unloaded);
    }

    #[tokio::test]
    async fn test_concurrent_loads() {
        let (_fs, index) = index_with(&[(
            RESOLUTION_INDEX_PATH,
            r#"{ "contracts/A.sol": { "solmate/src/auth/Owned.sol": ".deps/npm/solmate@6.2.0/src/auth/Owned.sol" } }"#,
        )]);
        let index = Arc::new(index);
        let (a, b) = tokio::join!(index.load(), index.load());
        a.unwrap();
        b.unwrap();
        assert_eq!(index.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_record_skips_identity_and_unchanged() {
        let (_fs, index) = index_with(&[]);
        index.load().await.unwrap();
        let ticket = index.begin_pass();

        assert!(!index.record_resolution(ticket, "A.sol", "./B.sol", "./B.sol"));
        assert!(!index.is_dirty());

        assert!(index.record_resolution(ticket, "A.sol", "./B.sol", "B.sol"));
        assert!(index.is_dirty());
        index.save().await.unwrap();
        assert!(!index.is_dirty());

        assert!(!index.record_resolution(ticket, "A.sol", "./B.sol", "B.sol"));
        assert!(!index.is_dirty());
    }

    #[tokio::test]
    async fn test_save_writes_pretty_json() {
        let (fs, index) = index_with(&[]);
        index.load().await.unwrap();
        assert!(!index.save().await.unwrap());

        index.record_resolution(index.begin_pass(), "contracts/A.sol", BLOB, SAVED);
        assert!(index.save().await.unwrap());

        let written = fs.read_file(RESOLUTION_INDEX_PATH).await.unwrap();
        assert!(written.contains("\n  \"contracts/A.sol\": {\n    \""));
        let parsed: IndexData = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["contracts/A.sol"][BLOB], SAVED);
    }

    #[tokio::test]
    async fn test_lookup_tiers() {
        let (_fs, index) = index_with(&[]);
        index.load().await.unwrap();
        let ticket = index.begin_pass();
        index.record_resolution(ticket, "contracts/A.sol", BLOB, SAVED);
        index.record_resolution(ticket, "contracts/A.sol", "hardhat/console.sol", "https://example.com/console.sol");

        // Exact.
        assert_eq!(index.resolve_import_from_index("contracts/A.sol", BLOB).as_deref(), Some(SAVED));
        // Entry recorded for another file.
        assert_eq!(index.resolve_import_from_index("contracts/B.sol", BLOB).as_deref(), Some(SAVED));
        // Suffix of the stored alias form.
        assert_eq!(index.resolve_import_from_index("contracts/B.sol", RAW).as_deref(), Some(SAVED));
        assert_eq!(
            index
                .resolve_import_from_index("contracts/B.sol", "openzeppelin-contracts@v5.0.2/contracts/access/Ownable.sol")
                .as_deref(),
            Some(SAVED)
        );
        // URL values are never returned.
        assert_eq!(index.resolve_import_from_index("contracts/A.sol", "hardhat/console.sol"), None);
        assert_eq!(index.resolve_import_from_index("contracts/A.sol", "./Missing.sol"), None);
    }

    #[tokio::test]
    async fn test_ambiguous_suffix_takes_first_in_file_order() {
        let (_fs, index) = index_with(&[]);
        index.load().await.unwrap();
        let ticket = index.begin_pass();
        index.record_resolution(
            ticket,
            "contracts/Old.sol",
            "https://github.com/acme/lib/blob/v1.0.0/src/Math.sol",
            ".deps/github/acme/lib@v1.0.0/src/Math.sol",
        );
        index.record_resolution(
            ticket,
            "contracts/New.sol",
            "https://github.com/acme/lib/blob/v2.0.0/src/Math.sol",
            ".deps/github/acme/lib@v2.0.0/src/Math.sol",
        );

        // Both stored paths end with `src/Math.sol`; the first file wins.
        assert_eq!(
            index.resolve_import_from_index("contracts/Other.sol", "src/Math.sol").as_deref(),
            Some(".deps/github/acme/lib@v2.0.0/src/Math.sol")
        );
        // A version-qualified suffix disambiguates.
        assert_eq!(
            index.resolve_import_from_index("contracts/Other.sol", "lib@v1.0.0/src/Math.sol").as_deref(),
            Some(".deps/github/acme/lib@v1.0.0/src/Math.sol")
        );
    }

    #[tokio::test]
    async fn test_deleted_file_keeps_pending_writes() {
        let (fs, index) = index_with(&[(
            RESOLUTION_INDEX_PATH,
            r#"{ "A.sol": { "x/Old.sol": ".deps/npm/x@1.0.0/Old.sol" } }"#,
        )]);
        index.load().await.unwrap();
        index.record_resolution(index.begin_pass(), "A.sol", "x/New.sol", ".deps/npm/x@1.0.0/New.sol");

        fs.remove_file(RESOLUTION_INDEX_PATH).await.unwrap();
        index.handle_event(IndexEvent::IndexFileDeleted).await.unwrap();
        assert_eq!(index.state(), IndexState::Unloaded);

        let entries = index.entries();
        assert_eq!(entries["A.sol"].len(), 1);
        assert!(entries["A.sol"].contains_key("x/New.sol"));
        assert!(index.is_dirty());

        index.load().await.unwrap();
        assert!(index.entries()["A.sol"].contains_key("x/New.sol"));
        assert!(index.save().await.unwrap());
        assert!(fs.exists(RESOLUTION_INDEX_PATH).await);
    }

    #[tokio::test]
    async fn test_changed_file_reload_merges_pending() {
        let (fs, index) = index_with(&[]);
        index.load().await.unwrap();
        index.record_resolution(index.begin_pass(), "A.sol", "x/New.sol", ".deps/npm/x@1.0.0/New.sol");

        fs.write_file(
            RESOLUTION_INDEX_PATH,
            r#"{ "B.sol": { "y/Y.sol": ".deps/npm/y@2.0.0/Y.sol" } }"#,
        )
        .await
        .unwrap();
        index.handle_event(IndexEvent::IndexFileChanged).await.unwrap();

        let entries = index.entries();
        assert!(entries.contains_key("A.sol"));
        assert!(entries.contains_key("B.sol"));
    }

    #[tokio::test]
    async fn test_workspace_switch_abandons_old_tickets() {
        let (_fs, index) = index_with(&[]);
        index.load().await.unwrap();
        let old = index.begin_pass();

        index.handle_event(IndexEvent::WorkspaceSwitched).await.unwrap();
        assert!(!index.is_current(old));
        assert!(!index.record_resolution(old, "A.sol", "x/A.sol", ".deps/npm/x@1.0.0/A.sol"));
        assert!(index.entries().is_empty());

        let fresh = index.begin_pass();
        assert!(index.record_resolution(fresh, "A.sol", "x/A.sol", ".deps/npm/x@1.0.0/A.sol"));
    }

    #[tokio::test]
    async fn test_write_during_save_stays_dirty() {
        let (_fs, index) = index_with(&[]);
        index.load().await.unwrap();
        let ticket = index.begin_pass();
        index.record_resolution(ticket, "A.sol", "x/A.sol", ".deps/npm/x@1.0.0/A.sol");

        let index = Arc::new(index);
        let saver = {
            let index = Arc::clone(&index);
            tokio::spawn(async move { index.save().await })
        };
        index.record_resolution(ticket, "A.sol", "x/B.sol", ".deps/npm/x@1.0.0/B.sol");
        saver.await.unwrap().unwrap();

        // Whichever order the two ran in, the second mapping is either saved or pending.
        if index.is_dirty() {
            assert!(index.save().await.unwrap());
        }
        assert!(!index.is_dirty());
    }
}
