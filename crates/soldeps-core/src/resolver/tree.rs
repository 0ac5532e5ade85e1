//! Result of one resolution pass.

use crate::compiler::CompilerInput;
use crate::pkg::{Conflict, DependencyStore, RejectedVersion};
use serde::Serialize;
use soldeps_util::hash::blake3_pairs;
use std::collections::BTreeMap;

/// Diagnostic codes recorded against single imports.
pub mod codes {
    pub const IMPORT_UNRESOLVED: &str = "IMPORT_UNRESOLVED";
    pub const DEPTH_LIMIT: &str = "RESOLVE_DEPTH_LIMIT";
    pub const FILE_LIMIT: &str = "RESOLVE_FILE_LIMIT";
    pub const OUTSIDE_ROOT: &str = "IMPORT_OUTSIDE_ROOT";
}

/// An import that could not be resolved.
///
/// The pass continues past it; the compiler reports the missing source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDiagnostic {
    /// Bundle path of the importing file.
    pub importer: String,
    /// The import as written.
    pub import: String,
    /// 1-based line of the import statement.
    pub line: u32,
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ImportDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: cannot resolve \"{}\": {} ({})",
            self.importer, self.line, self.import, self.message, self.code
        )
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassStats {
    /// Files whose imports were scanned.
    pub files_scanned: usize,
    /// Files fetched over the network.
    pub fetched_remote: usize,
    /// Files read from the workspace or `.deps/`.
    pub from_disk: usize,
    /// Files found through the resolution index.
    pub from_index: usize,
    /// Imports answered by a handler.
    pub handler_hits: usize,
    /// Packuments requested from the registry.
    pub registry_lookups: usize,
}

/// Dependency tree of one compilation target.
#[derive(Debug, Clone)]
pub struct DependencyTree {
    target: String,
    store: DependencyStore,
    diagnostics: Vec<ImportDiagnostic>,
    conflicts: Vec<Conflict>,
    stats: PassStats,
    fingerprint: String,
}

impl DependencyTree {
    pub(crate) fn new(
        target: String,
        store: DependencyStore,
        diagnostics: Vec<ImportDiagnostic>,
        conflicts: Vec<Conflict>,
        stats: PassStats,
    ) -> Self {
        let fingerprint = blake3_pairs(
            store
                .files()
                .iter()
                .map(|(path, file)| (path.as_str(), file.content.as_str())),
        );
        Self {
            target,
            store,
            diagnostics,
            conflicts,
            stats,
            fingerprint,
        }
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn store(&self) -> &DependencyStore {
        &self.store
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[ImportDiagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    #[must_use]
    pub fn rejected(&self) -> &[RejectedVersion] {
        self.store.rejected()
    }

    #[must_use]
    pub fn stats(&self) -> PassStats {
        self.stats
    }

    /// BLAKE3 over every `(path, content)` in the bundle.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Whether every import resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.store.file_count()
    }

    /// The source bundle as `path -> content`.
    #[must_use]
    pub fn sources(&self) -> BTreeMap<String, String> {
        self.store
            .files()
            .iter()
            .map(|(path, file)| (path.clone(), file.content.clone()))
            .collect()
    }

    #[must_use]
    pub fn to_compiler_input(&self) -> CompilerInput {
        let mut input = CompilerInput::new(self.target.clone());
        for (path, file) in self.store.files() {
            input.insert(path.clone(), file.content.clone());
        }
        input
    }

    /// Serialisable overview for reports.
    #[must_use]
    pub fn summary(&self) -> TreeSummary {
        TreeSummary {
            target: self.target.clone(),
            fingerprint: self.fingerprint.clone(),
            files: self
                .store
                .files()
                .values()
                .map(|file| BundleEntry {
                    path: file.path.clone(),
                    package: file.source_package.clone(),
                    version: file.version.clone(),
                    bytes: file.content.len(),
                })
                .collect(),
            packages: self
                .store
                .packages()
                .iter()
                .map(|(name, entry)| (name.clone(), entry.version.clone()))
                .collect(),
            diagnostics: self.diagnostics.clone(),
            conflicts: self.conflicts.clone(),
            stats: self.stats,
        }
    }
}

/// One file in a [`TreeSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub bytes: usize,
}

/// Serialisable view of a [`DependencyTree`].
#[derive(Debug, Clone, Serialize)]
pub struct TreeSummary {
    pub target: String,
    pub fingerprint: String,
    pub files: Vec<BundleEntry>,
    pub packages: BTreeMap<String, String>,
    pub diagnostics: Vec<ImportDiagnostic>,
    pub conflicts: Vec<Conflict>,
    pub stats: PassStats,
}
