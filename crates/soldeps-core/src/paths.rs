//! Workspace path conventions.
//!
//! All resolver paths are workspace-relative strings with `/` separators,
//! independent of the host platform.

use std::path::{Path, PathBuf};

/// Root of every persisted external dependency.
pub const DEPS_DIR: &str = ".deps";

/// Root of persisted npm packages.
pub const NPM_DEPS_DIR: &str = ".deps/npm";

/// Fixed location of the persisted resolution index.
pub const RESOLUTION_INDEX_PATH: &str = ".deps/npm/.resolution-index.json";

/// Find the workspace root by walking up from `cwd`.
///
/// Returns the first directory containing `soldeps.json`, `package.json` or `.git`.
#[must_use]
pub fn workspace_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(crate::config::SETTINGS_FILE).exists()
            || current.join("package.json").exists()
            || current.join(".git").exists()
        {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Directory part of a workspace path (`""` for top-level files).
#[must_use]
pub fn dirname(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

/// Collapse `.`, `..` and empty segments.
///
/// Leading `..` segments that climb above the workspace root are dropped, as
/// the workspace root is the top of the virtual file system.
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Resolve `relative` against the directory `base_dir`.
#[must_use]
pub fn join(base_dir: &str, relative: &str) -> String {
    if base_dir.is_empty() {
        normalize(relative)
    } else {
        normalize(&format!("{base_dir}/{relative}"))
    }
}

/// Resolve `relative` against `base_dir`, or `None` if it climbs above the
/// workspace root.
#[must_use]
pub fn join_checked(base_dir: &str, relative: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in base_dir.split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Directory a persisted dependency file belongs to, which its relative
/// imports may not leave:
/// - `.deps/npm/{pkg}@{version}` (scoped names included)
/// - `.deps/github/{owner}/{repo}@{ref}`
/// - `.deps/{kind}/{host or hash}` otherwise
///
/// `None` for workspace files.
#[must_use]
pub fn deps_root(path: &str) -> Option<String> {
    let rest = path.strip_prefix(DEPS_DIR)?.strip_prefix('/')?;
    let segments: Vec<&str> = rest.split('/').collect();
    let depth = match segments.as_slice() {
        ["github", ..] => 3,
        ["npm", scope, ..] if scope.starts_with('@') => 3,
        _ => 2,
    };
    let depth = depth.min(segments.len().saturating_sub(1));
    if depth == 0 {
        return Some(DEPS_DIR.to_string());
    }
    Some(format!("{DEPS_DIR}/{}", segments[..depth].join("/")))
}

/// Resolve a relative import of the file at `importer`, keeping persisted
/// dependencies inside their [`deps_root`].
#[must_use]
pub fn join_confined(importer: &str, relative: &str) -> Option<String> {
    let joined = join_checked(dirname(importer), relative)?;
    match deps_root(importer) {
        Some(root) if !joined.starts_with(&format!("{root}/")) => None,
        _ => Some(joined),
    }
}

/// Whether an import is written relative to its importer.
#[must_use]
pub fn is_relative(import: &str) -> bool {
    import.starts_with("./") || import.starts_with("../")
}

/// On-disk directory for one version of an npm package.
#[must_use]
pub fn npm_package_dir(name: &str, version: &str) -> String {
    format!("{NPM_DEPS_DIR}/{name}@{version}")
}

/// On-disk location for a canonical npm path (`{pkg}@{version}/{rest}`).
#[must_use]
pub fn npm_file_path(npm_path: &str) -> String {
    format!("{NPM_DEPS_DIR}/{}", normalize(npm_path))
}

/// On-disk location for a canonical non-npm path (`github/...`, `ipfs/...`, ...).
#[must_use]
pub fn deps_file_path(canonical: &str) -> String {
    format!("{DEPS_DIR}/{}", normalize(canonical))
}

/// Convert a workspace path to a host path under `root`.
#[must_use]
pub fn to_host_path(root: &Path, path: &str) -> PathBuf {
    let mut host = root.to_path_buf();
    for segment in normalize(path).split('/').filter(|s| !s.is_empty()) {
        host.push(segment);
    }
    host
}
