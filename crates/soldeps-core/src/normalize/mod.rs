//! External reference normalization.
//!
//! Converts the reference forms users write in Solidity imports (GitHub blob and
//! raw URLs, npm CDN URLs, `ipfs://`, `bzz-raw://`, `github/{owner}/{repo}@{ref}`
//! aliases) into canonical workspace paths. Everything here is pure string
//! matching; nothing touches the network or the file system.

use crate::pkg::spec::PackageImport;
use regex_lite::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Kind of reference an import string denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Local,
    Npm,
    Github,
    Ipfs,
    Swarm,
    Http,
}

impl RefKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Npm => "npm",
            Self::Github => "github",
            Self::Ipfs => "ipfs",
            Self::Swarm => "swarm",
            Self::Http => "http",
        }
    }

    /// Whether content for this kind lives outside the workspace.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified import reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedReference {
    pub kind: RefKind,
    /// Canonical path below `.deps/` (or below `.deps/npm/` for npm).
    pub canonical_path: String,
    /// The reference exactly as written.
    pub original_form: String,
    /// URL the content is fetched from, when it is known without version resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_url: Option<String>,
}

impl NormalizedReference {
    fn new(kind: RefKind, canonical_path: String, original: &str, fetch_url: Option<String>) -> Self {
        Self {
            kind,
            canonical_path,
            original_form: original.to_string(),
            fetch_url,
        }
    }
}

/// Result of normalizing a raw GitHub URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubTarget {
    /// `github/{owner}/{repo}@{ref}/{rest}`.
    pub target_path: String,
    /// `{owner}/{repo}@{ref}/{rest}`.
    pub normalized_path: String,
    pub raw_url: String,
}

/// Result of rewriting an npm CDN URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmCdnTarget {
    /// `{pkg}@{version}/{rest}`.
    pub npm_path: String,
    pub package: String,
    pub version: String,
}

/// Result of normalizing a content-addressed (`ipfs://`, `bzz-raw://`) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTarget {
    /// `ipfs/{hash}/{rest}` or `swarm/{hash}/{rest}`.
    pub target_path: String,
    pub hash: String,
    pub rest: String,
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("normalizer pattern is valid"))
}

fn blob_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^https?://github\.com/([^/]+)/([^/]+)/blob/([^/]+)/(.+)$")
}

fn raw_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^https?://raw\.githubusercontent\.com/([^/]+)/([^/]+)/([^/]+)/(.+)$")
}

fn cdn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^https?://(?:cdn\.jsdelivr\.net/npm|unpkg\.com)/(.+)$")
}

fn ipfs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^ipfs://(?:ipfs/)?([^/]+)/?(.*)$")
}

fn swarm_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^bzz-raw://([^/]+)/?(.*)$")
}

fn alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^github/([^/]+)/([^/@]+)@([^/]+)/(.+)$")
}

/// `https://github.com/{o}/{r}/blob/{ref}/{rest}` to its raw.githubusercontent URL.
#[must_use]
pub fn normalize_github_blob_url(url: &str) -> Option<String> {
    let caps = blob_re().captures(url)?;
    Some(format!(
        "https://raw.githubusercontent.com/{}/{}/{}/{}",
        &caps[1], &caps[2], &caps[3], &caps[4]
    ))
}

/// Raw GitHub URL to its `github/{o}/{r}@{ref}/{rest}` alias.
#[must_use]
pub fn normalize_raw_github_url(url: &str) -> Option<GithubTarget> {
    let caps = raw_re().captures(url)?;
    let normalized_path = format!("{}/{}@{}/{}", &caps[1], &caps[2], &caps[3], &caps[4]);
    Some(GithubTarget {
        target_path: format!("github/{normalized_path}"),
        normalized_path,
        raw_url: url.to_string(),
    })
}

/// Inverse of [`normalize_raw_github_url`].
#[must_use]
pub fn github_alias_to_raw_url(alias: &str) -> Option<String> {
    let caps = alias_re().captures(alias)?;
    Some(format!(
        "https://raw.githubusercontent.com/{}/{}/{}/{}",
        &caps[1], &caps[2], &caps[3], &caps[4]
    ))
}

/// Any GitHub URL form (blob or raw) to its alias.
#[must_use]
pub fn github_alias_for(url: &str) -> Option<String> {
    if let Some(raw) = normalize_github_blob_url(url) {
        return normalize_raw_github_url(&raw).map(|t| t.target_path);
    }
    normalize_raw_github_url(url).map(|t| t.target_path)
}

/// jsdelivr / unpkg URL of a versioned package file to its npm path.
#[must_use]
pub fn rewrite_npm_cdn_url(url: &str) -> Option<NpmCdnTarget> {
    let caps = cdn_re().captures(url)?;
    let import = PackageImport::parse(&caps[1]).ok()?;
    let version = import.version.clone()?;
    if import.subpath.is_empty() {
        return None;
    }
    Some(NpmCdnTarget {
        npm_path: import.versioned_path(&version),
        package: import.name,
        version,
    })
}

/// `ipfs://{hash}/{rest}` to `ipfs/{hash}/{rest}`.
#[must_use]
pub fn normalize_ipfs_url(url: &str) -> Option<ContentTarget> {
    let caps = ipfs_re().captures(url)?;
    Some(content_target("ipfs", &caps[1], &caps[2]))
}

/// `bzz-raw://{hash}/{rest}` to `swarm/{hash}/{rest}`.
#[must_use]
pub fn normalize_swarm_url(url: &str) -> Option<ContentTarget> {
    let caps = swarm_re().captures(url)?;
    Some(content_target("swarm", &caps[1], &caps[2]))
}

fn content_target(prefix: &str, hash: &str, rest: &str) -> ContentTarget {
    let target_path = if rest.is_empty() {
        format!("{prefix}/{hash}")
    } else {
        format!("{prefix}/{hash}/{rest}")
    };
    ContentTarget {
        target_path,
        hash: hash.to_string(),
        rest: rest.to_string(),
    }
}

/// Try every recognised external form in priority order.
///
/// Returns `None` when the reference is none of them; callers then treat it as
/// a workspace path or a bare package import (see [`classify`]).
#[must_use]
pub fn normalize(reference: &str) -> Option<NormalizedReference> {
    let reference = reference.trim();

    if let Some(raw) = normalize_github_blob_url(reference) {
        let target = normalize_raw_github_url(&raw)?;
        return Some(NormalizedReference::new(
            RefKind::Github,
            target.target_path,
            reference,
            Some(raw),
        ));
    }

    if let Some(target) = normalize_raw_github_url(reference) {
        return Some(NormalizedReference::new(
            RefKind::Github,
            target.target_path,
            reference,
            Some(target.raw_url),
        ));
    }

    if let Some(target) = rewrite_npm_cdn_url(reference) {
        return Some(NormalizedReference::new(
            RefKind::Npm,
            target.npm_path,
            reference,
            Some(reference.to_string()),
        ));
    }

    if let Some(target) = normalize_ipfs_url(reference) {
        return Some(NormalizedReference::new(
            RefKind::Ipfs,
            target.target_path,
            reference,
            Some(reference.to_string()),
        ));
    }

    if let Some(target) = normalize_swarm_url(reference) {
        return Some(NormalizedReference::new(
            RefKind::Swarm,
            target.target_path,
            reference,
            Some(reference.to_string()),
        ));
    }

    if let Some(raw) = github_alias_to_raw_url(reference) {
        return Some(NormalizedReference::new(
            RefKind::Github,
            reference.to_string(),
            reference,
            Some(raw),
        ));
    }

    None
}

/// Classify any reference, never failing.
///
/// Bare `name/path` forms are reported as npm; callers that can see the
/// workspace should check for a local file first.
#[must_use]
pub fn classify(reference: &str) -> NormalizedReference {
    if let Some(normalized) = normalize(reference) {
        return normalized;
    }

    let reference = reference.trim();
    if is_url(reference) {
        let canonical = match url::Url::parse(reference) {
            Ok(url) => format!(
                "http/{}{}",
                url.host_str().unwrap_or("unknown-host"),
                url.path()
            ),
            Err(_) => format!("http/{}", strip_scheme(reference)),
        };
        return NormalizedReference::new(
            RefKind::Http,
            canonical,
            reference,
            Some(reference.to_string()),
        );
    }

    if !crate::paths::is_relative(reference) && PackageImport::looks_like(reference) {
        return NormalizedReference::new(RefKind::Npm, reference.to_string(), reference, None);
    }

    NormalizedReference::new(
        RefKind::Local,
        crate::paths::normalize(reference),
        reference,
        None,
    )
}

/// Whether the reference carries a URL scheme the fetcher understands.
#[must_use]
pub fn is_url(reference: &str) -> bool {
    reference.starts_with("http://")
        || reference.starts_with("https://")
        || reference.starts_with("ipfs://")
        || reference.starts_with("bzz-raw://")
}

fn strip_scheme(reference: &str) -> &str {
    reference
        .split_once("://")
        .map_or(reference, |(_, rest)| rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOB: &str = "https://github.com/openzeppelin/openzeppelin-contracts/blob/v5.0.2/contracts/token/ERC20/ERC20.sol";
    const RAW: &str = "https://raw.githubusercontent.com/openzeppelin/openzeppelin-contracts/v5.0.2/contracts/token/ERC20/ERC20.sol";
    const ALIAS: &str =
        "github/openzeppelin/openzeppelin-contracts@v5.0.2/contracts/token/ERC20/ERC20.sol";

    #[test]
    fn test_github_round_trip() {
        let raw = normalize_github_blob_url(BLOB).unwrap();
        assert_eq!(raw, RAW);

        let target = normalize_raw_github_url(&raw).unwrap();
        assert_eq!(target.target_path, ALIAS);
        assert_eq!(
            target.normalized_path,
            "openzeppelin/openzeppelin-contracts@v5.0.2/contracts/token/ERC20/ERC20.sol"
        );

        assert_eq!(github_alias_to_raw_url(&target.target_path).unwrap(), RAW);
    }

    #[test]
    fn test_github_alias_for_any_form() {
        assert_eq!(github_alias_for(BLOB).as_deref(), Some(ALIAS));
        assert_eq!(github_alias_for(RAW).as_deref(), Some(ALIAS));
        assert_eq!(github_alias_for("./Token.sol"), None);
    }

    #[test]
    fn test_npm_cdn_rewrite() {
        let target = rewrite_npm_cdn_url(
            "https://cdn.jsdelivr.net/npm/@openzeppelin/contracts@5.0.2/token/ERC20/ERC20.sol",
        )
        .unwrap();
        assert_eq!(target.npm_path, "@openzeppelin/contracts@5.0.2/token/ERC20/ERC20.sol");
        assert_eq!(target.package, "@openzeppelin/contracts");
        assert_eq!(target.version, "5.0.2");
    }

    #[test]
    fn test_npm_cdn_requires_version() {
        assert!(rewrite_npm_cdn_url("https://cdn.jsdelivr.net/npm/solmate/src/tokens/ERC20.sol").is_none());
    }

    #[test]
    fn test_unpkg_rewrite() {
        let target = rewrite_npm_cdn_url("https://unpkg.com/solmate@6.2.0/src/tokens/ERC20.sol").unwrap();
        assert_eq!(target.npm_path, "solmate@6.2.0/src/tokens/ERC20.sol");
    }

    #[test]
    fn test_ipfs_and_swarm() {
        let ipfs = normalize_ipfs_url("ipfs://QmHash/path/file.sol").unwrap();
        assert!(ipfs.target_path.starts_with("ipfs/QmHash/"));
        assert_eq!(ipfs.rest, "path/file.sol");

        let swarm = normalize_swarm_url("bzz-raw://abcdef/path/file.sol").unwrap();
        assert!(swarm.target_path.starts_with("swarm/abcdef/"));
    }

    #[test]
    fn test_normalize_priority_and_kinds() {
        assert_eq!(normalize(BLOB).unwrap().kind, RefKind::Github);
        assert_eq!(normalize(RAW).unwrap().canonical_path, ALIAS);
        assert_eq!(normalize(ALIAS).unwrap().fetch_url.as_deref(), Some(RAW));
        assert_eq!(normalize("ipfs://QmHash/a.sol").unwrap().kind, RefKind::Ipfs);
        assert!(normalize("./Token.sol").is_none());
        assert!(normalize("@openzeppelin/contracts/token/ERC20/ERC20.sol").is_none());
    }

    #[test]
    fn test_classify_fallbacks() {
        let http = classify("https://example.com/lib/Math.sol");
        assert_eq!(http.kind, RefKind::Http);
        assert_eq!(http.canonical_path, "http/example.com/lib/Math.sol");

        let npm = classify("@openzeppelin/contracts/token/ERC20/ERC20.sol");
        assert_eq!(npm.kind, RefKind::Npm);

        let local = classify("./lib/../Token.sol");
        assert_eq!(local.kind, RefKind::Local);
        assert_eq!(local.canonical_path, "Token.sol");
    }
}
