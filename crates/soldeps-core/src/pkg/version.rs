//! npm range evaluation on top of `semver`.

use super::error::PkgError;
use super::registry::{get_latest_version, get_versions};
use semver::{Op, Version, VersionReq};
use std::collections::BTreeSet;

/// An npm version range: one or more `||` alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    /// Parse npm range syntax.
    ///
    /// Handles caret/tilde, x-ranges, hyphen ranges, space-separated comparators,
    /// bare exact versions and `||` alternatives. Non-semver specifiers
    /// (`workspace:*`, `git+...`, `file:`) are rejected.
    ///
    /// # Errors
    /// Returns an error if no alternative parses.
    pub fn parse(range: &str) -> Result<Self, PkgError> {
        let raw = range.trim();
        let mut alternatives = Vec::new();
        let mut last_error = None;

        for alt in raw.split("||").map(str::trim) {
            match parse_alternative(alt) {
                Ok(req) => alternatives.push(req),
                Err(e) => last_error = Some(e),
            }
        }

        if alternatives.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                PkgError::spec_invalid(format!("Invalid version range '{raw}'"))
            }));
        }

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// The range as written.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether any alternative accepts `version`.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Major versions the range's lower bounds point at.
    ///
    /// Used to tell a major-version break from minor drift. Empty for
    /// unbounded ranges like `*`.
    #[must_use]
    pub fn majors(&self) -> BTreeSet<u64> {
        self.alternatives
            .iter()
            .flat_map(|req| req.comparators.iter())
            .filter(|c| !matches!(c.op, Op::Less | Op::LessEq | Op::Wildcard))
            .map(|c| c.major)
            .collect()
    }
}

/// Check whether `version` satisfies `range` using npm semantics.
///
/// Returns `false` when either side does not parse.
#[must_use]
pub fn version_satisfies(version: &str, range: &str) -> bool {
    let Ok(version) = parse_version(version) else {
        return false;
    };
    NpmRange::parse(range).is_ok_and(|r| r.matches(&version))
}

/// Parse a concrete version, tolerating a leading `v` or `=`.
///
/// # Errors
/// Returns an error if the string is not a semver version.
pub fn parse_version(version: &str) -> Result<Version, PkgError> {
    let trimmed = version.trim().trim_start_matches(['v', '=']);
    Version::parse(trimmed)
        .map_err(|e| PkgError::spec_invalid(format!("Invalid version '{version}': {e}")))
}

/// Highest of `versions` accepted by `range`.
#[must_use]
pub fn max_satisfying<'a, I>(versions: I, range: &NpmRange) -> Option<Version>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| range.matches(v))
        .max()
}

/// Resolve a version range against a packument.
///
/// # Rules
/// - `None` (or `latest`) returns `dist-tags.latest`
/// - an exact version is returned if published
/// - a range returns the highest satisfying published version
///
/// # Errors
/// Returns an error if no version satisfies the range.
pub fn resolve_version(
    packument: &serde_json::Value,
    range: Option<&str>,
) -> Result<String, PkgError> {
    let name = packument
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    let range = match range.map(str::trim) {
        None | Some("" | "latest") => {
            return get_latest_version(packument)
                .map(String::from)
                .ok_or_else(|| {
                    PkgError::version_not_found(name, "latest (no dist-tags.latest found)")
                });
        }
        Some(range) => range,
    };

    if let Some(tagged) = packument
        .get("dist-tags")
        .and_then(|tags| tags.get(range))
        .and_then(|v| v.as_str())
    {
        return Ok(tagged.to_string());
    }

    let versions = get_versions(packument);
    if versions.contains(&range) {
        return Ok(range.to_string());
    }

    let parsed = NpmRange::parse(range)?;
    max_satisfying(versions, &parsed)
        .map(|v| v.to_string())
        .ok_or_else(|| PkgError::version_not_found(name, range))
}

fn parse_alternative(alt: &str) -> Result<VersionReq, PkgError> {
    let invalid = |e: &dyn std::fmt::Display| {
        PkgError::spec_invalid(format!("Invalid version range '{alt}': {e}"))
    };

    if alt.contains(':') || alt.contains("://") {
        return Err(PkgError::spec_invalid(format!(
            "Unsupported dependency specifier '{alt}'"
        )));
    }

    if alt.is_empty() || alt == "*" || alt.eq_ignore_ascii_case("x") || alt == "latest" {
        return Ok(VersionReq::STAR);
    }

    // A bare version is exact in npm but caret in Rust semver.
    if let Ok(exact) = parse_version(alt) {
        return VersionReq::parse(&format!("={exact}")).map_err(|e| invalid(&e));
    }

    if let Some((start, end)) = alt.split_once(" - ") {
        let converted = format!(">={}, <={}", start.trim(), end.trim());
        return VersionReq::parse(&converted).map_err(|e| invalid(&e));
    }

    if let Some(converted) = convert_x_range(alt) {
        return VersionReq::parse(&converted).map_err(|e| invalid(&e));
    }

    VersionReq::parse(&join_comparators(alt)).map_err(|e| invalid(&e))
}

/// Convert `1.x` / `1.2.*` style ranges. Returns `None` for anything else.
fn convert_x_range(range: &str) -> Option<String> {
    let parts: Vec<&str> = range.split('.').collect();
    let is_x = |p: &str| matches!(p, "x" | "X" | "*");

    match parts.as_slice() {
        [major, x] if is_x(x) => {
            let m: u64 = major.parse().ok()?;
            Some(format!(">={m}.0.0, <{}.0.0", m + 1))
        }
        [major, minor, x] if is_x(x) => {
            let m: u64 = major.parse().ok()?;
            let n: u64 = minor.parse().ok()?;
            Some(format!(">={m}.{n}.0, <{m}.{}.0", n + 1))
        }
        _ => None,
    }
}

/// `">= 2.1.2 < 3.0.0"` becomes `">=2.1.2, <3.0.0"`.
///
/// Operators separated from their version by a space are glued back on; a
/// comma goes between complete comparators.
fn join_comparators(range: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        let token = token.trim_end_matches(',');
        if token.chars().any(|c| c.is_ascii_digit()) {
            comparators.push(format!("{pending_op}{token}"));
            pending_op.clear();
        } else {
            pending_op.push_str(token);
        }
    }

    if !pending_op.is_empty() {
        comparators.push(pending_op);
    }

    comparators.join(", ")
}
