//! Package import parsing.
//!
//! Parses the npm-style import paths Solidity sources use:
//! - `solmate/src/tokens/ERC20.sol`
//! - `solmate@6.2.0/src/tokens/ERC20.sol`
//! - `@openzeppelin/contracts/token/ERC20/ERC20.sol`
//! - `@openzeppelin/contracts@5.0.2/token/ERC20/ERC20.sol`

use super::error::PkgError;

/// A parsed package import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageImport {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Scope without the @ prefix, if scoped.
    pub scope: Option<String>,
    /// Version pinned in the import path, if any.
    pub version: Option<String>,
    /// Path inside the package (may be empty).
    pub subpath: String,
}

impl PackageImport {
    /// Parse an import path into package name, pinned version and subpath.
    ///
    /// # Errors
    /// Returns an error if the path does not start with a valid package name.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(PkgError::spec_invalid("Empty package import"));
        }

        if input.starts_with('@') {
            Self::parse_scoped(input)
        } else {
            Self::parse_unscoped(input)
        }
    }

    fn parse_scoped(input: &str) -> Result<Self, PkgError> {
        let mut segments = input.splitn(3, '/');
        let scope = segments.next().unwrap_or_default().trim_start_matches('@');
        let Some(name_part) = segments.next() else {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: missing '/' in '{input}'"
            )));
        };
        let subpath = segments.next().unwrap_or_default();

        if scope.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty scope in '{input}'"
            )));
        }
        validate_segment(scope)?;

        let (bare, version) = split_version(name_part, input)?;
        validate_segment(bare)?;

        Ok(Self {
            name: format!("@{scope}/{bare}"),
            scope: Some(scope.to_string()),
            version,
            subpath: subpath.to_string(),
        })
    }

    fn parse_unscoped(input: &str) -> Result<Self, PkgError> {
        let (name_part, subpath) = input.split_once('/').unwrap_or((input, ""));
        let (bare, version) = split_version(name_part, input)?;
        validate_segment(bare)?;

        Ok(Self {
            name: bare.to_string(),
            scope: None,
            version,
            subpath: subpath.to_string(),
        })
    }

    /// Whether an import path has the shape `name/...` or `@scope/name/...`.
    ///
    /// This is purely syntactic: `contracts/Token.sol` also matches, so callers
    /// check the workspace first.
    #[must_use]
    pub fn looks_like(input: &str) -> bool {
        if input.starts_with('.') || input.starts_with('/') || input.contains("://") {
            return false;
        }
        Self::parse(input).is_ok_and(|import| !import.subpath.is_empty())
    }

    /// Import path carrying an explicit version: `{name}@{version}/{subpath}`.
    #[must_use]
    pub fn versioned_path(&self, version: &str) -> String {
        if self.subpath.is_empty() {
            format!("{}@{version}", self.name)
        } else {
            format!("{}@{version}/{}", self.name, self.subpath)
        }
    }
}

fn split_version<'a>(
    name_part: &'a str,
    input: &str,
) -> Result<(&'a str, Option<String>), PkgError> {
    match name_part.split_once('@') {
        Some((bare, version)) => {
            if bare.is_empty() {
                return Err(PkgError::spec_invalid(format!(
                    "Invalid package import: empty name in '{input}'"
                )));
            }
            if version.is_empty() {
                return Err(PkgError::spec_invalid(format!(
                    "Invalid package import: empty version in '{input}'"
                )));
            }
            Ok((bare, Some(version.to_string())))
        }
        None => Ok((name_part, None)),
    }
}

fn validate_segment(name: &str) -> Result<(), PkgError> {
    if name.is_empty() {
        return Err(PkgError::spec_invalid("Empty package name"));
    }

    for c in name.chars() {
        if !c.is_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(PkgError::spec_invalid(format!(
                "Invalid character '{c}' in package name '{name}'"
            )));
        }
    }

    Ok(())
}
