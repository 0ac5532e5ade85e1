//! Package resolution error types.

use std::fmt;

/// Package resolution error codes.
pub mod codes {
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    pub const PKG_REGISTRY_ERROR: &str = "PKG_REGISTRY_ERROR";
    pub const PKG_MANIFEST_INVALID: &str = "PKG_MANIFEST_INVALID";
    pub const PKG_LOCKFILE_INVALID: &str = "PKG_LOCKFILE_INVALID";
    pub const DEPENDENCY_RESOLUTION_FAILED: &str = "DEPENDENCY_RESOLUTION_FAILED";
}

/// Package resolution error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgError {
    code: &'static str,
    message: String,
    package: Option<String>,
    importer: Option<String>,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            package: None,
            importer: None,
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Package the failure is about, when known.
    #[must_use]
    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    /// Source file whose import triggered the failure, when known.
    #[must_use]
    pub fn importer(&self) -> Option<&str> {
        self.importer.as_deref()
    }

    /// Create a spec invalid error.
    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SPEC_INVALID, msg)
    }

    /// Create a package not found error.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        let mut err = Self::new(codes::PKG_NOT_FOUND, format!("Package not found: {name}"));
        err.package = Some(name.to_string());
        err
    }

    /// Create a version not found error.
    #[must_use]
    pub fn version_not_found(name: &str, range: &str) -> Self {
        let mut err = Self::new(
            codes::PKG_VERSION_NOT_FOUND,
            format!("No version of {name} satisfies range: {range}"),
        );
        err.package = Some(name.to_string());
        err
    }

    /// Create a registry error.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, msg)
    }

    /// Create a manifest (package.json) invalid error.
    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_MANIFEST_INVALID, msg)
    }

    /// Create a lock file invalid error.
    pub fn lockfile_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LOCKFILE_INVALID, msg)
    }

    /// Wrap a failure to pick a version for `package` while resolving `importer`.
    #[must_use]
    pub fn dependency_resolution(package: &str, importer: &str, cause: &PkgError) -> Self {
        Self {
            code: codes::DEPENDENCY_RESOLUTION_FAILED,
            message: format!(
                "Cannot determine a version of {package} imported by {importer}: {}",
                cause.message
            ),
            package: Some(package.to_string()),
            importer: Some(importer.to_string()),
        }
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Connection failed: {e}"))
        } else {
            Self::new(codes::PKG_REGISTRY_ERROR, e.to_string())
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, format!("Invalid JSON: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        let err = PkgError::spec_invalid("bad import");
        assert_eq!(err.code(), codes::PKG_SPEC_INVALID);
        assert!(err.to_string().contains(codes::PKG_SPEC_INVALID));
    }

    #[test]
    fn test_dependency_resolution_carries_context() {
        let cause = PkgError::version_not_found("solmate", "^9.0.0");
        let err = PkgError::dependency_resolution("solmate", "contracts/Vault.sol", &cause);
        assert_eq!(err.code(), codes::DEPENDENCY_RESOLUTION_FAILED);
        assert_eq!(err.package(), Some("solmate"));
        assert_eq!(err.importer(), Some("contracts/Vault.sol"));
        assert!(err.message().contains("^9.0.0"));
    }

    #[test]
    fn test_error_codes_uppercase() {
        let all_codes = [
            codes::PKG_SPEC_INVALID,
            codes::PKG_NOT_FOUND,
            codes::PKG_VERSION_NOT_FOUND,
            codes::PKG_REGISTRY_ERROR,
            codes::PKG_MANIFEST_INVALID,
            codes::PKG_LOCKFILE_INVALID,
            codes::DEPENDENCY_RESOLUTION_FAILED,
        ];

        for code in all_codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Error code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }
}
