//! npm package handling for Solidity imports.
//!
//! Provides utilities for:
//! - Parsing package imports (`@scope/name@version/path`)
//! - Fetching package metadata from the npm registry
//! - Evaluating npm version ranges on top of semver
//! - Reading package.json manifests and lock files
//! - Choosing package versions and recording them per pass
//! - Detecting version conflicts between resolved packages

pub mod conflict;
pub mod error;
pub mod lockfile;
pub mod manifest;
pub mod registry;
pub mod resolve;
pub mod spec;
pub mod store;
pub mod version;

pub use conflict::{Conflict, ConflictChecker, ConflictKind};
pub use error::{codes as pkg_codes, PkgError};
pub use lockfile::{LockedVersions, NPM_LOCKFILE, YARN_LOCKFILE};
pub use manifest::{DependencyKind, PackageManifest};
pub use registry::{PackageRegistry, RegistryClient, DEFAULT_REGISTRY};
pub use resolve::PackageVersionResolver;
pub use spec::PackageImport;
pub use store::{
    DependencyStore, PackageEntry, RecordOutcome, RejectedVersion, ResolvedFile, ResolvedVersion,
    VersionSource,
};
pub use version::{resolve_version, version_satisfies, NpmRange};
