#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Import and dependency resolution for Solidity compilation.
//!
//! Starting from an entry file, the [`DependencyResolver`] discovers every
//! transitive import (workspace files, npm packages, GitHub, IPFS, Swarm and
//! plain HTTP references), persists remote content under `.deps/`, records each
//! resolution in the workspace [`ResolutionIndex`], and returns a flat source
//! bundle for the compiler.

pub mod compiler;
pub mod config;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod imports;
pub mod index;
pub mod normalize;
pub mod paths;
pub mod pkg;
pub mod resolver;
pub mod version;

pub use compiler::{Compiler, CompilerError, CompilerInput, CompilerOutput, SmartCompiler, SolcProcess};
pub use config::{Config, ResolverSettings};
pub use error::{Error, ResolveError};
pub use fetch::{ContentFetcher, FetchError, FileSystem, LocalFs, MemoryFs, RemoteFetch, Terminal};
pub use handlers::{ImportHandler, ImportHandlerRegistry};
pub use imports::{extract_imports, scan_imports, ImportReference};
pub use index::{IndexEvent, IndexState, ResolutionIndex};
pub use normalize::{classify, normalize, NormalizedReference, RefKind};
pub use resolver::{DependencyResolver, DependencyTree, ImportDiagnostic};
pub use version::VERSION;
