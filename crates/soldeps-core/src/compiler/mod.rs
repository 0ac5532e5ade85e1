//! Compiler port.
//!
//! The Solidity compiler itself is opaque: it receives a flat source map plus
//! the name of the entry file and returns whatever it returns. This module
//! defines that contract and two implementations:
//!
//! - [`SolcProcess`] pipes standard-JSON into a `solc` binary
//! - [`SmartCompiler`] resolves imports first, then delegates to any compiler
//!
//! ## Usage
//!
//! ```ignore
//! use soldeps_core::compiler::{Compiler, CompilerInput, SmartCompiler, SolcProcess};
//!
//! let compiler = SmartCompiler::new(resolver, SolcProcess::new("solc"));
//! let output = compiler.compile(CompilerInput::from_entry("contracts/Token.sol", source)).await?;
//! ```

pub mod smart;
pub mod solc;

pub use smart::SmartCompiler;
pub use solc::SolcProcess;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Error codes for compiler failures.
pub mod codes {
    pub const COMPILER_NOT_FOUND: &str = "COMPILER_NOT_FOUND";
    pub const COMPILER_IO_ERROR: &str = "COMPILER_IO_ERROR";
    pub const COMPILER_FAILED: &str = "COMPILER_FAILED";
    pub const COMPILER_OUTPUT_INVALID: &str = "COMPILER_OUTPUT_INVALID";
}

/// Content of one source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContent {
    pub content: String,
}

/// Everything the compiler needs for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerInput {
    /// `path -> { content }`.
    pub sources: BTreeMap<String, SourceContent>,
    /// Entry file to compile.
    pub target: String,
}

impl CompilerInput {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            sources: BTreeMap::new(),
            target: target.into(),
        }
    }

    /// Input holding only the entry file.
    #[must_use]
    pub fn from_entry(target: impl Into<String>, content: impl Into<String>) -> Self {
        let target = target.into();
        let mut input = Self::new(target.clone());
        input.insert(target, content);
        input
    }

    /// Add or replace a source.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.sources.insert(
            path.into(),
            SourceContent {
                content: content.into(),
            },
        );
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.sources.get(path).map(|s| s.content.as_str())
    }

    /// `path -> content` view of the sources.
    #[must_use]
    pub fn source_map(&self) -> BTreeMap<String, String> {
        self.sources
            .iter()
            .map(|(path, source)| (path.clone(), source.content.clone()))
            .collect()
    }

    /// solc standard-JSON input selecting ABI and bytecode for every contract.
    #[must_use]
    pub fn to_standard_json(&self) -> Value {
        json!({
            "language": "Solidity",
            "sources": self.sources,
            "settings": {
                "outputSelection": {
                    "*": { "*": ["abi", "evm.bytecode.object"] }
                }
            }
        })
    }
}

/// Raw compiler output (solc standard-JSON output for [`SolcProcess`]).
pub type CompilerOutput = Value;

/// Failure to run the compiler at all.
///
/// Source errors are part of a successful [`CompilerOutput`], not this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerError {
    pub code: &'static str,
    pub message: String,
}

impl CompilerError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::COMPILER_NOT_FOUND, message)
    }

    #[must_use]
    pub fn io_error(message: impl Into<String>) -> Self {
        Self::new(codes::COMPILER_IO_ERROR, message)
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(codes::COMPILER_FAILED, message)
    }

    #[must_use]
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::new(codes::COMPILER_OUTPUT_INVALID, message)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CompilerError {}

/// A Solidity compiler.
#[async_trait]
pub trait Compiler: Send + Sync {
    fn name(&self) -> &str;

    /// Compile `input.target` with `input.sources` available for imports.
    async fn compile(&self, input: CompilerInput) -> Result<CompilerOutput, CompilerError>;
}

#[async_trait]
impl<C: Compiler + ?Sized> Compiler for std::sync::Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn compile(&self, input: CompilerInput) -> Result<CompilerOutput, CompilerError> {
        (**self).compile(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_error_display() {
        let error = CompilerError::not_found("solc not on PATH");
        assert!(error.to_string().contains("COMPILER_NOT_FOUND"));
        assert!(error.to_string().contains("solc not on PATH"));
    }

    #[test]
    fn test_standard_json_shape() {
        let mut input = CompilerInput::from_entry("contracts/A.sol", "contract A {}");
        input.insert("contracts/B.sol", "contract B {}");

        let json = input.to_standard_json();
        assert_eq!(json["language"], "Solidity");
        assert_eq!(json["sources"]["contracts/A.sol"]["content"], "contract A {}");
        assert_eq!(json["sources"]["contracts/B.sol"]["content"], "contract B {}");
        assert_eq!(input.target, "contracts/A.sol");
    }

    #[test]
    fn test_serialized_input_is_flat_map() {
        let input = CompilerInput::from_entry("A.sol", "contract A {}");
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["sources"]["A.sol"]["content"], "contract A {}");
        assert_eq!(value["target"], "A.sol");
    }
}
