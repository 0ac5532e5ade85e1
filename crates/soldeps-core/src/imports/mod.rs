//! Import discovery for Solidity sources.
//!
//! Provides a comment- and string-aware scanner for `import` statements.

mod scan;

pub use scan::{scan_imports, ImportKind, ScannedImport};

use serde::Serialize;

/// An import found in a specific source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReference {
    pub raw_text: String,
    pub source_file: String,
    pub kind: ImportKind,
    pub line: u32,
}

/// Extract the imports of `source_file` in source order.
#[must_use]
pub fn extract_imports(source_file: &str, content: &str) -> Vec<ImportReference> {
    scan_imports(content)
        .into_iter()
        .map(|import| ImportReference {
            raw_text: import.raw,
            source_file: source_file.to_string(),
            kind: import.kind,
            line: import.line,
        })
        .collect()
}
