//! `soldeps compile` command implementation.

use super::Workspace;
use miette::{miette, IntoDiagnostic, Result};
use soldeps_core::{Compiler, CompilerInput, Config, SmartCompiler, SolcProcess};
use std::path::Path;

/// Run the compile command. The solc output is printed as-is.
pub fn run(config: &Config, target: &str, solc: &Path) -> Result<()> {
    let workspace = Workspace::open(config)?;
    let target = workspace.path_of(&config.cwd, target);
    let content = std::fs::read_to_string(workspace.root.join(&target))
        .map_err(|e| miette!("Failed to read {target}: {e}"))?;

    let compiler = SmartCompiler::new(workspace.resolver()?, SolcProcess::new(solc));

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let output = runtime
        .block_on(compiler.compile(CompilerInput::from_entry(target.clone(), content)))
        .map_err(|e| miette!("{e}"))?;

    println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);

    if has_errors(&output) {
        if !config.json_logs {
            eprintln!("error: compilation of {target} failed");
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Whether solc reported an error-severity entry.
fn has_errors(output: &serde_json::Value) -> bool {
    output
        .get("errors")
        .and_then(serde_json::Value::as_array)
        .is_some_and(|errors| {
            errors
                .iter()
                .any(|e| e.get("severity").and_then(serde_json::Value::as_str) == Some("error"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_errors() {
        assert!(!has_errors(&json!({ "contracts": {} })));
        assert!(!has_errors(&json!({ "errors": [{ "severity": "warning" }] })));
        assert!(has_errors(&json!({ "errors": [{ "severity": "warning" }, { "severity": "error" }] })));
    }
}
