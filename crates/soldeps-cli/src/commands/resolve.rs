//! `soldeps resolve` command implementation.

use super::Workspace;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use soldeps_core::resolver::TreeSummary;
use soldeps_core::Config;
use std::path::Path;

/// Resolve result for JSON output.
#[derive(Serialize)]
struct ResolveResultJson {
    ok: bool,
    index_saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    out: Option<String>,
    #[serde(flatten)]
    summary: TreeSummary,
}

/// Run the resolve command.
pub fn run(config: &Config, target: &str, out: Option<&Path>) -> Result<()> {
    let workspace = Workspace::open(config)?;
    let target = workspace.path_of(&config.cwd, target);
    let resolver = workspace.resolver()?;

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let (tree, index_saved) = runtime.block_on(async {
        let tree = resolver.build_dependency_tree(&target).await?;
        let saved = match resolver.save_resolution_index().await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(error = %e, "Resolution index not saved");
                false
            }
        };
        Ok::<_, soldeps_core::ResolveError>((tree, saved))
    })
    .into_diagnostic()?;

    if let Some(out) = out {
        let input = serde_json::to_string_pretty(&tree.to_compiler_input().to_standard_json())
            .into_diagnostic()?;
        std::fs::write(out, input).into_diagnostic()?;
    }

    let ok = tree.is_complete();
    if config.json_logs {
        let result = ResolveResultJson {
            ok,
            index_saved,
            out: out.map(|p| p.display().to_string()),
            summary: tree.summary(),
        };
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else {
        print_summary(&tree.summary());
        if let Some(out) = out {
            println!("Wrote compiler input to {}", out.display());
        }
    }

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &TreeSummary) {
    let stats = &summary.stats;
    println!(
        "Resolved {}: {} files ({} fetched, {} from disk, {} from index)",
        summary.target,
        summary.files.len(),
        stats.fetched_remote,
        stats.from_disk,
        stats.from_index
    );
    for file in &summary.files {
        match (&file.package, &file.version) {
            (Some(package), Some(version)) => {
                println!("  {}  ({package}@{version})", file.path);
            }
            _ => println!("  {}", file.path),
        }
    }
    for conflict in &summary.conflicts {
        eprintln!("warning: {conflict}");
    }
    for diagnostic in &summary.diagnostics {
        eprintln!("error: {diagnostic}");
    }
}
