//! `soldeps index` command implementation.

use super::Workspace;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use soldeps_core::fetch::LocalFs;
use soldeps_core::index::watch::forward_events;
use soldeps_core::index::IndexWatcher;
use soldeps_core::{Config, ResolutionIndex};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Index command action.
#[derive(Debug, Clone)]
pub enum IndexAction {
    Show,
    Lookup { source: String, import: String },
    Watch,
}

/// Lookup result for JSON output.
#[derive(Serialize)]
struct LookupResultJson<'a> {
    ok: bool,
    source: &'a str,
    import: &'a str,
    resolved: Option<String>,
}

/// Run the index command.
pub fn run(config: &Config, action: IndexAction) -> Result<()> {
    let workspace = Workspace::open(config)?;
    let index = Arc::new(ResolutionIndex::new(Arc::new(LocalFs::new(
        workspace.root.clone(),
    ))));

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    match action {
        IndexAction::Show => {
            runtime.block_on(index.load()).into_diagnostic()?;
            show(&index, config.json_logs)
        }
        IndexAction::Lookup { source, import } => {
            let source = workspace.path_of(&config.cwd, &source);
            let resolved = runtime
                .block_on(index.lookup(&source, &import))
                .into_diagnostic()?;
            lookup(&source, &import, resolved, config.json_logs)
        }
        IndexAction::Watch => runtime.block_on(watch(&workspace, index)),
    }
}

fn show(index: &ResolutionIndex, json: bool) -> Result<()> {
    let entries = index.entries();
    if json {
        println!("{}", serde_json::to_string_pretty(&entries).into_diagnostic()?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No resolutions recorded in {}", index.path());
        return Ok(());
    }
    for (source, imports) in &entries {
        println!("{source}");
        for (import, resolved) in imports {
            println!("  {import} -> {resolved}");
        }
    }
    Ok(())
}

fn lookup(source: &str, import: &str, resolved: Option<String>, json: bool) -> Result<()> {
    let found = resolved.is_some();
    if json {
        let result = LookupResultJson {
            ok: found,
            source,
            import,
            resolved,
        };
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else if let Some(resolved) = resolved {
        println!("{resolved}");
    } else {
        eprintln!("error: no resolution recorded for {import} in {source}");
    }

    if !found {
        std::process::exit(1);
    }
    Ok(())
}

/// Keep the index in sync with its file until interrupted.
async fn watch(workspace: &Workspace, index: Arc<ResolutionIndex>) -> Result<()> {
    index.load().await.into_diagnostic()?;

    let (tx, rx) = mpsc::unbounded_channel();
    let watcher = IndexWatcher::start(&workspace.root, tx).into_diagnostic()?;
    eprintln!("Watching {} (Ctrl+C to stop)", watcher.index_file().display());

    tokio::select! {
        () = forward_events(Arc::clone(&index), rx) => {}
        result = tokio::signal::ctrl_c() => {
            result.into_diagnostic()?;
        }
    }

    tracing::info!(
        files = index.entries().len(),
        dirty = index.is_dirty(),
        "Stopped watching resolution index"
    );
    Ok(())
}
