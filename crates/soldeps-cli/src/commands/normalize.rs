//! `soldeps normalize` command implementation.

use miette::{IntoDiagnostic, Result};
use soldeps_core::classify;

pub fn run(reference: &str, json: bool) -> Result<()> {
    let normalized = classify(reference);

    if json {
        println!("{}", serde_json::to_string_pretty(&normalized).into_diagnostic()?);
    } else {
        println!("kind:      {}", normalized.kind);
        println!("canonical: {}", normalized.canonical_path);
        if let Some(url) = &normalized.fetch_url {
            println!("fetch:     {url}");
        }
    }
    Ok(())
}
