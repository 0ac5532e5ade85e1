#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use soldeps_core::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "soldeps")]
#[command(author, version, about = "Resolve and compile Solidity imports", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Resolve every import of a compilation target
    Resolve {
        /// Entry file, relative to the working directory
        target: String,

        /// Write the solc standard-JSON input to this file
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Resolve a target and compile it with solc
    Compile {
        /// Entry file, relative to the working directory
        target: String,

        /// solc binary to run
        #[arg(long, value_name = "PATH", default_value = "solc")]
        solc: PathBuf,
    },

    /// Show how an import reference is classified
    Normalize {
        /// Import path or URL as written in a source file
        reference: String,
    },

    /// Inspect the resolution index
    Index {
        #[command(subcommand)]
        index_cmd: IndexCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum IndexCommands {
    /// Print every recorded resolution
    Show,

    /// Look up where an import resolved to
    Lookup {
        /// Workspace path of the importing file
        source: String,

        /// Import path as written
        import: String,
    },

    /// Reload the index whenever the file changes on disk
    Watch,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    // Pure commands print without logging.
    if let Some(Commands::Normalize { reference }) = &cli.command {
        return commands::normalize::run(reference, cli.json);
    }

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Normalize { .. }) => unreachable!(), // Handled above
        Some(Commands::Resolve { target, out }) => {
            let span = tracing::info_span!("resolve", cmd = "resolve", cwd = %cwd.display());
            let _guard = span.enter();
            commands::resolve::run(&config, &target, out.as_deref())
        }
        Some(Commands::Compile { target, solc }) => {
            let span = tracing::info_span!("compile", cmd = "compile", cwd = %cwd.display());
            let _guard = span.enter();
            commands::compile::run(&config, &target, &solc)
        }
        Some(Commands::Index { index_cmd }) => {
            let action = match index_cmd {
                IndexCommands::Show => commands::index::IndexAction::Show,
                IndexCommands::Lookup { source, import } => {
                    commands::index::IndexAction::Lookup { source, import }
                }
                IndexCommands::Watch => commands::index::IndexAction::Watch,
            };
            commands::index::run(&config, action)
        }
    }
}
