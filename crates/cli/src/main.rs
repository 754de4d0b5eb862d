use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{
    analyze_command, annotations_command, catalog_command, list_hosts_command, AnalyzeArgs,
};
use netsurface_core::analysis::DEFAULT_MAX_STRING_LEN;
use netsurface_core::services::analysis::DEFAULT_BATCH_SIZE;

/// Network-surface triage for disassembled binaries.
///
/// This CLI is a thin wrapper around `netsurface-core` (exposed in code as
/// `netsurface_core`). All substantive logic lives in the library so it can
/// be tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "netsurface",
    version,
    about = "Find sockets, HTTP/TLS frameworks, embedded URLs and IPs in a binary",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one input and print the network-surface report.
    Analyze {
        /// Binary, or snapshot JSON export, to analyze.
        #[arg(long)]
        input: String,

        /// Host adapter (see `list-hosts`). Defaults to `snapshot` for .json
        /// inputs, otherwise `capstone` when compiled in, otherwise `rizin`.
        #[arg(long)]
        host: Option<String>,

        /// Explicit tool path for hosts that shell out (e.g. rizin).
        #[arg(long)]
        tool_path: Option<PathBuf>,

        /// Architecture hint (x86_64, x86, arm64, arm).
        #[arg(long)]
        arch: Option<String>,

        /// Catalog extension (YAML, or JSON for .json files).
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Keep the first entry on duplicate symbols instead of failing.
        #[arg(long, default_value_t = false)]
        lenient_catalog: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Write the report to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Record one annotation per finding address in this SQLite database.
        #[arg(long)]
        annotate_db: Option<PathBuf>,

        /// Write an annotated copy of the snapshot input to this path.
        #[arg(long)]
        annotate_snapshot: Option<PathBuf>,

        /// Run the call-site and literal matchers one after the other.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Items processed between cancellation checks.
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Strings longer than this many characters are truncated before matching.
        #[arg(long, default_value_t = DEFAULT_MAX_STRING_LEN)]
        max_string_len: usize,

        /// Hide the progress bar.
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },

    /// List host adapters compiled into this binary.
    ListHosts {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the signature catalog.
    Catalog {
        /// Catalog extension (YAML, or JSON for .json files).
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Keep the first entry on duplicate symbols instead of failing.
        #[arg(long, default_value_t = false)]
        lenient_catalog: bool,

        /// Only show one category (e.g. socket_raw, TLSHandshake).
        #[arg(long)]
        category: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print annotations stored in an annotation database.
    Annotations {
        /// Database written by `analyze --annotate-db`.
        #[arg(long)]
        db: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            input,
            host,
            tool_path,
            arch,
            catalog,
            lenient_catalog,
            json,
            output,
            annotate_db,
            annotate_snapshot,
            sequential,
            batch_size,
            max_string_len,
            quiet,
        } => analyze_command(&AnalyzeArgs {
            input,
            host,
            tool_path,
            arch,
            catalog,
            lenient_catalog,
            json,
            output,
            annotate_db,
            annotate_snapshot,
            sequential,
            batch_size,
            max_string_len,
            quiet,
        })?,
        Command::ListHosts { json } => list_hosts_command(json)?,
        Command::Catalog { catalog, lenient_catalog, category, json } => {
            catalog_command(catalog.as_deref(), lenient_catalog, category.as_deref(), json)?
        }
        Command::Annotations { db, json } => annotations_command(&db, json)?,
    }

    Ok(())
}
