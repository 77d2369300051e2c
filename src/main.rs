//! # Vault Index CLI (`vix`)
//!
//! The `vix` binary keeps a SQLite index of the entries written in the
//! `## INDEX` section of Obsidian daily notes, and renders index pages and
//! export packs from it.
//!
//! ## Usage
//!
//! ```bash
//! vix --vault ~/notes <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vix init` | Create the SQLite database and run schema migrations |
//! | `vix reconcile` | Sync INDEX entries from daily notes into the database |
//! | `vix build-index` | Render index pages per kind (and per book/course) |
//! | `vix export-pack --tag T` | Gather every block with a tag into one document |
//! | `vix validate` | Check daily notes for malformed INDEX entries |
//! | `vix stats` | Show database counts and recent runs |
//!
//! ## Examples
//!
//! ```bash
//! # Reconcile the last week of notes
//! vix reconcile
//!
//! # Reconcile everything, retiring entries removed from notes
//! vix reconcile --full
//!
//! # Rebuild only the idea and action pages
//! vix build-index --only idea,action
//!
//! # Export all learnings from a book
//! vix export-pack --tag book:DeepWork --kind learning
//! ```

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vault_index::config;
use vault_index::export_pack::{self, ExportRequest, SortOrder};
use vault_index::models::{ItemKind, Window};
use vault_index::progress::ProgressMode;
use vault_index::{build_index, migrate, reconcile, stats, validate};

/// Vault Index: a SQLite index over the INDEX sections of daily notes.
#[derive(Parser)]
#[command(
    name = "vix",
    about = "Vault Index: reconcile daily note INDEX entries into SQLite and render index pages",
    version
)]
struct Cli {
    /// Vault root directory.
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    /// Path to a configuration file (TOML).
    ///
    /// Defaults to `<vault>/99.system/vix.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG); `validate` also lists warnings.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all tables. Safe to run
    /// repeatedly.
    Init,

    /// Reconcile INDEX entries from daily notes into the database.
    ///
    /// Inserts new entries, updates changed ones and retires entries that
    /// were removed from their note.
    Reconcile {
        /// Scan every daily note.
        #[arg(long, conflicts_with = "since")]
        full: bool,

        /// Only scan notes dated within the last N days.
        #[arg(long)]
        since: Option<u32>,

        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr (default: human when stderr is a terminal).
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Render index pages from the database.
    BuildIndex {
        /// Only build pages for these kinds (comma-separated).
        #[arg(long, value_delimiter = ',')]
        only: Vec<ItemKind>,
    },

    /// Write one document with every block carrying a tag.
    ExportPack {
        /// Tag to export, e.g. `book:DeepWork`.
        #[arg(long)]
        tag: String,

        /// Earliest item date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Latest item date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Only export this kind.
        #[arg(long)]
        kind: Option<ItemKind>,

        /// Chronological order of sections.
        #[arg(long, value_enum, default_value = "asc")]
        order: SortOrder,

        /// Output file name inside the export directory.
        #[arg(long)]
        output: Option<String>,
    },

    /// Check daily notes for malformed INDEX entries.
    ///
    /// Exits with status 1 when errors are found. Warnings are listed
    /// with `--verbose`.
    Validate {
        /// Only check notes dated within the last N days.
        #[arg(long)]
        since: Option<u32>,
    },

    /// Show database statistics.
    Stats,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let vault = cli.vault.canonicalize().unwrap_or_else(|_| cli.vault.clone());
    let cfg = config::load_config(&vault, cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!(
                "Database initialized successfully: {}",
                cfg.db_path().display()
            );
        }
        Commands::Reconcile {
            full,
            since,
            dry_run,
            progress,
        } => {
            let window = if full {
                Window::Full
            } else {
                Window::Since(since.unwrap_or(cfg.reconcile.default_window_days))
            };
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            reconcile::run_reconcile(&cfg, window, dry_run, progress).await?;
        }
        Commands::BuildIndex { only } => {
            build_index::run_build_index(&cfg, &only).await?;
        }
        Commands::ExportPack {
            tag,
            from,
            to,
            kind,
            order,
            output,
        } => {
            let request = ExportRequest {
                tag,
                from,
                to,
                kind,
                order,
                output,
            };
            export_pack::run_export_pack(&cfg, &request).await?;
        }
        Commands::Validate { since } => {
            if !validate::run_validate(&cfg, since, cli.verbose)? {
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
