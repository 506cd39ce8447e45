//! ChainSnap CLI — export, inspect and import offchain state snapshots.
//!
//! # Commands
//! ```
//! chainsnap export  --database-url <url> [--path <file>]
//! chainsnap import  --database-url <url> [--path <file>]
//! chainsnap height  [--path <file>]
//! chainsnap inspect [--path <file>] [--json]
//! chainsnap info
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chainsnap_core::{Exporter, Importer, SnapshotStore};
use chainsnap_storage::postgres::PostgresDatabase;

mod cmd_import;
mod cmd_inspect;
mod config;
mod logging;

use config::CliConfig;

#[derive(Parser)]
#[command(
    name = "chainsnap",
    about = "Offchain state snapshots with versioned migrations",
    long_about = "
ChainSnap CLI: dump the offchain part of an indexer database to a JSON
snapshot, and replay it (migrated to the current schema) into a fresh one.

ENVIRONMENT VARIABLES:
  DATABASE_URL    Postgres connection string for export / import
  RUST_LOG        Overrides the configured log filter
",
    version
)]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot file (overrides `snapshot.path` from the config)
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the offchain state to the snapshot file
    Export {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },

    /// Apply the pending snapshot file and mark it imported
    Import {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },

    /// Print the block number of the pending snapshot (-1 if there is none)
    Height,

    /// Show what an import of the pending snapshot would do
    Inspect {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show build and catalog info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = CliConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        cfg.log.level = "debug".into();
    }
    if let Some(path) = cli.path {
        cfg.snapshot.path = path;
    }
    logging::init_tracing(&cfg.log);

    match cli.command {
        Commands::Export { database_url } => cmd_export(&cfg, &database_url).await,
        Commands::Import { database_url } => cmd_import::run(&cfg, &database_url).await,
        Commands::Height => cmd_height(&cfg).await,
        Commands::Inspect { json } => cmd_inspect::run(&cfg, json).await,
        Commands::Info => cmd_info(&cfg),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn connect(cfg: &CliConfig, database_url: &str) -> Result<PostgresDatabase> {
    PostgresDatabase::connect_with_options(database_url, cfg.postgres.clone())
        .await
        .context("connecting to postgres")
}

async fn cmd_export(cfg: &CliConfig, database_url: &str) -> Result<()> {
    let db = connect(cfg, database_url).await?;
    let store = SnapshotStore::new(&cfg.snapshot.path);

    let snapshot = Exporter::from_config(&cfg.snapshot)
        .export(&db, &store)
        .await
        .context("export failed")?;

    println!(
        "Exported {} records at block {} to {}",
        snapshot.record_count(),
        snapshot.block_number,
        store.path().display()
    );
    Ok(())
}

async fn cmd_height(cfg: &CliConfig) -> Result<()> {
    let store = SnapshotStore::new(&cfg.snapshot.path);
    let height = Importer::from_config(&cfg.snapshot)
        .last_exported_height(&store)
        .await?;
    match height {
        Some(block) => println!("{block}"),
        None => println!("-1"),
    }
    Ok(())
}

fn cmd_info(cfg: &CliConfig) -> Result<()> {
    let importer = Importer::from_config(&cfg.snapshot);
    println!("ChainSnap v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Snapshot file:   {}", cfg.snapshot.path.display());
    println!("Chunk size:      {}", cfg.snapshot.chunk_size);
    println!("Tool version:    {}", cfg.snapshot.tool_version);
    println!();
    println!("Catalog (import order):");
    for entry in chainsnap_core::catalog::catalog() {
        match entry.fields() {
            Some(fields) => println!("  update  {:<28} {}", entry.entity().name(), fields.join(", ")),
            None => println!("  insert  {}", entry.entity().name()),
        }
    }
    println!();
    println!("Migrations:");
    for migration in importer.migrations().pending(Default::default()) {
        println!("  data     {}", migration.version);
    }
    for counters in importer.migrations().pending_counters(Default::default()) {
        let names: Vec<_> = counters.entities.iter().map(|e| e.name()).collect();
        println!("  counters {}  {}", counters.version, names.join(", "));
    }
    Ok(())
}
