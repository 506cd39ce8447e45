//! `chainsnap import` — apply the pending snapshot and mark it imported.
//!
//! A missing file is an error: either nothing was exported or the snapshot
//! was already consumed, and neither may look like a successful import.

use anyhow::{Context, Result};

use chainsnap_core::{ImportReport, ImportSink, Importer, SequenceStore, SnapshotStore};

use crate::config::CliConfig;

pub async fn run(cfg: &CliConfig, database_url: &str) -> Result<()> {
    let db = crate::connect(cfg, database_url).await?;
    let report = import_into(cfg, &db).await?;
    print!("{}", render(&report));
    Ok(())
}

async fn import_into<D>(cfg: &CliConfig, db: &D) -> Result<ImportReport>
where
    D: ImportSink + SequenceStore + ?Sized,
{
    let store = SnapshotStore::new(&cfg.snapshot.path);
    Importer::from_config(&cfg.snapshot)
        .import(db, &store)
        .await
        .with_context(|| format!("importing {}", store.path().display()))
}

fn render(report: &ImportReport) -> String {
    let mut out = format!(
        "Imported snapshot of block {} (written by {})\n",
        report.block_number, report.tool_version
    );
    for batch in &report.batches {
        out.push_str(&format!(
            "  {:<28} {:>6} {:>8} rows  {:>4} statements\n",
            batch.entity.name(),
            batch.mode.as_str(),
            batch.records,
            batch.statements
        ));
    }
    for counter in &report.counters {
        out.push_str(&format!("  next id {:<20} {}\n", counter.entity_name, counter.next_id));
    }
    out.push_str(&format!("Marked as {}\n", report.imported_path.display()));
    out
}
