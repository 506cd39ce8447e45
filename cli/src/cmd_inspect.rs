//! `chainsnap inspect` — describe the pending snapshot without importing it.

use anyhow::{Context, Result};

use chainsnap_core::{ImportPlan, Importer, Marker, SnapshotStore};

use crate::config::CliConfig;

pub async fn run(cfg: &CliConfig, as_json: bool) -> Result<()> {
    let store = SnapshotStore::new(&cfg.snapshot.path);
    match store.marker().await? {
        Marker::Pending => {}
        Marker::Imported => {
            println!("{} was already imported", store.path().display());
            return Ok(());
        }
        Marker::Absent => {
            println!("No snapshot at {}", store.path().display());
            return Ok(());
        }
    }

    let snapshot = store
        .read()
        .await
        .with_context(|| format!("reading {}", store.path().display()))?;
    let plan = Importer::from_config(&cfg.snapshot).plan(&snapshot);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render(&plan));
    }
    Ok(())
}

fn render(plan: &ImportPlan) -> String {
    let mut out = String::new();
    out.push_str(&format!("Block number:  {}\n", plan.block_number));
    out.push_str(&format!("Written by:    {}\n", plan.tool_version));
    out.push('\n');

    let total: usize = plan.batches.iter().map(|b| b.records).sum();
    out.push_str(&format!("{:<28} {:>6} {:>8} {:>10}\n", "ENTITY", "MODE", "RECORDS", "STATEMENTS"));
    for batch in &plan.batches {
        out.push_str(&format!(
            "{:<28} {:>6} {:>8} {:>10}\n",
            batch.entity.name(),
            batch.mode.as_str(),
            batch.records,
            batch.statements
        ));
    }
    out.push_str(&format!("{:<28} {:>6} {:>8}\n", "total", "", total));
    out.push('\n');

    if plan.migrations.is_empty() && plan.counters.is_empty() {
        out.push_str("No migrations pending\n");
    }
    for version in &plan.migrations {
        out.push_str(&format!("Pending data migration     {version}\n"));
    }
    for counters in &plan.counters {
        let names: Vec<_> = counters.entities.iter().map(|e| e.name()).collect();
        out.push_str(&format!(
            "Pending counter migration  {}  ({})\n",
            counters.version,
            names.join(", ")
        ));
    }
    out
}
