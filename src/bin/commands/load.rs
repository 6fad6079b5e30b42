use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use stat_log_db::{Connection, Record};
use tracing::info;

#[derive(Args)]
pub struct LoadArgs {
    /// JSON file holding an array of records: {"metadata": {"model", "external_id"}, "values": {...}}
    #[clap(name = "FILE")]
    pub file_path: PathBuf,
}

pub fn run(conn: &Connection, args: LoadArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file_path)
        .with_context(|| format!("unable to read {}", args.file_path.display()))?;
    let records: Vec<Record> = serde_json::from_str(&content)
        .with_context(|| format!("invalid records in {}", args.file_path.display()))?;

    let ids = conn.insert_records(&records)?;
    conn.commit()?;
    info!("loaded {} records from {}", ids.len(), args.file_path.display());
    println!("{} record(s) inserted", ids.len());
    Ok(())
}
