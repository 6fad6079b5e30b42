pub mod config;
pub mod load;
pub mod query;
pub mod table;

use anyhow::{Context, Result};
use stat_log_db::{Connection, Database, OutputFormat, Row, StatLogConfig};
use tabled::builder::Builder;
use tabled::settings::Style;

/// Run a command on a connection of the configured database
///
/// The database is closed before returning, also when the command fails.
/// The command's error wins over a close error.
pub(crate) fn with_database<F>(config: &StatLogConfig, f: F) -> Result<()>
where
    F: FnOnce(&Connection) -> Result<()>,
{
    let options = config.database_options()?;
    let db = Database::with_options(options);
    let conn = db
        .init_db(true)
        .with_context(|| format!("unable to open database {}", db.location()))?;

    let result = f(&conn);
    let closed = db.close_db();
    result?;
    closed?;
    Ok(())
}

/// Print result rows in the requested format
pub(crate) fn print_rows(columns: &[String], rows: &[Row], format: OutputFormat) {
    if let Some(out) = stat_log_db::output::format_rows(columns, rows, format) {
        if !out.is_empty() {
            println!("{}", out);
        }
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(columns.iter().cloned());
    for row in rows {
        builder.push_record(row.iter().map(|v| v.to_string()));
    }
    let mut table = builder.build();
    match format {
        OutputFormat::Markdown => table.with(Style::markdown()),
        _ => table.with(Style::rounded()),
    };
    println!("{}", table);
}
