use anyhow::Result;
use clap::Args;
use stat_log_db::{Connection, OutputFormat, SqlValue};

use super::print_rows;

#[derive(Args)]
pub struct QueryArgs {
    /// SQL statement, using ?1, ?2, ... placeholders for parameters
    pub sql: String,

    /// Parameter value, repeatable; `null`, integers and floats are typed, the rest is text
    #[clap(short, long = "param")]
    pub params: Vec<String>,
}

pub fn run(conn: &Connection, args: QueryArgs, output_format: OutputFormat) -> Result<()> {
    let params: Vec<SqlValue> = args
        .params
        .iter()
        .map(|p| SqlValue::parse_literal(p))
        .collect();
    let summary = conn.execute(&args.sql, Some(params.as_slice()))?;

    if summary.columns.is_empty() {
        conn.commit()?;
        println!("{} row(s) changed", summary.changes);
        return Ok(());
    }

    let rows = conn.fetchall()?;
    print_rows(&summary.columns, &rows, output_format);
    Ok(())
}
