use anyhow::{anyhow, Result};
use clap::Args;
use stat_log_db::{Connection, OutputFormat, SqlValue};

use super::print_rows;

#[derive(Args)]
pub struct CreateTableArgs {
    /// Table name
    pub name: String,

    /// Column definitions as name:TYPE, e.g. `message:TEXT` or `price:DECIMAL(10,2)`
    #[clap(required = true)]
    pub columns: Vec<String>,

    /// Create a temporary table
    #[clap(long)]
    pub temp: bool,

    /// Succeed silently if the table already exists
    #[clap(long)]
    pub if_not_exists: bool,
}

#[derive(Args)]
pub struct DropTableArgs {
    /// Table name
    pub name: String,

    /// Succeed silently if the table does not exist
    #[clap(long)]
    pub if_exists: bool,
}

/// Split `name:TYPE` column arguments
fn parse_columns(columns: &[String]) -> Result<Vec<(&str, &str)>> {
    columns
        .iter()
        .map(|c| {
            c.split_once(':')
                .map(|(name, ty)| (name.trim(), ty.trim()))
                .ok_or_else(|| anyhow!("column definition '{}' must be name:TYPE", c))
        })
        .collect()
}

pub fn create_table(conn: &Connection, args: CreateTableArgs) -> Result<()> {
    let columns = parse_columns(&args.columns)?;
    conn.create_table(&args.name, &columns, args.temp, !args.if_not_exists)?;
    conn.commit()?;
    println!("table {} ready", args.name);
    Ok(())
}

pub fn drop_table(conn: &Connection, args: DropTableArgs) -> Result<()> {
    conn.drop_table(&args.name, !args.if_exists)?;
    conn.commit()?;
    println!("table {} dropped", args.name);
    Ok(())
}

pub fn list_tables(conn: &Connection, output_format: OutputFormat) -> Result<()> {
    let mut rows = Vec::new();
    for (table, count) in conn.table_counts()? {
        rows.push(vec![
            SqlValue::Text(table),
            SqlValue::Integer(i64::try_from(count)?),
        ]);
    }
    let columns = vec!["table".to_string(), "rows".to_string()];
    print_rows(&columns, &rows, output_format);
    Ok(())
}
