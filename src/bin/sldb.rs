use clap::{Parser, Subcommand};
use stat_log_db::{OutputFormat, StatLogConfig};
use tracing::Level;

mod commands;

use commands::load::LoadArgs;
use commands::query::QueryArgs;
use commands::table::{CreateTableArgs, DropTableArgs};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default <config dir>/stat_log_db/stat_log_db.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format: table (default), markdown, json, json-pretty, json-line, psv
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active configuration and database location
    Config,

    /// Create a table from name:TYPE column definitions
    CreateTable(CreateTableArgs),

    /// Drop a table
    DropTable(DropTableArgs),

    /// Execute one SQL statement with bound parameters and print its rows
    Query(QueryArgs),

    /// Insert records from a JSON file in one atomic batch
    Load(LoadArgs),

    /// List user tables with their row counts
    Tables,
}

fn main() {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            // filter spans/events with level DEBUG or higher.
            .with_max_level(Level::DEBUG)
            .init();
    }

    let config = match StatLogConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    };

    let format = cli.format;
    let result = match cli.command {
        Commands::Config => commands::config::run(&config, format),
        Commands::CreateTable(args) => {
            commands::with_database(&config, |conn| commands::table::create_table(conn, args))
        }
        Commands::DropTable(args) => {
            commands::with_database(&config, |conn| commands::table::drop_table(conn, args))
        }
        Commands::Query(args) => {
            commands::with_database(&config, |conn| commands::query::run(conn, args, format))
        }
        Commands::Load(args) => {
            commands::with_database(&config, |conn| commands::load::run(conn, args))
        }
        Commands::Tables => {
            commands::with_database(&config, |conn| commands::table::list_tables(conn, format))
        }
    };

    if let Err(e) = result {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}
