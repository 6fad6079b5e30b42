use anyhow::Result;
use serde::Serialize;
use stat_log_db::{OutputFormat, StatLogConfig};

#[derive(Debug, Serialize)]
struct ConfigInfo {
    config_file: String,
    db_name: String,
    storage_mode: String,
    location: String,
    fkey_constraint: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    busy_timeout_ms: Option<u128>,
}

pub fn run(config: &StatLogConfig, output_format: OutputFormat) -> Result<()> {
    if !output_format.is_json() {
        println!("{}", config.summary());
        return Ok(());
    }

    let options = config.database_options()?;
    let info = ConfigInfo {
        config_file: config.config_path.clone(),
        db_name: options.db_name.clone(),
        storage_mode: options.storage_mode.to_string(),
        location: options.location(),
        fkey_constraint: options.fkey_constraint,
        busy_timeout_ms: options.busy_timeout.map(|t| t.as_millis()),
    };
    let out = match output_format {
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&info)?,
        _ => serde_json::to_string(&info)?,
    };
    println!("{}", out);
    Ok(())
}
