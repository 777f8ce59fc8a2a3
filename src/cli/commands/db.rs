use anyhow::Context;
use clap::Subcommand;
use serde_json::Value;

use crate::cli::output::{output_rows, output_success};
use crate::cli::OutputFormat;
use crate::config::DatabaseConfig;
use crate::database::ConnectionProvider;

#[derive(Subcommand)]
pub enum DbCommands {
    #[command(about = "Check that the database answers")]
    Ping,

    #[command(about = "Run a raw statement with positional ? parameters")]
    Query {
        #[arg(help = "SQL text; use ? for every value")]
        sql: String,
        #[arg(long = "param", help = "Bound parameter, repeat once per ?")]
        params: Vec<String>,
    },
}

/// CLI arguments arrive as text; numbers, booleans and `null` are bound as
/// their JSON types, everything else as a string.
pub fn parse_param(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    }
}

pub async fn handle(cmd: DbCommands, database: &DatabaseConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let db = ConnectionProvider::new(database.clone());

    let result = match cmd {
        DbCommands::Ping => {
            db.health_check().await.context("database did not answer")?;
            output_success(
                output_format,
                &format!("Connected to {}@{}:{}/{}", database.user, database.host, database.port, database.name),
                None,
            )
        }
        DbCommands::Query { sql, params } => {
            let params = params.iter().map(|p| parse_param(p)).collect();
            let rows = db.data_access()?.raw_query(&sql, params).await?;
            output_rows(output_format, &rows)
        }
    };

    db.close().await;
    result
}
