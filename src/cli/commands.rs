//! CLI command implementations
//!
//! Every command writes exactly one JSON document to stdout.

use std::io::{self, Write};
use std::path::Path;

use crate::config::QueryConfig;
use crate::executor::Cursor;
use crate::query::{QueryError, QueryResult};

use super::args::Command;

/// Parse arguments and run the selected command
pub fn run() -> QueryResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command, &mut io::stdout())
}

/// Run `cmd`, writing its output to `out`
pub fn run_command<W: Write>(cmd: Command, out: &mut W) -> QueryResult<()> {
    let document = match cmd {
        Command::Config { config } => show_config(&config)?,
        Command::Cursor { token } => decode_cursor(&token)?,
    };
    writeln!(out, "{}", document)
        .map_err(|e| QueryError::Config(format!("Failed to write output: {}", e)))
}

/// Loaded configuration, defaults included
pub fn show_config(path: &Path) -> QueryResult<serde_json::Value> {
    let config = QueryConfig::load(path)?;
    serde_json::to_value(&config)
        .map_err(|e| QueryError::Config(format!("Failed to encode config: {}", e)))
}

/// Cursor contents as JSON
pub fn decode_cursor(token: &str) -> QueryResult<serde_json::Value> {
    let cursor = Cursor::from_websafe_string(token)?;
    serde_json::to_value(&cursor)
        .map_err(|e| QueryError::invalid_argument(format!("Failed to encode cursor: {}", e)))
}
