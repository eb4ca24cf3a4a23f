//! CLI argument definitions using clap
//!
//! Commands:
//! - dsquery config --config <path>
//! - dsquery cursor <token>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dsquery - inspect query layer configuration and cursors
#[derive(Parser, Debug)]
#[command(name = "dsquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a configuration file and print it with defaults filled in
    Config {
        /// Path to configuration file
        #[arg(long, default_value = "./dsquery.json")]
        config: PathBuf,
    },

    /// Decode a web-safe cursor token
    Cursor {
        /// Token as returned by `Cursor::to_websafe_string`
        token: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
