//! CLI module for dsquery
//!
//! Provides command-line access to:
//! - config: validate a configuration file
//! - cursor: decode a resumption token

mod args;
mod commands;

pub use args::{Cli, Command};
pub use commands::{decode_cursor, run, run_command, show_config};
