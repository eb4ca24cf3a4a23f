//! Query layer configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default. Validation runs on load.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::observability::{Logger, Severity};
use crate::query::{QueryError, QueryResult};

/// Default cap on branches waiting on the store at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
/// Default cap on DNF branches per query
pub const DEFAULT_MAX_BRANCHES: usize = 30;
/// Default per-branch read-ahead
pub const DEFAULT_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Max branches polled concurrently (default 10)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Max DNF branches before normalization fails (default 30)
    #[serde(default = "default_max_branches")]
    pub max_branches: usize,

    /// Records buffered ahead per branch (default 20)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Minimum log severity: trace, info, warn or error (default "warn")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}
fn default_max_branches() -> usize {
    DEFAULT_MAX_BRANCHES
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_branches: DEFAULT_MAX_BRANCHES,
            batch_size: DEFAULT_BATCH_SIZE,
            log_level: default_log_level(),
        }
    }
}

impl QueryConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> QueryResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("Failed to read config: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON document
    pub fn from_json(content: &str) -> QueryResult<Self> {
        let config: QueryConfig = serde_json::from_str(content)
            .map_err(|e| QueryError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QueryResult<()> {
        if self.max_concurrency == 0 {
            return Err(QueryError::Config("max_concurrency must be > 0".into()));
        }
        if self.max_branches == 0 {
            return Err(QueryError::Config("max_branches must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(QueryError::Config("batch_size must be > 0".into()));
        }
        self.severity()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> QueryResult<Severity> {
        self.log_level.parse().map_err(QueryError::Config)
    }

    /// Install `log_level` as the process-wide logger minimum
    pub fn apply_logging(&self) -> QueryResult<()> {
        Logger::set_min_severity(self.severity()?);
        Ok(())
    }
}
