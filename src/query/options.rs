//! Per-fetch options

use crate::config::QueryConfig;
use crate::executor::Cursor;

/// Options for one execution of a query
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Max records to yield
    pub limit: Option<usize>,
    /// Records to skip after merging
    pub offset: usize,
    /// Resume strictly after this position
    pub start_cursor: Option<Cursor>,
    /// Max DNF branches the plan may have
    pub max_branches: usize,
    pub max_concurrency: usize,
    pub batch_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

impl FetchOptions {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            limit: None,
            offset: 0,
            start_cursor: None,
            max_branches: config.max_branches,
            max_concurrency: config.max_concurrency,
            batch_size: config.batch_size,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_start_cursor(mut self, cursor: Cursor) -> Self {
        self.start_cursor = Some(cursor);
        self
    }

    pub fn with_max_branches(mut self, max_branches: usize) -> Self {
        self.max_branches = max_branches;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}
