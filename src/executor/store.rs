//! Low-level store contract
//!
//! The store executes one conjunctive query at a time and returns a lazy
//! stream of matching entities, ordered by the query's sort terms and
//! then by key. Only `=`, `<`, `<=`, `>`, `>=` ever reach it.

use futures_util::stream::BoxStream;

use crate::model::{Entity, Key};
use crate::planner::SortSpec;
use crate::query::FilterNode;

use super::cursor::Cursor;
use super::errors::StoreResult;

/// Ordered stream of results for one primitive query
pub type EntityStream = BoxStream<'static, StoreResult<Entity>>;

/// A single conjunctive query the store executes natively
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveQuery {
    pub kind: Option<String>,
    /// Restricts results to this key and its descendants
    pub ancestor: Option<Key>,
    pub app: Option<String>,
    pub namespace: Option<String>,
    /// AND of primitive comparisons
    pub filters: Vec<FilterNode>,
    pub orders: Vec<SortSpec>,
    pub projection: Option<Vec<String>>,
    pub limit: Option<usize>,
    /// Resume strictly after this position
    pub start_cursor: Option<Cursor>,
}

/// Executes primitive queries
///
/// Implementations own transport and retry policy. Errors are reported
/// as items of the returned stream.
pub trait StoreExecutor: Send + Sync {
    fn execute(&self, query: PrimitiveQuery) -> EntityStream;
}
