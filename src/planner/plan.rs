//! Query plans
//!
//! A plan is the normalized form of a bound query: scope (kind, ancestor,
//! app, namespace), ordering, and one primitive conjunction per branch.
//! Plans hold no runtime state.

use crate::executor::{Cursor, PrimitiveQuery};
use crate::model::Key;
use crate::query::PostFilterPredicate;

use super::normalize::Conjunct;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One ordering term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub property: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// A primitive query paired with the predicates re-checked on its results
#[derive(Debug, Clone)]
pub struct BranchQuery {
    pub query: PrimitiveQuery,
    pub post_filters: Vec<PostFilterPredicate>,
}

/// Immutable plan for a bound query
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub kind: Option<String>,
    pub ancestor: Option<Key>,
    pub app: Option<String>,
    pub namespace: Option<String>,
    /// Explicit ordering; results are always tie-broken by key
    pub orders: Vec<SortSpec>,
    pub projection: Option<Vec<String>>,
    pub branches: Vec<Conjunct>,
}

impl QueryPlan {
    /// True when no branch can match; execution skips the store entirely
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// True when results need merging across several primitive queries
    pub fn is_multi_query(&self) -> bool {
        self.branches.len() > 1
    }

    /// Builds one primitive query per branch.
    ///
    /// `limit` is pushed down only to branches without post-filters: a
    /// branch never has to produce more than `offset + limit` records for
    /// the merged stream, but post-filtered records do not count.
    pub fn primitive_queries(
        &self,
        limit: Option<usize>,
        offset: usize,
        start_cursor: Option<&Cursor>,
    ) -> Vec<BranchQuery> {
        self.branches
            .iter()
            .map(|branch| {
                let branch_limit = match limit {
                    Some(l) if branch.post_filters().is_empty() => Some(l.saturating_add(offset)),
                    _ => None,
                };
                BranchQuery {
                    query: PrimitiveQuery {
                        kind: self.kind.clone(),
                        ancestor: self.ancestor.clone(),
                        app: self.app.clone(),
                        namespace: self.namespace.clone(),
                        filters: branch.filters().to_vec(),
                        orders: self.orders.clone(),
                        projection: self.projection.clone(),
                        limit: branch_limit,
                        start_cursor: start_cursor.cloned(),
                    },
                    post_filters: branch.post_filters().to_vec(),
                }
            })
            .collect()
    }
}
