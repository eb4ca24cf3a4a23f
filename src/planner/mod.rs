//! Query planner
//!
//! Turns a bound filter tree into a bounded set of primitive conjunctions
//! the store can execute directly.
//!
//! # Guarantees
//!
//! - The OR of the branches is equivalent to the input tree
//! - No branch carries range filters on more than one property
//! - No branch uses `!=` or `IN`
//! - Branch count never exceeds the configured maximum

mod explain;
mod normalize;
mod plan;

pub use explain::ExplainPlan;
pub use normalize::{Conjunct, Normalizer};
pub use plan::{BranchQuery, QueryPlan, SortDirection, SortSpec};
