//! dsquery - query expressions over a key/value entity store
//!
//! Filters are built as expression trees, bound against parameters,
//! normalized into OR-of-AND branches the store can execute natively,
//! and merged back into one ordered, deduplicated result stream.

pub mod cli;
pub mod config;
pub mod executor;
pub mod model;
pub mod observability;
pub mod planner;
pub mod query;

pub use config::QueryConfig;
pub use executor::{QueryIterator, StoreExecutor};
pub use query::{Node, Query, QueryError, QueryResult};
