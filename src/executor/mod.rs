//! Query execution subsystem
//!
//! Turns a `QueryPlan` into a single ordered result sequence.
//!
//! # Execution Flow
//!
//! 1. Build one primitive query per DNF branch
//! 2. Issue every branch to the `StoreExecutor` (bounded fan-out)
//! 3. Re-check post-filters on each branch's records
//! 4. Merge branch streams by sort order, then key
//! 5. Drop keys already emitted
//! 6. Apply offset and limit
//!
//! # Invariants
//!
//! - Merged output is totally ordered regardless of arrival order
//! - Each key is emitted at most once
//! - Store errors are surfaced unchanged; nothing is retried here

mod cursor;
mod errors;
mod filters;
mod iterator;
mod memory;
mod merger;
mod sorter;
mod store;

pub use cursor::Cursor;
pub use errors::{StoreError, StoreErrorCode, StoreResult};
pub use filters::PredicateFilter;
pub use iterator::{IteratorState, QueryIterator};
pub use memory::MemoryStore;
pub use merger::Merger;
pub use sorter::SortOrder;
pub use store::{EntityStream, PrimitiveQuery, StoreExecutor};
