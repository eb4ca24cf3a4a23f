//! Query expression subsystem
//!
//! Filter trees, parameters and the `Query` descriptor.
//!
//! # Lifecycle
//!
//! 1. Build a `Query`; construction arguments are validated immediately
//! 2. `bind` resolves `Parameter`s and `ParameterizedFunction`s
//! 3. `plan` normalizes the filter tree into DNF branches
//! 4. `fetch` issues the branches and returns a `QueryIterator`

mod errors;
mod node;
mod options;
pub mod params;
mod query;

pub use errors::{QueryError, QueryResult};
pub use node::{
    ConjunctionNode, DisjunctionNode, FilterNode, Node, Operator, ParameterNode, PostFilterNode,
    PostFilterPredicate,
};
pub use options::FetchOptions;
pub use params::{
    Bindings, FunctionArg, ParamKey, Parameter, Parameterized, ParameterizedFunction,
    UsedParameters,
};
pub use query::{Ancestor, Query, QueryBuilder};
