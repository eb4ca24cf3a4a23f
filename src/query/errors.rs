//! Query error types
//!
//! Construction errors are raised synchronously; binding errors when
//! parameters are resolved; combination errors during normalization.
//! Store failures pass through unchanged.

use thiserror::Error;

use crate::executor::StoreError;

use super::params::ParamKey;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Query errors
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed query construction
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bad binding supplied at bind time
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// A referenced parameter has no bound value
    #[error("Parameter :{key} is not bound.")]
    UnboundParameter { key: ParamKey },

    /// Unknown parameterized function name
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),

    /// The filter tree cannot be split into executable conjunctions
    #[error("Bad filter combination: {0}")]
    BadFilterCombination(String),

    /// Feature outside this layer's scope
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reported by the low-level store
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        QueryError::InvalidArgument(reason.into())
    }

    pub fn bad_argument(reason: impl Into<String>) -> Self {
        QueryError::BadArgument(reason.into())
    }

    pub fn bad_filter_combination(reason: impl Into<String>) -> Self {
        QueryError::BadFilterCombination(reason.into())
    }

    pub fn not_supported(reason: impl Into<String>) -> Self {
        QueryError::NotSupported(reason.into())
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidArgument(_) => "DSQ_INVALID_ARGUMENT",
            QueryError::BadArgument(_) => "DSQ_BAD_ARGUMENT",
            QueryError::UnboundParameter { .. } => "DSQ_UNBOUND_PARAMETER",
            QueryError::UnsupportedFunction(_) => "DSQ_UNSUPPORTED_FUNCTION",
            QueryError::BadFilterCombination(_) => "DSQ_BAD_FILTER_COMBINATION",
            QueryError::NotSupported(_) => "DSQ_NOT_SUPPORTED",
            QueryError::Config(_) => "DSQ_CONFIG",
            QueryError::Store(_) => "DSQ_STORE",
        }
    }

    /// True for unbound parameters and other bad bindings
    pub fn is_bad_argument(&self) -> bool {
        matches!(
            self,
            QueryError::BadArgument(_) | QueryError::UnboundParameter { .. }
        )
    }
}
