//! Low-level store error types
//!
//! Error codes:
//! - DSQ_STORE_TIMEOUT (retryable)
//! - DSQ_STORE_TRANSPORT (retryable)
//! - DSQ_STORE_INTERNAL
//!
//! Retry policy belongs to the store; the merger never retries.

use std::fmt;

/// Store error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Deadline exceeded
    Timeout,
    /// Connection or RPC failure
    Transport,
    /// Any other store-side failure
    Internal,
}

impl StoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::Timeout => "DSQ_STORE_TIMEOUT",
            StoreErrorCode::Transport => "DSQ_STORE_TRANSPORT",
            StoreErrorCode::Internal => "DSQ_STORE_INTERNAL",
        }
    }

    /// Whether a caller may reasonably retry the whole query
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreErrorCode::Internal)
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error reported by a low-level store execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Transport, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Internal, message)
    }

    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl std::error::Error for StoreError {}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreErrorCode::Timeout.code(), "DSQ_STORE_TIMEOUT");
        assert_eq!(StoreErrorCode::Transport.code(), "DSQ_STORE_TRANSPORT");
        assert_eq!(StoreErrorCode::Internal.code(), "DSQ_STORE_INTERNAL");
    }

    #[test]
    fn test_retryable() {
        assert!(StoreError::timeout("slow").is_retryable());
        assert!(StoreError::transport("reset").is_retryable());
        assert!(!StoreError::internal("bug").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::transport("connection reset");
        let display = format!("{}", err);
        assert!(display.contains("DSQ_STORE_TRANSPORT"));
        assert!(display.contains("connection reset"));
    }
}
