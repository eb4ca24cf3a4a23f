//! Observable query lifecycle events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events during query planning and iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Planning
    /// Parameters were bound into a query
    QueryBound,
    /// A query was normalized into branches
    QueryPlanned,
    /// Normalization or validation rejected a query
    QueryPlanRejected,

    // Branch execution
    /// A primitive query was issued to the store
    BranchIssued,
    /// A branch stream ended normally
    BranchExhausted,
    /// A branch stream reported a store error
    BranchFailed,

    // Iterator
    /// The iterator yielded its final record
    IteratorExhausted,
    /// The iterator was cancelled by its consumer
    IteratorCancelled,
    /// The iterator surfaced an error
    IteratorFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::QueryBound => "QUERY_BOUND",
            Event::QueryPlanned => "QUERY_PLANNED",
            Event::QueryPlanRejected => "QUERY_PLAN_REJECTED",
            Event::BranchIssued => "BRANCH_ISSUED",
            Event::BranchExhausted => "BRANCH_EXHAUSTED",
            Event::BranchFailed => "BRANCH_FAILED",
            Event::IteratorExhausted => "ITERATOR_EXHAUSTED",
            Event::IteratorCancelled => "ITERATOR_CANCELLED",
            Event::IteratorFailed => "ITERATOR_FAILED",
        }
    }

    /// Severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::BranchIssued | Event::BranchExhausted | Event::QueryBound => Severity::Trace,
            Event::QueryPlanned | Event::IteratorExhausted | Event::IteratorCancelled => {
                Severity::Info
            }
            Event::QueryPlanRejected => Severity::Warn,
            Event::BranchFailed | Event::IteratorFailed => Severity::Error,
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::QueryPlanRejected | Event::BranchFailed | Event::IteratorFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_screaming_snake() {
        for event in [
            Event::QueryBound,
            Event::QueryPlanned,
            Event::QueryPlanRejected,
            Event::BranchIssued,
            Event::BranchExhausted,
            Event::BranchFailed,
            Event::IteratorExhausted,
            Event::IteratorCancelled,
            Event::IteratorFailed,
        ] {
            let name = event.as_str();
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_failures_log_at_warn_or_above() {
        assert!(Event::BranchFailed.is_failure());
        assert!(Event::BranchFailed.severity() >= Severity::Warn);
        assert!(Event::QueryPlanRejected.severity() >= Severity::Warn);
        assert!(!Event::BranchIssued.is_failure());
        assert_eq!(Event::BranchIssued.severity(), Severity::Trace);
    }

    #[test]
    fn test_display_matches_as_str() {
        assert_eq!(Event::IteratorCancelled.to_string(), "ITERATOR_CANCELLED");
    }
}
