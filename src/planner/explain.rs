//! Explain output
//!
//! Deterministic, human-readable description of how a query will run.

use std::fmt;

use crate::query::QueryError;

use super::plan::QueryPlan;

/// Explain plan output
#[derive(Debug, Clone)]
pub struct ExplainPlan {
    /// Whether planning succeeded
    pub accepted: bool,
    pub kind: Option<String>,
    pub ancestor: Option<String>,
    /// One line per primitive query
    pub branches: Vec<String>,
    /// Ordering description
    pub orders: Vec<String>,
    /// Rejection reason (if rejected)
    pub rejection_reason: Option<String>,
    /// Rejection error code (if rejected)
    pub rejection_code: Option<String>,
}

impl ExplainPlan {
    pub fn from_plan(plan: &QueryPlan) -> Self {
        let mut orders: Vec<String> = plan
            .orders
            .iter()
            .map(|o| format!("{} {}", o.property, o.direction.as_str()))
            .collect();
        orders.push("__key__ asc".to_string());

        Self {
            accepted: true,
            kind: plan.kind.clone(),
            ancestor: plan.ancestor.as_ref().map(|k| k.to_string()),
            branches: plan.branches.iter().map(|b| b.to_string()).collect(),
            orders,
            rejection_reason: None,
            rejection_code: None,
        }
    }

    pub fn from_error(err: &QueryError) -> Self {
        Self {
            accepted: false,
            kind: None,
            ancestor: None,
            branches: Vec::new(),
            orders: Vec::new(),
            rejection_reason: Some(err.to_string()),
            rejection_code: Some(err.code().to_string()),
        }
    }

    pub fn is_multi_query(&self) -> bool {
        self.branches.len() > 1
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;

        if !self.accepted {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
            return Ok(());
        }

        writeln!(f, "Status: ACCEPTED")?;
        if let Some(kind) = &self.kind {
            writeln!(f, "Kind: {}", kind)?;
        }
        if let Some(ancestor) = &self.ancestor {
            writeln!(f, "Ancestor: {}", ancestor)?;
        }
        if self.branches.is_empty() {
            writeln!(f, "Branches: none (no possible matches)")?;
        } else {
            writeln!(f, "Branches: {}", self.branches.len())?;
            for branch in &self.branches {
                writeln!(f, "  - {}", branch)?;
            }
        }
        writeln!(f, "Order: {}", self.orders.join(", "))?;
        Ok(())
    }
}
