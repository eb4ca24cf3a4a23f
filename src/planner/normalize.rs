//! Filter normalization
//!
//! Rewrites a resolved filter tree into disjunctive normal form: a list
//! of primitive conjunctions whose OR is equivalent to the input.
//!
//! Steps, in order:
//! 1. `!=` becomes `(< v) OR (> v)`; `IN (v1..vn)` becomes `(= v1) OR ... OR (= vn)`
//! 2. AND is distributed over OR
//! 3. Duplicate comparisons within a branch and duplicate branches are dropped
//! 4. Each branch may constrain at most one property with range operators
//!
//! `False` contributes no branches; a tree that is entirely `False`
//! normalizes to an empty list.

use std::collections::BTreeSet;
use std::fmt;

use crate::model::Value;
use crate::query::{FilterNode, Node, Operator, PostFilterPredicate, QueryError, QueryResult};

/// A conjunction the store can execute directly, plus the predicates
/// that must be re-checked client-side
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conjunct {
    filters: Vec<FilterNode>,
    post_filters: Vec<PostFilterPredicate>,
}

impl Conjunct {
    pub fn new(filters: Vec<FilterNode>, post_filters: Vec<PostFilterPredicate>) -> Self {
        Self {
            filters,
            post_filters,
        }
    }

    pub fn filters(&self) -> &[FilterNode] {
        &self.filters
    }

    pub fn post_filters(&self) -> &[PostFilterPredicate] {
        &self.post_filters
    }

    /// Property constrained by range operators, if any
    pub fn inequality_property(&self) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.op().is_inequality())
            .map(|f| f.name())
    }

    fn push_filter(&mut self, filter: FilterNode) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    fn push_post_filter(&mut self, predicate: PostFilterPredicate) {
        if !self.post_filters.contains(&predicate) {
            self.post_filters.push(predicate);
        }
    }

    fn merged(&self, other: &Conjunct) -> Conjunct {
        let mut out = self.clone();
        for f in &other.filters {
            out.push_filter(f.clone());
        }
        for p in &other.post_filters {
            out.push_post_filter(p.clone());
        }
        out
    }

    fn validate(&self) -> QueryResult<()> {
        let props: BTreeSet<&str> = self
            .filters
            .iter()
            .filter(|f| f.op().is_inequality())
            .map(|f| f.name())
            .collect();
        if props.len() > 1 {
            let names: Vec<&str> = props.into_iter().collect();
            return Err(QueryError::bad_filter_combination(format!(
                "Inequality filters are limited to one property per query; found {}",
                names.join(", ")
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Conjunct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.filters.iter().map(|flt| flt.to_string()).collect();
        parts.extend(self.post_filters.iter().map(|p| format!("POST[{}]", p)));
        if parts.is_empty() {
            write!(f, "TRUE")
        } else {
            write!(f, "{}", parts.join(" AND "))
        }
    }
}

/// Converts filter trees into validated primitive conjunctions
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    max_branches: usize,
}

impl Normalizer {
    pub fn new(max_branches: usize) -> Self {
        Self { max_branches }
    }

    /// Normalizes `filters`; `None` means "match everything" and yields a
    /// single empty conjunction.
    pub fn normalize(&self, filters: Option<&Node>) -> QueryResult<Vec<Conjunct>> {
        let branches = match filters {
            None => vec![Conjunct::default()],
            Some(node) => self.dnf(node)?,
        };

        let mut unique: Vec<Conjunct> = Vec::with_capacity(branches.len());
        for branch in branches {
            if !unique.contains(&branch) {
                unique.push(branch);
            }
        }

        if unique.len() > self.max_branches {
            return Err(QueryError::bad_filter_combination(format!(
                "Filter expands to {} sub-queries (max {})",
                unique.len(),
                self.max_branches
            )));
        }

        for branch in &unique {
            branch.validate()?;
        }
        Ok(unique)
    }

    fn dnf(&self, node: &Node) -> QueryResult<Vec<Conjunct>> {
        match node {
            Node::False => Ok(Vec::new()),
            Node::Parameter(p) => Err(QueryError::bad_argument(format!(
                "Unbound parameter in filter {}; bind the query first",
                p
            ))),
            Node::Filter(f) => Ok(Self::expand_filter(f)),
            Node::PostFilter(p) => {
                let mut c = Conjunct::default();
                c.push_post_filter(p.predicate().clone());
                Ok(vec![c])
            }
            Node::Disjunction(d) => {
                let mut out = Vec::new();
                for operand in d.operands() {
                    out.extend(self.dnf(operand)?);
                }
                Ok(out)
            }
            Node::Conjunction(c) => {
                let mut children = Vec::with_capacity(c.operands().len());
                for operand in c.operands() {
                    let child = self.dnf(operand)?;
                    if child.is_empty() {
                        return Ok(Vec::new());
                    }
                    children.push(child);
                }
                self.distribute(children)
            }
        }
    }

    /// AND of several DNFs: the cross product of their branches
    fn distribute(&self, children: Vec<Vec<Conjunct>>) -> QueryResult<Vec<Conjunct>> {
        let bound = self.max_branches.saturating_mul(self.max_branches).max(1);
        let mut acc = vec![Conjunct::default()];
        for child in children {
            let mut next = Vec::with_capacity(acc.len() * child.len());
            for left in &acc {
                for right in &child {
                    let merged = left.merged(right);
                    if !next.contains(&merged) {
                        next.push(merged);
                    }
                }
            }
            if next.len() > bound {
                return Err(QueryError::bad_filter_combination(format!(
                    "Filter expansion exceeds {} intermediate branches",
                    bound
                )));
            }
            acc = next;
        }
        Ok(acc)
    }

    fn expand_filter(filter: &FilterNode) -> Vec<Conjunct> {
        let single = |f: FilterNode| Conjunct::new(vec![f], Vec::new());
        match filter.op() {
            Operator::Ne => vec![
                single(FilterNode::lt(filter.name(), filter.value().clone())),
                single(FilterNode::gt(filter.name(), filter.value().clone())),
            ],
            Operator::In => {
                let mut seen: Vec<&Value> = Vec::new();
                let mut out = Vec::new();
                for v in filter.value().elements() {
                    if seen.contains(&v) {
                        continue;
                    }
                    seen.push(v);
                    out.push(single(FilterNode::eq(filter.name(), v.clone())));
                }
                out
            }
            _ => vec![single(filter.clone())],
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_BRANCHES)
    }
}
