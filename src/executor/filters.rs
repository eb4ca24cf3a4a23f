//! Predicate evaluation against entities
//!
//! Datastore semantics: a comparison on a repeated property matches if
//! any element matches. Range comparisons only match values of the same
//! type as the bound; no coercion.

use std::collections::BTreeMap;

use crate::model::{Entity, Value};
use crate::query::{FilterNode, Operator, PostFilterPredicate};

/// Evaluates filters and post-filter predicates
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if an entity matches all filters (AND semantics)
    pub fn matches(entity: &Entity, filters: &[FilterNode]) -> bool {
        filters
            .iter()
            .all(|f| Self::matches_comparison(entity, f.name(), f.op(), f.value()))
    }

    /// Checks if an entity passes every post-filter
    pub fn matches_post_filters(entity: &Entity, predicates: &[PostFilterPredicate]) -> bool {
        predicates.iter().all(|p| Self::matches_post_filter(entity, p))
    }

    pub fn matches_post_filter(entity: &Entity, predicate: &PostFilterPredicate) -> bool {
        match predicate {
            PostFilterPredicate::Compare {
                property,
                op,
                value,
            } => Self::matches_comparison(entity, property, *op, value),
            PostFilterPredicate::RepeatedStructured { property, matches } => entity
                .get(property)
                .map(|v| v.elements().iter().any(|elem| Self::structure_matches(elem, matches)))
                .unwrap_or(false),
        }
    }

    fn structure_matches(element: &Value, expected: &BTreeMap<String, Value>) -> bool {
        let fields = match element {
            Value::Map(fields) => fields,
            _ => return false,
        };
        expected.iter().all(|(name, want)| {
            fields
                .get(name)
                .map(|have| have.elements().iter().any(|h| h == want))
                .unwrap_or(false)
        })
    }

    fn matches_comparison(entity: &Entity, property: &str, op: Operator, bound: &Value) -> bool {
        let values = entity.values_of(property);
        match op {
            Operator::In => bound
                .elements()
                .iter()
                .any(|b| values.iter().any(|v| v == b)),
            // Some indexed value differs from the bound
            Operator::Ne => values.iter().any(|v| v != bound),
            _ => values.iter().any(|v| Self::compare(v, op, bound)),
        }
    }

    fn compare(actual: &Value, op: Operator, bound: &Value) -> bool {
        if op == Operator::Eq {
            return actual == bound;
        }
        if !Self::same_type(actual, bound) {
            return false;
        }
        match op {
            Operator::Lt => actual < bound,
            Operator::Le => actual <= bound,
            Operator::Gt => actual > bound,
            Operator::Ge => actual >= bound,
            _ => false,
        }
    }

    fn same_type(a: &Value, b: &Value) -> bool {
        matches!(
            (a, b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_))
        ) || std::mem::discriminant(a) == std::mem::discriminant(b)
    }
}
