//! Result ordering
//!
//! Records are ordered by the explicit sort terms, then by key. For a
//! repeated property the smallest element is used when ascending and the
//! largest when descending. Records missing a sort property sort first.

use std::cmp::Ordering;

use crate::model::{Entity, Key, Value};
use crate::planner::{SortDirection, SortSpec};

/// Comparator shared by the in-memory store, the merger and cursors
pub struct SortOrder;

impl SortOrder {
    /// The value an entity sorts by for one sort term
    pub fn sort_value(entity: &Entity, spec: &SortSpec) -> Option<Value> {
        let values = entity.values_of(&spec.property);
        match spec.direction {
            SortDirection::Asc => values.into_iter().min(),
            SortDirection::Desc => values.into_iter().max(),
        }
    }

    /// The full position of an entity: one value per sort term
    pub fn position(entity: &Entity, orders: &[SortSpec]) -> Vec<Option<Value>> {
        orders.iter().map(|o| Self::sort_value(entity, o)).collect()
    }

    /// Compares two entities under `orders`, tie-broken by key
    pub fn compare(a: &Entity, b: &Entity, orders: &[SortSpec]) -> Ordering {
        Self::compare_positions(
            &Self::position(a, orders),
            &a.key,
            &Self::position(b, orders),
            &b.key,
            orders,
        )
    }

    /// Compares two precomputed positions
    pub fn compare_positions(
        a_values: &[Option<Value>],
        a_key: &Key,
        b_values: &[Option<Value>],
        b_key: &Key,
        orders: &[SortSpec],
    ) -> Ordering {
        for ((spec, a), b) in orders.iter().zip(a_values).zip(b_values) {
            let ordering = a.cmp(b);
            let ordering = match spec.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a_key.cmp(b_key)
    }

    /// Sorts entities in place
    pub fn sort(entities: &mut [Entity], orders: &[SortSpec]) {
        entities.sort_by(|a, b| Self::compare(a, b, orders));
    }
}
