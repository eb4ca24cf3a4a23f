//! In-memory store
//!
//! Reference implementation of `StoreExecutor` over a key-ordered map.
//! Evaluates primitive queries the way an index-backed store would:
//! entities lacking a sort property are not indexed for that order and
//! are left out.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use futures_util::stream::{self, StreamExt};

use crate::model::{Entity, Key};

use super::filters::PredicateFilter;
use super::sorter::SortOrder;
use super::store::{EntityStream, PrimitiveQuery, StoreExecutor};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<Key, Entity>>,
    executions: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        for entity in entities {
            store.put(entity);
        }
        store
    }

    /// Inserts or replaces an entity
    pub fn put(&self, entity: Entity) {
        let mut guard = self.entities.write().unwrap_or_else(|p| p.into_inner());
        guard.insert(entity.key.clone(), entity);
    }

    pub fn len(&self) -> usize {
        self.entities.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of primitive queries executed so far
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    /// Evaluates a primitive query eagerly
    pub fn run(&self, query: &PrimitiveQuery) -> Vec<Entity> {
        let guard = self.entities.read().unwrap_or_else(|p| p.into_inner());
        let namespace = query.namespace.as_deref().unwrap_or("");

        let mut results: Vec<Entity> = guard
            .values()
            .filter(|e| query.kind.as_deref().map_or(true, |k| e.key.kind() == Some(k)))
            .filter(|e| query.app.as_deref().map_or(true, |a| e.key.app() == a))
            .filter(|e| e.key.namespace() == namespace)
            .filter(|e| query.ancestor.as_ref().map_or(true, |a| a.is_ancestor_of(&e.key)))
            .filter(|e| {
                query
                    .orders
                    .iter()
                    .all(|o| !e.values_of(&o.property).is_empty())
            })
            .filter(|e| PredicateFilter::matches(e, &query.filters))
            .cloned()
            .collect();
        drop(guard);

        SortOrder::sort(&mut results, &query.orders);

        if let Some(cursor) = &query.start_cursor {
            results.retain(|e| cursor.precedes(e, &query.orders));
        }
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        if let Some(projection) = &query.projection {
            for entity in &mut results {
                entity.properties.retain(|name, _| projection.contains(name));
            }
        }
        results
    }
}

impl StoreExecutor for MemoryStore {
    fn execute(&self, query: PrimitiveQuery) -> EntityStream {
        self.executions.fetch_add(1, Ordering::Relaxed);
        let results = self.run(&query);
        stream::iter(results.into_iter().map(Ok)).boxed()
    }
}
