//! Multi-Query Merge Tests
//!
//! Tests for merged execution against the in-memory store:
//! - OR / IN branches merge in key order without duplicates
//! - Unsatisfiable filters never reach the store
//! - Post-filters, limit, offset and cursors apply to the merged stream
//! - Store failures and cancellation end iteration cleanly

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dsquery::executor::{
    EntityStream, IteratorState, MemoryStore, PrimitiveQuery, StoreError, StoreExecutor,
};
use dsquery::model::{Entity, Key, Value};
use dsquery::observability::QueryMetrics;
use dsquery::query::{FetchOptions, FilterNode, Node, PostFilterPredicate, Query};
use futures_util::stream::{self, StreamExt};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn key(id: i64) -> Key {
    Key::new("app", [("Pet", id)])
}

fn pet(id: i64, species: impl Into<Value>) -> Entity {
    Entity::new(key(id)).with("species", species)
}

/// k1 dog, k2 cat, k3 bird, k5 both cat and dog
fn pet_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_entities(vec![
        pet(1, "dog"),
        pet(2, "cat"),
        pet(3, "bird"),
        pet(5, vec!["cat", "dog"]),
    ]))
}

fn keys(entities: &[Entity]) -> Vec<Key> {
    entities.iter().map(|e| e.key.clone()).collect()
}

fn cat_or_dog() -> Query {
    Query::builder()
        .kind("Pet")
        .filters(Node::from(FilterNode::eq("species", "cat")) | FilterNode::eq("species", "dog").into())
        .build()
        .unwrap()
}

/// Fails every branch whose filters mention `poison`
struct PoisonedStore {
    inner: MemoryStore,
    poison: &'static str,
}

impl StoreExecutor for PoisonedStore {
    fn execute(&self, query: PrimitiveQuery) -> EntityStream {
        let poisoned = query
            .filters
            .iter()
            .any(|f| f.value() == &Value::from(self.poison));
        let mut results: Vec<_> = self.inner.run(&query).into_iter().map(Ok).collect();
        if poisoned {
            results.push(Err(StoreError::transport("connection reset")));
        }
        stream::iter(results).boxed()
    }
}

/// Counts how many streams were opened
struct CountingStore {
    inner: MemoryStore,
    opened: AtomicUsize,
}

impl StoreExecutor for CountingStore {
    fn execute(&self, query: PrimitiveQuery) -> EntityStream {
        self.opened.fetch_add(1, Ordering::SeqCst);
        stream::iter(self.inner.run(&query).into_iter().map(Ok).collect::<Vec<_>>()).boxed()
    }
}

/// Delays every record of branches whose filters mention `slow`
struct DelayedStore {
    inner: MemoryStore,
    slow: &'static str,
    delay: Duration,
}

impl StoreExecutor for DelayedStore {
    fn execute(&self, query: PrimitiveQuery) -> EntityStream {
        let slow = query
            .filters
            .iter()
            .any(|f| f.value() == &Value::from(self.slow));
        let results = stream::iter(self.inner.run(&query).into_iter().map(Ok).collect::<Vec<_>>());
        if !slow {
            return results.boxed();
        }
        let delay = self.delay;
        results
            .then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            })
            .boxed()
    }
}

// =============================================================================
// Merge and Dedup Tests
// =============================================================================

/// species = cat OR species = dog merges to [k1, k2, k5].
#[tokio::test]
async fn test_or_merges_in_key_order_without_duplicates() {
    let store = pet_store();
    let query = cat_or_dog();

    let plan = query.plan(30).unwrap();
    assert_eq!(plan.branches.len(), 2);

    let results = query.fetch_all(store.clone(), FetchOptions::default()).await.unwrap();
    assert_eq!(keys(&results), vec![key(1), key(2), key(5)]);
    assert_eq!(store.execution_count(), 2);
}

/// A slow branch holding the smallest keys still comes out first.
#[tokio::test]
async fn test_merge_order_independent_of_arrival() {
    let store = Arc::new(DelayedStore {
        inner: MemoryStore::with_entities(vec![
            pet(1, "dog"),
            pet(2, "cat"),
            pet(3, "bird"),
            pet(5, vec!["cat", "dog"]),
        ]),
        slow: "dog",
        delay: Duration::from_millis(25),
    });

    for max_concurrency in [1, 2] {
        let options = FetchOptions::default()
            .with_max_concurrency(max_concurrency)
            .with_batch_size(1);
        let results = cat_or_dog().fetch_all(store.clone(), options).await.unwrap();
        assert_eq!(keys(&results), vec![key(1), key(2), key(5)]);
    }
}

/// IN with repeated values produces one branch per distinct value.
#[tokio::test]
async fn test_in_dedup() {
    let store = pet_store();
    let query = Query::builder()
        .kind("Pet")
        .filters(FilterNode::is_in("species", ["cat", "dog", "cat"]))
        .build()
        .unwrap();

    assert_eq!(query.plan(30).unwrap().branches.len(), 2);

    let before = QueryMetrics::global().snapshot().duplicates_dropped;
    let results = query.fetch_all(store, FetchOptions::default()).await.unwrap();
    assert_eq!(keys(&results), vec![key(1), key(2), key(5)]);
    assert!(QueryMetrics::global().snapshot().duplicates_dropped > before);
}

/// Empty IN is unsatisfiable: no branch is issued.
#[tokio::test]
async fn test_unsatisfiable_query_skips_store() {
    let store = pet_store();
    let empty: Vec<Value> = Vec::new();
    let query = Query::builder()
        .kind("Pet")
        .filters(FilterNode::is_in("species", empty))
        .build()
        .unwrap();

    let mut iter = query.iter(store.clone()).unwrap();
    assert!(iter.advance().await.unwrap().is_none());
    assert_eq!(iter.state(), IteratorState::Exhausted);
    assert_eq!(store.execution_count(), 0);
}

/// != expands to two range branches; the merged result excludes the value.
#[tokio::test]
async fn test_not_equal_expansion() {
    let store = pet_store();
    let query = Query::builder()
        .kind("Pet")
        .filters(FilterNode::ne("species", "cat"))
        .build()
        .unwrap();

    assert_eq!(query.plan(30).unwrap().branches.len(), 2);
    let results = query.fetch_all(store, FetchOptions::default()).await.unwrap();
    // k5 has "dog" as well, which is != "cat"
    assert_eq!(keys(&results), vec![key(1), key(3), key(5)]);
}

/// Many branches with a fan-out of one still yield every record.
#[tokio::test]
async fn test_concurrency_cap_of_one() {
    let store = Arc::new(CountingStore {
        inner: MemoryStore::with_entities((1..=10).map(|i| pet(i, format!("s{}", i % 5)))),
        opened: AtomicUsize::new(0),
    });
    let query = Query::builder()
        .kind("Pet")
        .filters(FilterNode::is_in("species", ["s0", "s1", "s2", "s3", "s4"]))
        .build()
        .unwrap();

    let options = FetchOptions::default().with_max_concurrency(1).with_batch_size(1);
    let results = query.fetch_all(store.clone(), options).await.unwrap();

    assert_eq!(keys(&results), (1..=10).map(key).collect::<Vec<_>>());
    assert_eq!(store.opened.load(Ordering::SeqCst), 5);
}

// =============================================================================
// Post-filter Tests
// =============================================================================

/// A structured post-filter rejects records whose matches come from
/// different elements of the repeated property.
#[tokio::test]
async fn test_repeated_structured_post_filter() {
    let store = Arc::new(MemoryStore::with_entities(vec![
        Entity::new(key(1)).with(
            "toys",
            Value::from(json!([{"color": "red", "kind": "ball"}, {"color": "blue", "kind": "rope"}])),
        ),
        Entity::new(key(2)).with(
            "toys",
            Value::from(json!([{"color": "red", "kind": "rope"}])),
        ),
    ]));

    let mut wanted = BTreeMap::new();
    wanted.insert("color".to_string(), Value::from("red"));
    wanted.insert("kind".to_string(), Value::from("rope"));

    let filters = Node::and([
        FilterNode::eq("toys.color", "red").into(),
        FilterNode::eq("toys.kind", "rope").into(),
        Node::post_filter(PostFilterPredicate::RepeatedStructured {
            property: "toys".to_string(),
            matches: wanted,
        }),
    ])
    .unwrap();
    let query = Query::builder().kind("Pet").filters(filters).build().unwrap();

    let before = QueryMetrics::global().snapshot().post_filter_rejections;
    let results = query.fetch_all(store, FetchOptions::default()).await.unwrap();
    assert_eq!(keys(&results), vec![key(2)]);
    assert!(QueryMetrics::global().snapshot().post_filter_rejections > before);
}

/// Post-filtered records do not count toward the limit.
#[tokio::test]
async fn test_post_filter_rejections_do_not_consume_limit() {
    let store = Arc::new(MemoryStore::with_entities(
        (1..=6).map(|i| Entity::new(key(i)).with("age", i)),
    ));
    let filters = Node::from(FilterNode::gt("age", 0i64))
        & Node::post_filter(PostFilterPredicate::Compare {
            property: "age".to_string(),
            op: "IN".parse().unwrap(),
            value: Value::from(vec![2i64, 4, 6]),
        });
    let query = Query::builder().kind("Pet").filters(filters).build().unwrap();

    let results = query
        .fetch_all(store, FetchOptions::default().with_limit(2))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec![key(2), key(4)]);
}

// =============================================================================
// Limit, Offset and Cursor Tests
// =============================================================================

/// Offset and limit count merged, deduplicated records.
#[tokio::test]
async fn test_offset_and_limit_on_merged_stream() {
    let query = cat_or_dog();
    let results = query
        .fetch_all(pet_store(), FetchOptions::default().with_offset(1).with_limit(1))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec![key(2)]);
}

/// Paging with cursors visits every record exactly once.
#[tokio::test]
async fn test_cursor_paging() {
    let store = pet_store();
    let query = cat_or_dog();

    let mut pages = Vec::new();
    let mut cursor = None;
    loop {
        let mut options = FetchOptions::default().with_limit(2);
        if let Some(c) = cursor.take() {
            options = options.with_start_cursor(c);
        }
        let mut iter = query.fetch(store.clone(), options).unwrap();
        let page = iter.next_batch(2).await.unwrap();
        if page.is_empty() {
            break;
        }
        pages.extend(keys(&page));
        cursor = iter.cursor_after_current();
    }

    assert_eq!(pages, vec![key(1), key(2), key(5)]);
}

/// A cursor survives its web-safe string form.
#[tokio::test]
async fn test_cursor_token_resume() {
    let store = pet_store();
    let query = cat_or_dog();

    let mut iter = query.iter(store.clone()).unwrap();
    iter.advance().await.unwrap();
    let token = iter.cursor_after_current().unwrap().to_websafe_string().unwrap();
    drop(iter);

    let cursor = dsquery::executor::Cursor::from_websafe_string(&token).unwrap();
    let rest = query
        .fetch_all(store, FetchOptions::default().with_start_cursor(cursor))
        .await
        .unwrap();
    assert_eq!(keys(&rest), vec![key(2), key(5)]);
}

// =============================================================================
// Failure and Cancellation Tests
// =============================================================================

/// A failing branch moves the iterator to Failed and the error persists.
#[tokio::test]
async fn test_store_failure_surfaces() {
    let store = Arc::new(PoisonedStore {
        inner: MemoryStore::with_entities(vec![pet(1, "dog"), pet(2, "cat")]),
        poison: "dog",
    });
    let mut iter = cat_or_dog().iter(store).unwrap();

    let mut seen = Vec::new();
    let err = loop {
        match iter.advance().await {
            Ok(Some(entity)) => seen.push(entity.key),
            Ok(None) => panic!("iteration should fail"),
            Err(err) => break err,
        }
    };

    assert_eq!(err.code(), "DSQ_STORE");
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(iter.state(), IteratorState::Failed);
    assert!(iter.advance().await.is_err());
    assert!(seen.len() <= 2);
}

/// next_batch returns what it has, then reports the failure.
#[tokio::test]
async fn test_next_batch_partial_then_error() {
    let store = Arc::new(PoisonedStore {
        inner: MemoryStore::with_entities(vec![pet(1, "dog")]),
        poison: "dog",
    });
    let query = Query::builder()
        .kind("Pet")
        .filters(FilterNode::eq("species", "dog"))
        .build()
        .unwrap();
    let mut iter = query.iter(store).unwrap();

    let batch = iter.next_batch(5).await.unwrap();
    assert_eq!(keys(&batch), vec![key(1)]);
    assert!(iter.next_batch(5).await.is_err());
}

/// Cancelling mid-iteration ends without error.
#[tokio::test]
async fn test_cancel_mid_iteration() {
    let mut iter = cat_or_dog().iter(pet_store()).unwrap();
    assert!(iter.advance().await.unwrap().is_some());

    iter.cancel();
    assert_eq!(iter.state(), IteratorState::Exhausted);
    assert!(iter.advance().await.unwrap().is_none());
    assert!(iter.next_batch(3).await.unwrap().is_empty());
}

/// The iterator adapts into a futures stream.
#[tokio::test]
async fn test_into_stream() {
    let iter = cat_or_dog().iter(pet_store()).unwrap();
    let results: Vec<_> = iter.into_stream().collect().await;
    let keys: Vec<_> = results.into_iter().map(|r| r.unwrap().key).collect();
    assert_eq!(keys, vec![key(1), key(2), key(5)]);
}
