//! K-way merge over branch result streams
//!
//! Each branch of a multi-query runs as its own producer task writing into
//! a bounded channel; the merger keeps one head record per branch and
//! always emits the smallest head under the query order. The order is
//! total (ties fall back to the key), so copies of a record matching
//! several branches reach the frontier back to back; only the last
//! emitted key is remembered to drop them.
//!
//! A single branch is polled in place without spawning.

use std::cmp::Ordering;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::model::{Entity, Key};
use crate::observability::{log_event_with_fields, Event, QueryMetrics};
use crate::planner::{BranchQuery, SortSpec};
use crate::query::PostFilterPredicate;

use super::errors::{StoreError, StoreResult};
use super::filters::PredicateFilter;
use super::sorter::SortOrder;
use super::store::{EntityStream, StoreExecutor};

enum BranchSource {
    /// Polled directly by the consumer
    Inline {
        stream: EntityStream,
        post_filters: Vec<PostFilterPredicate>,
    },
    /// Fed by a producer task
    Channel(mpsc::Receiver<StoreResult<Entity>>),
}

struct Slot {
    index: usize,
    source: BranchSource,
    head: Option<Entity>,
    open: bool,
}

impl Slot {
    /// Pull the next record into `head` unless one is already buffered
    async fn refill(&mut self) -> StoreResult<()> {
        if !self.open || self.head.is_some() {
            return Ok(());
        }
        let next = match &mut self.source {
            BranchSource::Channel(rx) => rx.recv().await,
            BranchSource::Inline {
                stream,
                post_filters,
            } => next_accepted(self.index, stream, post_filters).await,
        };
        match next {
            Some(Ok(entity)) => {
                self.head = Some(entity);
                Ok(())
            }
            Some(Err(err)) => {
                self.open = false;
                Err(err)
            }
            None => {
                self.open = false;
                Ok(())
            }
        }
    }
}

/// Merges branch streams into one ordered, duplicate-free stream
pub struct Merger {
    orders: Vec<SortSpec>,
    slots: Vec<Slot>,
    producers: Vec<JoinHandle<()>>,
    last_emitted: Option<Key>,
}

impl Merger {
    /// Issues every branch to `executor` and starts pulling results.
    ///
    /// At most `max_concurrency` branches wait on the store at once; each
    /// branch buffers up to `batch_size` records ahead of the consumer.
    /// Must be called from within a tokio runtime when there is more than
    /// one branch.
    pub fn start(
        executor: &Arc<dyn StoreExecutor>,
        branches: Vec<BranchQuery>,
        orders: Vec<SortSpec>,
        max_concurrency: usize,
        batch_size: usize,
    ) -> Self {
        QueryMetrics::global().add_branches_issued(branches.len() as u64);

        let mut slots = Vec::with_capacity(branches.len());
        let mut producers = Vec::new();

        if branches.len() == 1 {
            for branch in branches {
                log_branch_issued(0, &branch);
                slots.push(Slot {
                    index: 0,
                    source: BranchSource::Inline {
                        stream: executor.execute(branch.query),
                        post_filters: branch.post_filters,
                    },
                    head: None,
                    open: true,
                });
            }
        } else {
            let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
            for (index, branch) in branches.into_iter().enumerate() {
                log_branch_issued(index, &branch);
                let (tx, rx) = mpsc::channel(batch_size.max(1));
                let stream = executor.execute(branch.query);
                producers.push(tokio::spawn(produce(
                    index,
                    stream,
                    branch.post_filters,
                    tx,
                    Arc::clone(&permits),
                )));
                slots.push(Slot {
                    index,
                    source: BranchSource::Channel(rx),
                    head: None,
                    open: true,
                });
            }
        }

        Self {
            orders,
            slots,
            producers,
            last_emitted: None,
        }
    }

    pub fn branch_count(&self) -> usize {
        self.slots.len()
    }

    /// Next record in merged order, or `None` once every branch is done.
    ///
    /// A branch error is returned as soon as it reaches the frontier.
    pub async fn next(&mut self) -> StoreResult<Option<Entity>> {
        loop {
            for slot in self.slots.iter_mut() {
                slot.refill().await?;
            }

            let Some(winner) = self.smallest_head() else {
                return Ok(None);
            };
            let Some(entity) = self.slots[winner].head.take() else {
                return Ok(None);
            };

            if self.last_emitted.as_ref() != Some(&entity.key) {
                self.last_emitted = Some(entity.key.clone());
                QueryMetrics::global().increment_records_merged();
                return Ok(Some(entity));
            }
            QueryMetrics::global().increment_duplicates_dropped();
        }
    }

    fn smallest_head(&self) -> Option<usize> {
        let mut best: Option<(usize, &Entity)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(head) = slot.head.as_ref() else {
                continue;
            };
            best = match best {
                Some((_, current))
                    if SortOrder::compare(head, current, &self.orders) != Ordering::Less =>
                {
                    best
                }
                _ => Some((i, head)),
            };
        }
        best.map(|(i, _)| i)
    }

    /// Abort every producer and drop all buffered records
    pub fn cancel(&mut self) {
        for producer in self.producers.drain(..) {
            producer.abort();
        }
        self.slots.clear();
        self.last_emitted = None;
    }
}

impl Drop for Merger {
    fn drop(&mut self) {
        for producer in &self.producers {
            producer.abort();
        }
    }
}

/// Next record from `stream` that passes the branch's post-filters
async fn next_accepted(
    index: usize,
    stream: &mut EntityStream,
    post_filters: &[PostFilterPredicate],
) -> Option<StoreResult<Entity>> {
    loop {
        match stream.next().await {
            Some(Ok(entity)) => {
                if PredicateFilter::matches_post_filters(&entity, post_filters) {
                    return Some(Ok(entity));
                }
                QueryMetrics::global().increment_post_filter_rejections();
            }
            Some(Err(err)) => {
                log_branch_failed(index, &err);
                return Some(Err(err));
            }
            None => {
                log_event_with_fields(Event::BranchExhausted, &[("branch", &index.to_string())]);
                return None;
            }
        }
    }
}

/// Producer task for one branch.
///
/// A permit is held only while waiting on the store, never while blocked
/// on a full channel, so a slow consumer cannot starve other branches.
async fn produce(
    index: usize,
    mut stream: EntityStream,
    post_filters: Vec<PostFilterPredicate>,
    tx: mpsc::Sender<StoreResult<Entity>>,
    permits: Arc<Semaphore>,
) {
    loop {
        let next = {
            let Ok(_permit) = permits.acquire().await else {
                return;
            };
            next_accepted(index, &mut stream, &post_filters).await
        };
        match next {
            Some(Ok(entity)) => {
                if tx.send(Ok(entity)).await.is_err() {
                    // consumer dropped
                    return;
                }
            }
            Some(Err(err)) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
            None => return,
        }
    }
}

fn log_branch_issued(index: usize, branch: &BranchQuery) {
    let filters = branch
        .query
        .filters
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" AND ");
    log_event_with_fields(
        Event::BranchIssued,
        &[("branch", &index.to_string()), ("filters", &filters)],
    );
}

fn log_branch_failed(index: usize, err: &StoreError) {
    QueryMetrics::global().increment_store_failures();
    log_event_with_fields(
        Event::BranchFailed,
        &[
            ("branch", &index.to_string()),
            ("code", err.code().code()),
            ("message", err.message()),
        ],
    );
}
