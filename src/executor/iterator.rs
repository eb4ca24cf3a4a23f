//! The lazy result sequence handed to callers
//!
//! State machine:
//!
//! ```text
//! Pending → Fetching → (Yielding ⇄ Fetching) → Exhausted
//!              └────────────┴──────────────→ Failed
//! ```
//!
//! Branches are issued on the first advance. Offset and limit apply to the
//! merged, deduplicated, post-filtered sequence. A store error moves the
//! iterator to `Failed`; every later advance reports that same error.

use std::fmt;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::model::Entity;
use crate::observability::{log_event_with_fields, Event};
use crate::planner::QueryPlan;
use crate::query::{FetchOptions, QueryError, QueryResult};

use super::cursor::Cursor;
use super::errors::StoreError;
use super::merger::Merger;
use super::store::StoreExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    /// No branch issued yet
    Pending,
    /// Waiting on one or more branches to refill the frontier
    Fetching,
    /// Just handed a record to the caller
    Yielding,
    /// Terminal: everything drained, or cancelled
    Exhausted,
    /// Terminal: a branch failed
    Failed,
}

impl IteratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IteratorState::Exhausted | IteratorState::Failed)
    }
}

impl fmt::Display for IteratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IteratorState::Pending => "pending",
            IteratorState::Fetching => "fetching",
            IteratorState::Yielding => "yielding",
            IteratorState::Exhausted => "exhausted",
            IteratorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Merged results of a planned query.
///
/// Single owner; advance it from one task at a time.
pub struct QueryIterator {
    executor: Arc<dyn StoreExecutor>,
    plan: QueryPlan,
    options: FetchOptions,
    state: IteratorState,
    merger: Option<Merger>,
    skipped: usize,
    yielded: usize,
    last_position: Option<Cursor>,
    failure: Option<StoreError>,
}

impl QueryIterator {
    pub fn new(executor: Arc<dyn StoreExecutor>, plan: QueryPlan, options: FetchOptions) -> Self {
        Self {
            executor,
            plan,
            options,
            state: IteratorState::Pending,
            merger: None,
            skipped: 0,
            yielded: 0,
            last_position: None,
            failure: None,
        }
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Number of records handed out so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Next record, `Ok(None)` once exhausted.
    pub async fn advance(&mut self) -> QueryResult<Option<Entity>> {
        match self.state {
            IteratorState::Exhausted => return Ok(None),
            IteratorState::Failed => return Err(self.failure_error()),
            _ => {}
        }

        if self.options.limit.is_some_and(|limit| self.yielded >= limit) {
            self.finish();
            return Ok(None);
        }

        if self.state == IteratorState::Pending {
            if self.plan.is_empty() {
                self.finish();
                return Ok(None);
            }
            self.merger = Some(self.start_merger());
        }

        loop {
            self.state = IteratorState::Fetching;
            let next = match self.merger.as_mut() {
                Some(merger) => merger.next().await,
                None => Ok(None),
            };

            match next {
                Ok(Some(entity)) => {
                    if self.skipped < self.options.offset {
                        self.skipped += 1;
                        continue;
                    }
                    self.yielded += 1;
                    self.last_position = Some(Cursor::at(&entity, &self.plan.orders));
                    self.state = IteratorState::Yielding;
                    return Ok(Some(entity));
                }
                Ok(None) => {
                    self.finish();
                    return Ok(None);
                }
                Err(err) => {
                    self.fail(err);
                    return Err(self.failure_error());
                }
            }
        }
    }

    /// Up to `n` records.
    ///
    /// If a branch fails after some records were collected, those records
    /// are returned and the error is reported by the following call.
    pub async fn next_batch(&mut self, n: usize) -> QueryResult<Vec<Entity>> {
        let mut batch = Vec::with_capacity(n.min(self.options.batch_size.max(1)));
        while batch.len() < n {
            match self.advance().await {
                Ok(Some(entity)) => batch.push(entity),
                Ok(None) => break,
                Err(err) if batch.is_empty() => return Err(err),
                Err(_) => break,
            }
        }
        Ok(batch)
    }

    /// Drain everything that is left
    pub async fn collect(mut self) -> QueryResult<Vec<Entity>> {
        let mut out = Vec::new();
        while let Some(entity) = self.advance().await? {
            out.push(entity);
        }
        Ok(out)
    }

    /// Adapt into a stream that ends after the first error
    pub fn into_stream(self) -> BoxStream<'static, QueryResult<Entity>> {
        stream::unfold(Some(self), |state| async move {
            let mut iter = state?;
            match iter.advance().await {
                Ok(Some(entity)) => Some((Ok(entity), Some(iter))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
        .boxed()
    }

    /// Position just after the last yielded record.
    ///
    /// Passing it as `FetchOptions::start_cursor` to the same query
    /// resumes with the next record.
    pub fn cursor_after_current(&self) -> Option<Cursor> {
        self.last_position.clone()
    }

    /// Stop all outstanding branch work and release buffered records.
    ///
    /// A cancelled iterator is `Exhausted`, not `Failed`.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if let Some(mut merger) = self.merger.take() {
            merger.cancel();
        }
        self.state = IteratorState::Exhausted;
        log_event_with_fields(
            Event::IteratorCancelled,
            &[("yielded", &self.yielded.to_string())],
        );
    }

    fn start_merger(&self) -> Merger {
        let branches = self.plan.primitive_queries(
            self.options.limit,
            self.options.offset,
            self.options.start_cursor.as_ref(),
        );
        Merger::start(
            &self.executor,
            branches,
            self.plan.orders.clone(),
            self.options.max_concurrency,
            self.options.batch_size,
        )
    }

    fn finish(&mut self) {
        if let Some(mut merger) = self.merger.take() {
            merger.cancel();
        }
        self.state = IteratorState::Exhausted;
        log_event_with_fields(
            Event::IteratorExhausted,
            &[
                ("branches", &self.plan.branches.len().to_string()),
                ("yielded", &self.yielded.to_string()),
            ],
        );
    }

    fn fail(&mut self, err: StoreError) {
        if let Some(mut merger) = self.merger.take() {
            merger.cancel();
        }
        log_event_with_fields(
            Event::IteratorFailed,
            &[("code", err.code().code()), ("message", err.message())],
        );
        self.failure = Some(err);
        self.state = IteratorState::Failed;
    }

    fn failure_error(&self) -> QueryError {
        match &self.failure {
            Some(err) => QueryError::Store(err.clone()),
            None => QueryError::Store(StoreError::internal("iterator failed")),
        }
    }
}

impl fmt::Debug for QueryIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIterator")
            .field("state", &self.state)
            .field("branches", &self.plan.branches.len())
            .field("yielded", &self.yielded)
            .finish()
    }
}
