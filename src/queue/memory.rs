//! In-memory queue implementation for tableq.
//!
//! Process-local implementation of the same contract the SQL backend
//! serves: a monotonically increasing sequence stands in for the table's
//! surrogate key, so FIFO and priority ordering are identical to the SQL
//! engine's (`priority DESC, seq ASC` with the insertion-order tie-break).
//! Nothing survives a restart; use it for development, tests, and
//! single-process callers that don't need persistence.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PriorityEnqueuer, QueueBackend};
use crate::error::QueueResult;
use crate::payload::{
    DEFAULT_PRIORITY, Item, Payload, convert_multiple, convert_multiple_with_priority,
    convert_single,
};

/// One stored entry. `seq` plays the surrogate-key role.
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    priority: i64,
    payload: Payload,
}

#[derive(Debug, Default)]
struct State {
    entries: VecDeque<Entry>,
    next_seq: u64,
}

/// In-memory queue backend.
#[derive(Debug)]
pub struct InMemoryQueue {
    state: RwLock<State>,
    with_priority: bool,
}

impl InMemoryQueue {
    /// Create a FIFO-ordered in-memory queue.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            with_priority: false,
        }
    }

    /// Create a priority-ordered in-memory queue.
    pub fn with_priority() -> Self {
        Self {
            state: RwLock::new(State::default()),
            with_priority: true,
        }
    }

    async fn push_all(&self, pairs: Vec<(Payload, i64)>) {
        let count = pairs.len();
        let mut state = self.state.write().await;
        for (payload, priority) in pairs {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.push_back(Entry {
                seq,
                priority,
                payload,
            });
        }
        tracing::debug!(count, "enqueued");
    }

    /// Index of the entry dequeue removes next: max priority, earliest
    /// sequence on ties (entries are stored in sequence order, so the
    /// first strict maximum wins). FIFO mode is the front of the deque.
    fn head_index(&self, entries: &VecDeque<Entry>) -> Option<usize> {
        if entries.is_empty() {
            return None;
        }
        if !self.with_priority {
            return Some(0);
        }
        let mut best = 0;
        for (i, entry) in entries.iter().enumerate().skip(1) {
            if entry.priority > entries[best].priority {
                best = i;
            }
        }
        Some(best)
    }

    async fn remove(&self, limit: Option<usize>) -> Vec<Payload> {
        let mut state = self.state.write().await;
        let max = limit.unwrap_or(usize::MAX);
        let mut removed = Vec::new();
        while removed.len() < max {
            let Some(index) = self.head_index(&state.entries) else {
                break;
            };
            let Some(entry) = state.entries.remove(index) else {
                break;
            };
            removed.push(entry.payload);
        }
        removed
    }

    async fn snapshot(&self, limit: Option<usize>) -> Vec<Payload> {
        let state = self.state.read().await;
        let mut entries: Vec<Entry> = state.entries.iter().cloned().collect();
        if self.with_priority {
            entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        }
        if let Some(n) = limit {
            entries.truncate(n);
        }
        entries.into_iter().map(|e| e.payload).collect()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn enqueue(&self, item: Item) -> QueueResult<()> {
        let payload = convert_single(item)?;
        self.push_all(vec![(payload, DEFAULT_PRIORITY)]).await;
        Ok(())
    }

    async fn enqueue_multiple(&self, items: Vec<Item>) -> QueueResult<()> {
        let payloads = convert_multiple(items)?;
        let pairs = payloads
            .into_iter()
            .map(|p| (p, DEFAULT_PRIORITY))
            .collect();
        self.push_all(pairs).await;
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<Option<Payload>> {
        Ok(self.remove(Some(1)).await.pop())
    }

    async fn dequeue_multiple(&self, n: usize) -> QueueResult<Vec<Payload>> {
        Ok(self.remove(Some(n)).await)
    }

    async fn flush(&self) -> QueueResult<Vec<Payload>> {
        Ok(self.remove(None).await)
    }

    async fn peek(&self) -> QueueResult<Vec<Payload>> {
        Ok(self.snapshot(None).await)
    }

    async fn peek_head(&self) -> QueueResult<Option<Payload>> {
        Ok(self.snapshot(Some(1)).await.pop())
    }

    async fn peek_from_head(&self, n: usize) -> QueueResult<Vec<Payload>> {
        Ok(self.snapshot(Some(n)).await)
    }

    async fn length(&self) -> QueueResult<u64> {
        Ok(self.state.read().await.entries.len() as u64)
    }
}

#[async_trait]
impl PriorityEnqueuer for InMemoryQueue {
    async fn priority_enqueue(&self, item: Item, priority: Option<i64>) -> QueueResult<()> {
        let payload = convert_single(item)?;
        self.push_all(vec![(payload, priority.unwrap_or(DEFAULT_PRIORITY))])
            .await;
        Ok(())
    }

    async fn priority_enqueue_multiple(
        &self,
        items: Vec<Item>,
        priorities: &[i64],
    ) -> QueueResult<()> {
        let pairs = convert_multiple_with_priority(items, priorities)?;
        self.push_all(pairs).await;
        Ok(())
    }
}
