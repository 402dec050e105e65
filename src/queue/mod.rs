//! Queue backends for tableq.
//!
//! The queue contract is uniform across backends so callers stay agnostic
//! of the storage mechanism:
//! - **In-Memory**: process-local, no persistence; development and tests
//! - **SQL**: a relational table holds the entries; every operation is one
//!   atomic statement against the live connection
//!
//! # Examples
//!
//! ```rust,no_run
//! use tableq::prelude::*;
//!
//! # async fn demo() -> QueueResult<()> {
//! // In-memory queue
//! let queue = InMemoryQueue::new();
//! queue.enqueue(Item::from("job")).await?;
//!
//! // SQL-backed queue
//! let queue = SqlQueue::connect(QueueConfig::default().with_create_table(true)).await?;
//! queue.enqueue(Item::from("job")).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::payload::{Item, Payload};

pub mod memory;
pub use memory::InMemoryQueue;

pub mod sql;
pub use sql::SqlQueue;

/// The uniform queue contract all backends implement.
///
/// Single-item reads return `Ok(None)` on an empty queue (underflow);
/// batch reads return an empty collection. Both are distinct from errors,
/// which are returned typed and also dispatched to the backend's error
/// handler where one is registered.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append one item to the tail of the queue.
    async fn enqueue(&self, item: Item) -> QueueResult<()>;

    /// Append a batch in order, all-or-nothing. An empty batch is a no-op
    /// success.
    async fn enqueue_multiple(&self, items: Vec<Item>) -> QueueResult<()>;

    /// Remove and return the head entry, or `None` if the queue is empty.
    async fn dequeue(&self) -> QueueResult<Option<Payload>>;

    /// Remove and return up to `n` entries in removal order.
    async fn dequeue_multiple(&self, n: usize) -> QueueResult<Vec<Payload>>;

    /// Remove and return every entry currently present.
    async fn flush(&self) -> QueueResult<Vec<Payload>>;

    /// Non-destructively read every entry, in the order dequeue would
    /// remove them.
    async fn peek(&self) -> QueueResult<Vec<Payload>>;

    /// Non-destructively read the entry dequeue would remove next.
    async fn peek_head(&self) -> QueueResult<Option<Payload>>;

    /// Non-destructively read up to `n` entries from the head.
    async fn peek_from_head(&self, n: usize) -> QueueResult<Vec<Payload>>;

    /// Number of entries currently in the queue.
    async fn length(&self) -> QueueResult<u64>;
}

/// Priority-aware enqueue, for backends configured with priority-ordered
/// removal.
#[async_trait]
pub trait PriorityEnqueuer: Send + Sync {
    /// Append one item with a priority; `None` means the default priority.
    async fn priority_enqueue(&self, item: Item, priority: Option<i64>) -> QueueResult<()>;

    /// Append a batch with priorities, all-or-nothing. One supplied
    /// priority applies to the whole batch; a 1:1 slice zips; any other
    /// arity uses the default priority throughout.
    async fn priority_enqueue_multiple(
        &self,
        items: Vec<Item>,
        priorities: &[i64],
    ) -> QueueResult<()>;
}

/// Convenient type alias for a boxed queue backend.
pub type ByteQueue = Box<dyn QueueBackend>;
