//! # tableq
//!
//! A persistent FIFO (and optionally priority-ordered) byte queue whose
//! backing store is a table in an external SQL database.
//!
//! ## Features
//!
//! - **One statement per operation**: every enqueue, dequeue, peek, and
//!   count maps to a single atomic SQL statement — no application-level
//!   queue lock, no row handed to two dequeuers
//! - **FIFO or priority ordering**: insertion order by surrogate key, or
//!   priority-descending with an insertion-order tie-break
//! - **Uniform contract**: the same [`QueueBackend`] trait is served by
//!   the SQL engine and an in-memory implementation
//! - **Bounded operations**: a per-operation timeout and a session
//!   lifetime token cancel in-flight statements on shutdown
//! - **Typed failures plus a side channel**: operations return
//!   [`QueueResult`], and every failure is also dispatched to an optional
//!   error handler
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tableq::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> QueueResult<()> {
//!     let config = QueueConfig::default()
//!         .with_table("jobs")
//!         .with_create_table(true);
//!
//!     let queue = SqlQueue::connect(config).await?;
//!
//!     queue.enqueue(Item::from("first job")).await?;
//!     queue.enqueue(Item::from("second job")).await?;
//!
//!     while let Some(payload) = queue.dequeue().await? {
//!         println!("got {} bytes", payload.len());
//!     }
//!
//!     queue.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod payload;
pub mod queue;
pub mod reporter;

pub mod prelude {
    pub use crate::config::QueueConfig;
    pub use crate::error::{ErrorHandler, QueueError, QueueResult};
    pub use crate::payload::{BinaryEncode, DEFAULT_PRIORITY, Item, Payload};
    pub use crate::queue::{ByteQueue, InMemoryQueue, PriorityEnqueuer, QueueBackend, SqlQueue};
    pub use crate::reporter::{channel_handler, log_handler};
    pub use async_trait::async_trait;
}

pub use crate::config::QueueConfig;
pub use crate::error::{ErrorHandler, QueueError, QueueResult};
pub use crate::payload::{BinaryEncode, Item, Payload};
pub use crate::queue::{ByteQueue, InMemoryQueue, PriorityEnqueuer, QueueBackend, SqlQueue};
pub use async_trait::async_trait;
