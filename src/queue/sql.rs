//! SQL-backed queue implementation for tableq.
//!
//! Entries live as rows of a relational table; the rows are the sole
//! representation of the queue, with no in-process index or cache. Every
//! operation maps to exactly one parameterized statement, so correctness
//! under concurrent callers rests on the database's per-statement
//! atomicity — a combined delete-and-return statement can never hand the
//! same row to two dequeuers.
//!
//! # Session lifecycle
//!
//! `configure` → `initialize` → operate → `shutdown`. Initialize opens the
//! pool (failing fast if the first connection cannot be established),
//! optionally creates the backing table, and spawns a watchdog task that
//! ties shutdown signaling to cancellation of the session's lifetime
//! token. Shutdown signals the watchdog, awaits its exit, then closes the
//! pool; re-initializing afterwards is permitted.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{PriorityEnqueuer, QueueBackend};
use crate::config::QueueConfig;
use crate::error::{ErrorHandler, QueueError, QueueResult};
use crate::payload::{
    DEFAULT_PRIORITY, Item, Payload, convert_multiple, convert_multiple_with_priority,
    convert_single,
};

/// A persistent queue backed by a SQL table.
///
/// Data operations are safe to call concurrently with each other; each one
/// runs as a single atomic statement on its own pooled session.
/// `configure`/`initialize`/`shutdown` must not be called concurrently
/// with one another.
pub struct SqlQueue {
    session: RwLock<Session>,
    handler: RwLock<Option<ErrorHandler>>,
}

/// Session state: `config` present means configured, `runtime` present
/// means running.
#[derive(Default)]
struct Session {
    config: Option<QueueConfig>,
    runtime: Option<Runtime>,
}

/// The started half of a session. Dropped as a unit at shutdown.
struct Runtime {
    pool: MySqlPool,
    /// Lifetime context every statement is guarded by
    lifetime: CancellationToken,
    /// Fires the watchdog; consumed at shutdown
    stopper: oneshot::Sender<()>,
    watchdog: JoinHandle<()>,
    table: String,
    with_priority: bool,
    query_timeout_secs: i64,
}

/// Per-operation snapshot of the running session, taken under the read
/// lock and released before the statement executes.
struct OpContext {
    pool: MySqlPool,
    lifetime: CancellationToken,
    table: String,
    with_priority: bool,
    query_timeout_secs: i64,
}

impl SqlQueue {
    /// Create an unconfigured queue handle.
    pub fn new() -> Self {
        Self {
            session: RwLock::new(Session::default()),
            handler: RwLock::new(None),
        }
    }

    /// Configure and initialize in one call.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let queue = Self::new();
        queue.configure(config).await?;
        queue.initialize().await?;
        Ok(queue)
    }

    /// Validate and store the configuration.
    ///
    /// Fails with [`QueueError::AlreadyStarted`] while the session is
    /// running: configuration is frozen once initialize succeeds.
    pub async fn configure(&self, config: QueueConfig) -> QueueResult<()> {
        config.validate()?;
        let mut session = self.session.write().await;
        if session.runtime.is_some() {
            return Err(QueueError::AlreadyStarted);
        }
        session.config = Some(config);
        Ok(())
    }

    /// Open the connection pool, optionally create the backing table, and
    /// start the session watchdog.
    ///
    /// The pool establishes its first connection eagerly, so an
    /// unreachable or misconfigured server fails here with
    /// [`QueueError::Connection`] rather than on the first operation.
    pub async fn initialize(&self) -> QueueResult<()> {
        let mut session = self.session.write().await;
        if session.runtime.is_some() {
            return Err(QueueError::AlreadyStarted);
        }
        let config = session.config.clone().ok_or(QueueError::NotConfigured)?;

        let pool = MySqlPoolOptions::new()
            .connect(&config.connection_url())
            .await
            .map_err(|e| {
                QueueError::connection(
                    format!(
                        "failed to connect to {}:{}/{}",
                        config.hostname, config.port, config.database
                    ),
                    e,
                )
            })?;

        if config.create_table {
            sqlx::query(&create_table_sql(&config.table, config.with_priority))
                .execute(&pool)
                .await?;
        }

        let lifetime = CancellationToken::new();
        let (stopper, stop_rx) = oneshot::channel::<()>();
        let watchdog = tokio::spawn({
            let lifetime = lifetime.clone();
            async move {
                tokio::select! {
                    _ = stop_rx => lifetime.cancel(),
                    _ = lifetime.cancelled() => {}
                }
                tracing::debug!("session watchdog exited");
            }
        });

        session.runtime = Some(Runtime {
            pool,
            lifetime,
            stopper,
            watchdog,
            table: config.table.clone(),
            with_priority: config.with_priority,
            query_timeout_secs: config.query_timeout_secs,
        });

        tracing::info!(
            table = %config.table,
            with_priority = config.with_priority,
            "queue session started"
        );
        Ok(())
    }

    /// Stop the session: signal the watchdog, await its exit, close the
    /// pool, and detach the error handler.
    ///
    /// No-op if the session is not running; safe to call repeatedly.
    /// Shutdown-time failures go to the error handler, never to the
    /// caller. Any statement still in flight observes the cancelled
    /// lifetime token instead of running to its own timeout.
    pub async fn shutdown(&self) {
        let runtime = {
            let mut session = self.session.write().await;
            session.runtime.take()
        };
        let Some(runtime) = runtime else {
            return;
        };

        let _ = runtime.stopper.send(());
        if let Err(e) = runtime.watchdog.await {
            let err = QueueError::connection("session watchdog failed", e);
            self.report(&err).await;
        }
        runtime.pool.close().await;

        let mut handler = self.handler.write().await;
        *handler = None;

        tracing::info!("queue session shut down");
    }

    /// Shutdown and return the drained items.
    ///
    /// Always empty for the SQL backend: rows persist across sessions, so
    /// closing the handle leaves the queue contents in the table.
    pub async fn close(&self) -> Vec<Payload> {
        self.shutdown().await;
        Vec::new()
    }

    /// Replace the error handler. Callable at any time, including before
    /// initialize; shutdown detaches the current handler.
    pub async fn set_error_handler(&self, handler: ErrorHandler) {
        let mut slot = self.handler.write().await;
        *slot = Some(handler);
    }

    /// Remove the error handler.
    pub async fn clear_error_handler(&self) {
        let mut slot = self.handler.write().await;
        *slot = None;
    }

    /// Whether the session is currently running.
    pub async fn is_running(&self) -> bool {
        self.session.read().await.runtime.is_some()
    }

    /// Whether the session has a stored configuration.
    pub async fn is_configured(&self) -> bool {
        self.session.read().await.config.is_some()
    }

    async fn report(&self, err: &QueueError) {
        let handler = self.handler.read().await;
        if let Some(handler) = handler.as_ref() {
            handler(err);
        }
    }

    /// Dispatch a failed result to the error handler before returning it.
    async fn finish<T>(&self, result: QueueResult<T>) -> QueueResult<T> {
        if let Err(err) = &result {
            self.report(err).await;
        }
        result
    }

    async fn op_context(&self) -> QueueResult<OpContext> {
        let session = self.session.read().await;
        let runtime = session.runtime.as_ref().ok_or(QueueError::NotRunning)?;
        Ok(OpContext {
            pool: runtime.pool.clone(),
            lifetime: runtime.lifetime.clone(),
            table: runtime.table.clone(),
            with_priority: runtime.with_priority,
            query_timeout_secs: runtime.query_timeout_secs,
        })
    }

    async fn try_length(&self) -> QueueResult<u64> {
        let ctx = self.op_context().await?;
        let sql = count_sql(&ctx.table);
        let count: i64 = run_guarded(&ctx, async {
            let row = sqlx::query(&sql).fetch_one(&ctx.pool).await?;
            row.try_get(0).map_err(QueueError::Scan)
        })
        .await?;
        Ok(count as u64)
    }

    async fn try_insert(&self, payloads: Vec<Payload>) -> QueueResult<()> {
        if payloads.is_empty() {
            return Ok(());
        }
        let ctx = self.op_context().await?;
        let sql = insert_sql(&ctx.table, payloads.len());
        run_guarded(&ctx, async {
            let mut query = sqlx::query(&sql);
            for payload in &payloads {
                query = query.bind(payload.as_slice());
            }
            query.execute(&ctx.pool).await?;
            Ok(())
        })
        .await?;
        tracing::debug!(count = payloads.len(), table = %ctx.table, "enqueued");
        Ok(())
    }

    async fn try_insert_with_priority(&self, pairs: Vec<(Payload, i64)>) -> QueueResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let ctx = self.op_context().await?;
        let sql = insert_priority_sql(&ctx.table, pairs.len());
        run_guarded(&ctx, async {
            let mut query = sqlx::query(&sql);
            for (payload, priority) in &pairs {
                query = query.bind(payload.as_slice()).bind(*priority);
            }
            query.execute(&ctx.pool).await?;
            Ok(())
        })
        .await?;
        tracing::debug!(count = pairs.len(), table = %ctx.table, "enqueued with priority");
        Ok(())
    }

    /// Remove and return up to `limit` rows (all rows when `None`) as one
    /// atomic delete-and-return statement.
    async fn try_remove(&self, limit: Option<u64>) -> QueueResult<Vec<Payload>> {
        let ctx = self.op_context().await?;
        let sql = delete_sql(&ctx.table, ctx.with_priority, limit.is_some());
        run_guarded(&ctx, async {
            let mut query = sqlx::query(&sql);
            if let Some(n) = limit {
                query = query.bind(n);
            }
            let rows = query.fetch_all(&ctx.pool).await?;
            let mut payloads = Vec::with_capacity(rows.len());
            for row in rows {
                payloads.push(row.try_get("data").map_err(QueueError::Scan)?);
            }
            Ok(payloads)
        })
        .await
    }

    /// Non-destructively read up to `limit` rows (all rows when `None`) in
    /// the order [`Self::try_remove`] would remove them.
    async fn try_peek(&self, limit: Option<u64>) -> QueueResult<Vec<Payload>> {
        let ctx = self.op_context().await?;
        let sql = select_sql(&ctx.table, ctx.with_priority, limit.is_some());
        run_guarded(&ctx, async {
            let mut query = sqlx::query(&sql);
            if let Some(n) = limit {
                query = query.bind(n);
            }
            let rows = query.fetch_all(&ctx.pool).await?;
            let mut payloads = Vec::with_capacity(rows.len());
            for row in rows {
                payloads.push(row.try_get("data").map_err(QueueError::Scan)?);
            }
            Ok(payloads)
        })
        .await
    }
}

impl Default for SqlQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for SqlQueue {
    async fn enqueue(&self, item: Item) -> QueueResult<()> {
        let result = async {
            let payload = convert_single(item)?;
            self.try_insert(vec![payload]).await
        }
        .await;
        self.finish(result).await
    }

    async fn enqueue_multiple(&self, items: Vec<Item>) -> QueueResult<()> {
        let result = async {
            let payloads = convert_multiple(items)?;
            self.try_insert(payloads).await
        }
        .await;
        self.finish(result).await
    }

    async fn dequeue(&self) -> QueueResult<Option<Payload>> {
        let result = self.try_remove(Some(1)).await;
        self.finish(result).await.map(|mut p| p.pop())
    }

    async fn dequeue_multiple(&self, n: usize) -> QueueResult<Vec<Payload>> {
        let result = self.try_remove(Some(n as u64)).await;
        self.finish(result).await
    }

    async fn flush(&self) -> QueueResult<Vec<Payload>> {
        let result = self.try_remove(None).await;
        self.finish(result).await
    }

    async fn peek(&self) -> QueueResult<Vec<Payload>> {
        let result = self.try_peek(None).await;
        self.finish(result).await
    }

    async fn peek_head(&self) -> QueueResult<Option<Payload>> {
        let result = self.try_peek(Some(1)).await;
        self.finish(result).await.map(|mut p| p.pop())
    }

    async fn peek_from_head(&self, n: usize) -> QueueResult<Vec<Payload>> {
        let result = self.try_peek(Some(n as u64)).await;
        self.finish(result).await
    }

    async fn length(&self) -> QueueResult<u64> {
        let result = self.try_length().await;
        self.finish(result).await
    }
}

#[async_trait]
impl PriorityEnqueuer for SqlQueue {
    async fn priority_enqueue(&self, item: Item, priority: Option<i64>) -> QueueResult<()> {
        let result = async {
            let payload = convert_single(item)?;
            let priority = priority.unwrap_or(DEFAULT_PRIORITY);
            self.try_insert_with_priority(vec![(payload, priority)]).await
        }
        .await;
        self.finish(result).await
    }

    async fn priority_enqueue_multiple(
        &self,
        items: Vec<Item>,
        priorities: &[i64],
    ) -> QueueResult<()> {
        let result = async {
            let pairs = convert_multiple_with_priority(items, priorities)?;
            self.try_insert_with_priority(pairs).await
        }
        .await;
        self.finish(result).await
    }
}

/// Race `fut` against the session lifetime token and, when configured,
/// the per-operation timeout.
async fn run_guarded<T, F>(ctx: &OpContext, fut: F) -> QueueResult<T>
where
    F: Future<Output = QueueResult<T>>,
{
    let guarded = async {
        tokio::select! {
            _ = ctx.lifetime.cancelled() => Err(QueueError::Cancelled),
            result = fut => result,
        }
    };
    if ctx.query_timeout_secs > 0 {
        match tokio::time::timeout(Duration::from_secs(ctx.query_timeout_secs as u64), guarded)
            .await
        {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout {
                timeout_secs: ctx.query_timeout_secs,
            }),
        }
    } else {
        guarded.await
    }
}

fn count_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {table}")
}

fn insert_sql(table: &str, rows: usize) -> String {
    let values = vec!["(?)"; rows].join(",");
    format!("INSERT INTO {table} (data) VALUES {values}")
}

fn insert_priority_sql(table: &str, rows: usize) -> String {
    let values = vec!["(?,?)"; rows].join(",");
    format!("INSERT INTO {table} (data,priority) VALUES {values}")
}

fn delete_sql(table: &str, with_priority: bool, limited: bool) -> String {
    let order = if with_priority {
        "priority DESC, id ASC"
    } else {
        "id ASC"
    };
    let limit = if limited { " LIMIT ?" } else { "" };
    format!("DELETE FROM {table} ORDER BY {order}{limit} RETURNING data")
}

fn select_sql(table: &str, with_priority: bool, limited: bool) -> String {
    let order = if with_priority {
        "priority DESC, id ASC"
    } else {
        "id ASC"
    };
    let limit = if limited { " LIMIT ?" } else { "" };
    format!("SELECT data FROM {table} ORDER BY {order}{limit}")
}

fn create_table_sql(table: &str, with_priority: bool) -> String {
    if with_priority {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT, \
             data BLOB NOT NULL, \
             priority BIGINT NOT NULL DEFAULT 0, \
             PRIMARY KEY (id))"
        )
    } else {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT, \
             data BLOB NOT NULL, \
             PRIMARY KEY (id))"
        )
    }
}
