//! Abstract database capabilities consumed by the run.
//!
//! The concrete PostgreSQL implementation lives in `rowtally-db`. Only traits
//! live here so the execution crate can be driven by any provider, including
//! in-memory stubs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::WorkItem;

pub type DbResult<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("connect to {target}: {message}")]
    Connect { target: String, message: String },

    #[error("liveness probe failed: {0}")]
    Ping(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("row scan failed: {0}")]
    Scan(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection already closed")]
    Closed,
}

/// A live handle that can run read-only queries.
///
/// Implementations are shared across tasks through `Arc`, so every method
/// takes `&self`; a handle that wraps a single physical connection must
/// serialize access internally.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Round-trip to the server; used right after opening.
    async fn ping(&self) -> DbResult<()>;

    /// Run the catalog statement. The outer error means the statement itself
    /// failed; inner errors are per-row scan failures.
    async fn list_tables(&self, sql: &str) -> DbResult<Vec<DbResult<WorkItem>>>;

    /// Run a statement returning a single integer.
    ///
    /// `timeout` bounds the statement only. Waiting for a pooled connection
    /// is not part of it, so a worker queued behind the pool ceiling never
    /// times out before its query has started.
    async fn count_rows(&self, sql: &str, timeout: Option<Duration>) -> DbResult<i64>;

    /// Release the handle. Later calls fail with [`DbError::Closed`].
    async fn close(&self);
}

/// Source of live connections.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Open one pooled handle honoring `limits`, shared by every worker.
    async fn open_pool(&self, limits: PoolLimits) -> DbResult<Arc<dyn Connection>>;

    /// Open one private connection, owned by a single caller.
    async fn open_single(&self) -> DbResult<Arc<dyn Connection>>;

    /// Connection target without credentials, for logs.
    fn describe(&self) -> String;
}

/// Sizing for a shared pool.
///
/// `max_open` bounds how many queries truly run at once. Without an explicit
/// ceiling it falls back to `max_idle`, which is sized to the worker count, so
/// extra workers beyond that number only wait on the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_idle: u32,
    pub max_open: Option<u32>,
    pub max_lifetime: Option<Duration>,
}

impl PoolLimits {
    pub fn for_workers(workers: usize, max_open: Option<u32>) -> Self {
        let max_idle = u32::try_from(workers).unwrap_or(u32::MAX).max(1);
        Self {
            max_idle,
            max_open: max_open.filter(|n| *n > 0),
            max_lifetime: None,
        }
    }

    /// Upper bound on concurrently executing queries.
    pub fn max_connections(&self) -> u32 {
        self.max_open.unwrap_or(self.max_idle).max(1)
    }

    /// Connections kept warm; never above [`Self::max_connections`].
    pub fn min_connections(&self) -> u32 {
        self.max_idle.min(self.max_connections())
    }
}
