//! Fixed-size pool of counting workers.
//!
//! Every worker loops on [`WorkQueue::try_dequeue`], counts one table, and
//! publishes exactly one [`ResultRecord`] for it, success or not. A worker
//! exits the first time it finds the queue empty; the pool is drained once
//! every worker has exited, and [`WorkerPool::run`] returns only then.
//!
//! In shared-pool mode the real parallelism is bounded by the connection
//! pool, not by the worker count: workers beyond the pool's connection
//! ceiling wait inside the pool for a free connection and only add contention
//! on the queue. That wait is not covered by the count timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use rowtally_core::database::{Connection, ConnectionProvider, DbResult};
use rowtally_core::filter::count_query;
use rowtally_core::types::ResultRecord;

use crate::queue::WorkQueue;
use crate::runtime::ExecError;
use crate::sink::ResultSink;

/// Open a private connection and verify it before any query is issued.
pub(crate) async fn open_verified(provider: &dyn ConnectionProvider) -> DbResult<Arc<dyn Connection>> {
    let conn = provider.open_single().await?;
    if let Err(e) = conn.ping().await {
        conn.close().await;
        return Err(e);
    }
    Ok(conn)
}

/// Where workers get their database handle from.
#[derive(Clone)]
pub enum WorkerConnections {
    /// One pooled handle, shared by every worker.
    Shared(Arc<dyn Connection>),
    /// Each worker opens, verifies, and finally closes its own connection.
    PerWorker(Arc<dyn ConnectionProvider>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub counted: usize,
    pub failed: usize,
    /// Workers that never got a connection (per-worker mode only).
    pub unconnected: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct WorkerStats {
    counted: usize,
    failed: usize,
    connected: bool,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    timeout: Option<Duration>,
}

impl WorkerPool {
    /// `timeout` bounds each count query; `None` waits indefinitely.
    pub fn new(workers: usize, timeout: Option<Duration>) -> Self {
        Self {
            workers: workers.max(1),
            timeout,
        }
    }

    /// Launch every worker, then wait for all of them to exit.
    ///
    /// A worker task that panics is reported as [`ExecError::Join`], but only
    /// after the remaining workers have finished.
    pub async fn run(
        &self,
        queue: Arc<WorkQueue>,
        sink: Arc<ResultSink>,
        connections: WorkerConnections,
    ) -> Result<PoolReport, ExecError> {
        info!(workers = self.workers, queued = queue.len(), "Starting workers");

        let mut tasks = JoinSet::new();
        for id in 0..self.workers {
            let queue = Arc::clone(&queue);
            let sink = Arc::clone(&sink);
            let connections = connections.clone();
            let timeout = self.timeout;
            tasks.spawn(async move { run_worker(id, connections, &queue, &sink, timeout).await });
        }

        let mut report = PoolReport::default();
        let mut join_failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(stats) => {
                    report.counted += stats.counted;
                    report.failed += stats.failed;
                    if !stats.connected {
                        report.unconnected += 1;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Worker task aborted");
                    join_failure.get_or_insert_with(|| e.to_string());
                }
            }
        }

        if let Some(message) = join_failure {
            return Err(ExecError::Join(message));
        }
        info!(
            counted = report.counted,
            failed = report.failed,
            unconnected = report.unconnected,
            "All workers finished"
        );
        Ok(report)
    }
}

async fn run_worker(
    id: usize,
    connections: WorkerConnections,
    queue: &WorkQueue,
    sink: &ResultSink,
    timeout: Option<Duration>,
) -> WorkerStats {
    match connections {
        WorkerConnections::Shared(conn) => drain_queue(id, conn.as_ref(), queue, sink, timeout).await,
        WorkerConnections::PerWorker(provider) => match open_verified(provider.as_ref()).await {
            Ok(conn) => {
                let stats = drain_queue(id, conn.as_ref(), queue, sink, timeout).await;
                conn.close().await;
                stats
            }
            Err(e) => {
                error!(worker = id, error = %e, "Worker could not open its connection");
                WorkerStats::default()
            }
        },
    }
}

async fn drain_queue(
    id: usize,
    conn: &dyn Connection,
    queue: &WorkQueue,
    sink: &ResultSink,
    timeout: Option<Duration>,
) -> WorkerStats {
    let mut stats = WorkerStats {
        connected: true,
        ..WorkerStats::default()
    };

    while let Some(item) = queue.try_dequeue() {
        let sql = count_query(&item);
        let record = match conn.count_rows(&sql, timeout).await {
            Ok(rows) => {
                debug!(worker = id, table = %item, rows, "Counted");
                stats.counted += 1;
                ResultRecord::counted(item, rows)
            }
            Err(e) => {
                error!(worker = id, table = %item, error = %e, "Failed to count rows");
                stats.failed += 1;
                ResultRecord::failed(item)
            }
        };
        sink.publish(record);
    }

    debug!(worker = id, counted = stats.counted, failed = stats.failed, "Worker exiting");
    stats
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rowtally_core::database::DbError;
    use rowtally_core::types::WorkItem;

    use super::*;

    /// Counts succeed with the table name's length unless the name starts
    /// with `bad`.
    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Connection for Counter {
        async fn ping(&self) -> DbResult<()> {
            Ok(())
        }

        async fn list_tables(&self, _sql: &str) -> DbResult<Vec<DbResult<WorkItem>>> {
            Ok(Vec::new())
        }

        async fn count_rows(&self, sql: &str, _timeout: Option<Duration>) -> DbResult<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if sql.contains("\"bad") {
                return Err(DbError::Query("permission denied".into()));
            }
            Ok(sql.len() as i64)
        }

        async fn close(&self) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_item_yields_exactly_one_record() {
        let queue: Arc<WorkQueue> = Arc::new(
            ["a", "bad_one", "c", "d", "bad_two"]
                .into_iter()
                .map(|t| WorkItem::new("app", t))
                .collect(),
        );
        let sink = Arc::new(ResultSink::new());
        let conn = Arc::new(Counter::default());

        let report = WorkerPool::new(8, None)
            .run(
                Arc::clone(&queue),
                Arc::clone(&sink),
                WorkerConnections::Shared(conn.clone()),
            )
            .await
            .unwrap();

        assert_eq!(report, PoolReport { counted: 3, failed: 2, unconnected: 0 });
        assert_eq!(conn.calls.load(Ordering::SeqCst), 5);
        assert!(queue.is_empty());
        assert_eq!(sink.len(), 5);
        assert_eq!(sink.ok_count(), 3);
        assert_eq!(sink.failed_count(), 2);
    }

    #[tokio::test]
    async fn zero_workers_still_drain_the_queue() {
        let queue: Arc<WorkQueue> = Arc::new(
            ["a", "b"].into_iter().map(|t| WorkItem::new("app", t)).collect(),
        );
        let sink = Arc::new(ResultSink::new());

        let report = WorkerPool::new(0, None)
            .run(
                Arc::clone(&queue),
                Arc::clone(&sink),
                WorkerConnections::Shared(Arc::new(Counter::default())),
            )
            .await
            .unwrap();

        assert_eq!(report.counted, 2);
        assert!(queue.is_empty());
    }
}
