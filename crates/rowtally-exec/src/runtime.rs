//! Runtime: open connections, enumerate, count, and write the report.
//!
//! Phases run strictly in order:
//! - open the connection(s) for the configured mode and verify liveness,
//! - enumerate the catalog into a fresh queue (single producer),
//! - run the worker pool until every worker has exited,
//! - turn anything still queued into failure records (per-worker mode only),
//! - drain the result sink into the report on this task,
//! - close connections and return a [`RunSummary`].

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{error, info};

use rowtally_core::config::ConnectionMode;
use rowtally_core::database::{Connection, ConnectionProvider, DbError, PoolLimits};
use rowtally_core::filter::OwnerFilter;
use rowtally_core::manifest::RunSummary;
use rowtally_core::types::ResultRecord;
use rowtally_io::ReportWriter;

use crate::enumerator::enumerate;
use crate::pool::{open_verified, WorkerConnections, WorkerPool};
use crate::queue::WorkQueue;
use crate::sink::ResultSink;

/// Errors that abort a run. Per-row, per-table, and per-line failures never
/// surface here; they are logged and accounted for in the summary.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("open connection: {0}")]
    Connect(#[source] DbError),
    #[error("catalog query: {0}")]
    Catalog(#[source] DbError),
    #[error("report: {0}")]
    Report(#[from] rowtally_io::Error),
    #[error("worker task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub filter: OwnerFilter,
    pub workers: usize,
    pub mode: ConnectionMode,
    /// Open-connection ceiling for the shared pool; defaults to `workers`.
    pub max_open_connections: Option<u32>,
    /// Applies to the catalog query and to each count query.
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn new(filter: OwnerFilter, workers: usize) -> Self {
        Self {
            filter,
            workers: workers.max(1),
            mode: ConnectionMode::SharedPool,
            max_open_connections: None,
            timeout: None,
        }
    }

    pub fn with_mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_open_connections(mut self, max_open: Option<u32>) -> Self {
        self.max_open_connections = max_open;
        self
    }

    /// A zero duration means no timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }
}

pub struct Runner {
    options: RunOptions,
}

impl Runner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Execute one complete run and write every result through `report`.
    pub async fn run<W: Write>(
        &self,
        provider: Arc<dyn ConnectionProvider>,
        mut report: ReportWriter<W>,
    ) -> Result<RunSummary, ExecError> {
        let opts = &self.options;
        let mut summary = RunSummary::new(opts.mode, opts.workers, now_millis());
        info!(
            run_id = %summary.id,
            target_db = %provider.describe(),
            mode = %opts.mode,
            workers = opts.workers,
            "Starting run"
        );

        let (catalog_conn, worker_conns) = self.connect(&provider).await?;

        let queue = Arc::new(WorkQueue::new());
        let enumerated = enumerate(catalog_conn.as_ref(), &opts.filter, &queue, opts.timeout).await;
        // The per-worker catalog connection is private to this phase.
        if opts.mode == ConnectionMode::PerWorker || enumerated.is_err() {
            catalog_conn.close().await;
        }
        let enumerated = enumerated?;
        summary.enqueued = enumerated.enqueued;
        summary.enqueue_failed = enumerated.failed;

        let sink = Arc::new(ResultSink::new());
        let pool = WorkerPool::new(opts.workers, opts.timeout);
        let pooled = pool.run(Arc::clone(&queue), Arc::clone(&sink), worker_conns).await;
        if opts.mode == ConnectionMode::SharedPool {
            catalog_conn.close().await;
        }
        pooled?;

        // Shared-pool workers only exit on an empty queue; per-worker ones
        // also exit when their connection fails to open.
        if opts.mode == ConnectionMode::PerWorker {
            for item in queue.drain_all() {
                error!(table = %item, "No worker connection was available");
                sink.publish(ResultRecord::failed(item));
            }
        }
        summary.counted = sink.ok_count();
        summary.count_failed = sink.failed_count();

        info!(records = sink.len(), layout = ?report.layout(), "Flushing results");
        sink.drain_into(&mut report);
        let written = report.finish()?;
        summary.written = written.written;
        summary.write_failed = written.failed;

        let summary = summary.finish(now_millis());
        info!(
            run_id = %summary.id,
            enqueued = summary.enqueued,
            enqueue_failed = summary.enqueue_failed,
            counted = summary.counted,
            count_failed = summary.count_failed,
            written = summary.written,
            write_failed = summary.write_failed,
            elapsed_ms = summary.elapsed().as_millis() as u64,
            "Run finished"
        );
        Ok(summary)
    }

    /// Open the catalog handle and decide how workers connect.
    async fn connect(
        &self,
        provider: &Arc<dyn ConnectionProvider>,
    ) -> Result<(Arc<dyn Connection>, WorkerConnections), ExecError> {
        match self.options.mode {
            ConnectionMode::SharedPool => {
                let limits =
                    PoolLimits::for_workers(self.options.workers, self.options.max_open_connections);
                let conn = provider.open_pool(limits).await.map_err(ExecError::Connect)?;
                if let Err(e) = conn.ping().await {
                    conn.close().await;
                    return Err(ExecError::Connect(e));
                }
                info!(
                    max_connections = limits.max_connections(),
                    "Connection pool verified"
                );
                Ok((Arc::clone(&conn), WorkerConnections::Shared(conn)))
            }
            ConnectionMode::PerWorker => {
                let conn = open_verified(provider.as_ref())
                    .await
                    .map_err(ExecError::Connect)?;
                info!("Catalog connection verified");
                Ok((conn, WorkerConnections::PerWorker(Arc::clone(provider))))
            }
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
