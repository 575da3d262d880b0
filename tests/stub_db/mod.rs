//! In-memory database used by the integration tests and the bench.
//!
//! Pooled handles enforce the pool ceiling with a semaphore so tests can
//! observe peak parallelism; private handles count opens and closes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use rowtally::core::database::{Connection, ConnectionProvider, DbError, DbResult, PoolLimits};
use rowtally::core::filter::count_query;
use rowtally::core::types::WorkItem;

/// Owner used by [`StubBuilder::tables`].
pub const OWNER: &str = "app";

/// Row count the stub reports for the generated table `index`.
pub fn expected_rows(index: usize) -> i64 {
    index as i64 * 3
}

pub fn table_name(index: usize) -> String {
    format!("t{index:04}")
}

#[derive(Debug, Default)]
pub struct StubStats {
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub pools_opened: AtomicUsize,
    pub pools_closed: AtomicUsize,
    pub singles_opened: AtomicUsize,
    pub singles_closed: AtomicUsize,
    pub catalog_sql: Mutex<Vec<String>>,
}

impl StubStats {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct StubBuilder {
    catalog: Vec<Option<WorkItem>>,
    counts: HashMap<String, Option<i64>>,
    fail_ping: bool,
    fail_catalog: bool,
    single_open_budget: Option<usize>,
    delay: Duration,
}

impl StubBuilder {
    /// `n` tables `app.t0000..`, each counting [`expected_rows`].
    pub fn tables(mut self, n: usize) -> Self {
        for i in 0..n {
            self = self.table(OWNER, &table_name(i), expected_rows(i));
        }
        self
    }

    pub fn table(mut self, owner: &str, name: &str, rows: i64) -> Self {
        let item = WorkItem::new(owner, name);
        self.counts.insert(count_query(&item), Some(rows));
        self.catalog.push(Some(item));
        self
    }

    /// A table whose count query always fails.
    pub fn failing_table(mut self, owner: &str, name: &str) -> Self {
        let item = WorkItem::new(owner, name);
        self.counts.insert(count_query(&item), None);
        self.catalog.push(Some(item));
        self
    }

    /// Catalog rows that fail to scan.
    pub fn bad_rows(mut self, n: usize) -> Self {
        self.catalog.extend(std::iter::repeat(None).take(n));
        self
    }

    pub fn fail_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    pub fn fail_catalog(mut self) -> Self {
        self.fail_catalog = true;
        self
    }

    /// Only the first `n` private connections open successfully.
    pub fn single_open_budget(mut self, n: usize) -> Self {
        self.single_open_budget = Some(n);
        self
    }

    /// Time each count query spends "on the server".
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn build(self) -> StubDb {
        StubDb {
            state: Arc::new(StubState {
                catalog: self.catalog,
                counts: self.counts,
                fail_ping: self.fail_ping,
                fail_catalog: self.fail_catalog,
                single_open_budget: self.single_open_budget,
                delay: self.delay,
                stats: StubStats::default(),
            }),
        }
    }
}

struct StubState {
    catalog: Vec<Option<WorkItem>>,
    counts: HashMap<String, Option<i64>>,
    fail_ping: bool,
    fail_catalog: bool,
    single_open_budget: Option<usize>,
    delay: Duration,
    stats: StubStats,
}

/// Cheap to clone; clones share one catalog and one set of counters.
#[derive(Clone)]
pub struct StubDb {
    state: Arc<StubState>,
}

impl StubDb {
    pub fn builder() -> StubBuilder {
        StubBuilder::default()
    }

    pub fn stats(&self) -> &StubStats {
        &self.state.stats
    }

    /// Provider handle to pass to the runner.
    pub fn provider(&self) -> Arc<dyn ConnectionProvider> {
        Arc::new(self.clone())
    }

    fn handle(&self, gate: Option<Arc<Semaphore>>, pooled: bool) -> Arc<dyn Connection> {
        Arc::new(StubConnection {
            db: Arc::clone(&self.state),
            gate,
            pooled,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ConnectionProvider for StubDb {
    async fn open_pool(&self, limits: PoolLimits) -> DbResult<Arc<dyn Connection>> {
        self.stats().pools_opened.fetch_add(1, Ordering::SeqCst);
        let gate = Arc::new(Semaphore::new(limits.max_connections() as usize));
        Ok(self.handle(Some(gate), true))
    }

    async fn open_single(&self) -> DbResult<Arc<dyn Connection>> {
        let opened = self.stats().singles_opened.fetch_add(1, Ordering::SeqCst);
        if self.state.single_open_budget.is_some_and(|budget| opened >= budget) {
            return Err(DbError::Connect {
                target: self.describe(),
                message: "too many clients".into(),
            });
        }
        Ok(self.handle(None, false))
    }

    fn describe(&self) -> String {
        "stub://memory".into()
    }
}

struct StubConnection {
    db: Arc<StubState>,
    gate: Option<Arc<Semaphore>>,
    pooled: bool,
    closed: AtomicBool,
}

impl StubConnection {
    fn check_open(&self) -> DbResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DbError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for StubConnection {
    async fn ping(&self) -> DbResult<()> {
        self.check_open()?;
        if self.db.fail_ping {
            return Err(DbError::Ping("server unreachable".into()));
        }
        Ok(())
    }

    async fn list_tables(&self, sql: &str) -> DbResult<Vec<DbResult<WorkItem>>> {
        self.check_open()?;
        self.db
            .stats
            .catalog_sql
            .lock()
            .unwrap()
            .push(sql.to_string());
        if self.db.fail_catalog {
            return Err(DbError::Query("relation does not exist".into()));
        }
        Ok(self
            .db
            .catalog
            .iter()
            .map(|row| {
                row.clone()
                    .ok_or_else(|| DbError::Scan("unexpected null".into()))
            })
            .collect())
    }

    async fn count_rows(&self, sql: &str, timeout: Option<Duration>) -> DbResult<i64> {
        self.check_open()?;
        // Pool wait happens before the statement clock starts.
        let _permit = match &self.gate {
            Some(gate) => Some(gate.acquire().await.map_err(|_| DbError::Closed)?),
            None => None,
        };
        let stats = &self.db.stats;
        stats.count_calls.fetch_add(1, Ordering::SeqCst);
        stats.enter();
        let ran = match timeout {
            Some(limit) => tokio::time::timeout(limit, tokio::time::sleep(self.db.delay))
                .await
                .map_err(|_| DbError::Timeout(limit)),
            None => {
                tokio::time::sleep(self.db.delay).await;
                Ok(())
            }
        };
        stats.leave();
        ran?;

        match self.db.counts.get(sql) {
            Some(Some(rows)) => Ok(*rows),
            Some(None) => Err(DbError::Query("permission denied".into())),
            None => Err(DbError::Query(format!("unknown statement: {sql}"))),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let counter = if self.pooled {
            &self.db.stats.pools_closed
        } else {
            &self.db.stats.singles_closed
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}
