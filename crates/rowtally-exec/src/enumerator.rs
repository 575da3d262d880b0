//! Single-producer catalog enumeration.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info};

use rowtally_core::database::{Connection, DbError, DbResult};
use rowtally_core::filter::{catalog_query, OwnerFilter};

use crate::queue::WorkQueue;
use crate::runtime::ExecError;

/// Await `fut`, failing with [`DbError::Timeout`] once `limit` elapses.
///
/// The catalog query runs before any worker exists, so no pool wait can be
/// counted against it.
async fn within<T, F>(limit: Option<Duration>, fut: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(DbError::Timeout(limit))),
        None => fut.await,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationReport {
    pub enqueued: usize,
    pub failed: usize,
}

/// Run the catalog query for `filter` and enqueue one item per scanned row.
///
/// A row that fails to scan is logged and counted; it never stops the rows
/// after it. Only a failure of the statement itself is returned. The result
/// set is fully consumed before this returns.
pub async fn enumerate(
    conn: &dyn Connection,
    filter: &OwnerFilter,
    queue: &WorkQueue,
    timeout: Option<Duration>,
) -> Result<EnumerationReport, ExecError> {
    let sql = catalog_query(filter);
    info!(sql = %sql, "Listing tables");

    let rows = within(timeout, conn.list_tables(&sql))
        .await
        .map_err(ExecError::Catalog)?;

    let mut report = EnumerationReport::default();
    for row in rows {
        match row {
            Ok(item) => {
                queue.enqueue(item);
                report.enqueued += 1;
            }
            Err(e) => {
                error!(error = %e, "Skipping unreadable catalog row");
                report.failed += 1;
            }
        }
    }

    info!(
        enqueued = report.enqueued,
        failed = report.failed,
        "Enumeration finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use rowtally_core::types::WorkItem;

    use super::*;

    struct Catalog {
        rows: Vec<Option<&'static str>>,
        stall: bool,
    }

    #[async_trait]
    impl Connection for Catalog {
        async fn ping(&self) -> DbResult<()> {
            Ok(())
        }

        async fn list_tables(&self, _sql: &str) -> DbResult<Vec<DbResult<WorkItem>>> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(self
                .rows
                .iter()
                .map(|row| match row {
                    Some(name) => Ok(WorkItem::new("app", *name)),
                    None => Err(DbError::Scan("null table name".into())),
                })
                .collect())
        }

        async fn count_rows(&self, _sql: &str, _timeout: Option<Duration>) -> DbResult<i64> {
            Ok(0)
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn scan_failures_are_counted_not_fatal() {
        let conn = Catalog {
            rows: vec![Some("a"), None, Some("b"), None, Some("c")],
            stall: false,
        };
        let queue = WorkQueue::new();
        let report = enumerate(&conn, &OwnerFilter::Exclude(Vec::new()), &queue, None)
            .await
            .unwrap();

        assert_eq!(report, EnumerationReport { enqueued: 3, failed: 2 });
        let names: Vec<String> = queue.drain_all().into_iter().map(|i| i.table_name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn within_reports_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, DbError>(1)
        };
        let err = within(Some(Duration::from_secs(1)), slow).await.unwrap_err();
        assert!(matches!(err, DbError::Timeout(d) if d == Duration::from_secs(1)));

        let fast = async { Ok::<_, DbError>(7) };
        assert_eq!(within(None, fast).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn catalog_timeout_is_fatal() {
        let conn = Catalog {
            rows: vec![Some("a")],
            stall: true,
        };
        let queue = WorkQueue::new();
        let err = enumerate(
            &conn,
            &OwnerFilter::Include("app".into()),
            &queue,
            Some(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ExecError::Catalog(DbError::Timeout(_))));
        assert!(queue.is_empty());
    }
}
