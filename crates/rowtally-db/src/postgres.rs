use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Connection as _, Row};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use rowtally_core::config::DatabaseConfig;
use rowtally_core::database::{Connection, ConnectionProvider, DbError, DbResult, PoolLimits};
use rowtally_core::types::WorkItem;

/// How long a worker waits for a pooled connection. Workers beyond the pool
/// ceiling park here until a connection frees up, so this is deliberately long.
const POOL_ACQUIRE_WAIT: Duration = Duration::from_secs(60 * 60);

/// Builds PostgreSQL handles from the configured credentials.
pub struct PgConnectionProvider {
    options: PgConnectOptions,
    target: String,
}

impl PgConnectionProvider {
    /// `statement_timeout` is also sent to the server so a timed-out count is
    /// cancelled there, not just abandoned by the client.
    pub fn new(cfg: &DatabaseConfig, statement_timeout: Option<Duration>) -> Self {
        let mut options = PgConnectOptions::new()
            .host(&cfg.host_name)
            .port(cfg.port)
            .database(&cfg.service_name)
            .username(&cfg.database_user)
            .password(&cfg.database_password)
            .application_name("rowtally");
        if let Some(timeout) = statement_timeout.filter(|t| !t.is_zero()) {
            options = options.options([("statement_timeout", timeout.as_millis().to_string())]);
        }
        let target = format!(
            "postgres://{}@{}:{}/{}",
            cfg.database_user, cfg.host_name, cfg.port, cfg.service_name
        );
        Self { options, target }
    }

    fn connect_error(&self, err: sqlx::Error) -> DbError {
        DbError::Connect {
            target: self.target.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl ConnectionProvider for PgConnectionProvider {
    async fn open_pool(&self, limits: PoolLimits) -> DbResult<Arc<dyn Connection>> {
        debug!(
            target_db = %self.target,
            max_connections = limits.max_connections(),
            min_connections = limits.min_connections(),
            "opening connection pool"
        );
        let pool = PgPoolOptions::new()
            .max_connections(limits.max_connections())
            .min_connections(limits.min_connections())
            .max_lifetime(limits.max_lifetime)
            .acquire_timeout(POOL_ACQUIRE_WAIT)
            .connect_with(self.options.clone())
            .await
            .map_err(|e| self.connect_error(e))?;
        Ok(Arc::new(PgPoolHandle { pool }))
    }

    async fn open_single(&self) -> DbResult<Arc<dyn Connection>> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| self.connect_error(e))?;
        Ok(Arc::new(PgSingleHandle {
            conn: Mutex::new(Some(conn)),
        }))
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

fn query_error(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::PoolClosed => DbError::Closed,
        other => DbError::Query(other.to_string()),
    }
}

/// Bound a running statement by `timeout`. Callers acquire the connection
/// first so only the statement itself is timed.
async fn bounded<T, F>(timeout: Option<Duration>, query: F) -> DbResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, query)
            .await
            .map_err(|_| DbError::Timeout(limit))?
            .map_err(query_error),
        None => query.await.map_err(query_error),
    }
}

fn scan_table_row(row: &PgRow) -> DbResult<WorkItem> {
    let owner: String = row
        .try_get("owner")
        .map_err(|e| DbError::Scan(e.to_string()))?;
    let table_name: String = row
        .try_get("table_name")
        .map_err(|e| DbError::Scan(e.to_string()))?;
    Ok(WorkItem { owner, table_name })
}

/// Pool shared by every worker; the pool serializes access per connection.
pub struct PgPoolHandle {
    pool: PgPool,
}

#[async_trait]
impl Connection for PgPoolHandle {
    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| DbError::Ping(e.to_string()))
    }

    async fn list_tables(&self, sql: &str) -> DbResult<Vec<DbResult<WorkItem>>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(rows.iter().map(scan_table_row).collect())
    }

    async fn count_rows(&self, sql: &str, timeout: Option<Duration>) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await.map_err(query_error)?;
        bounded(timeout, sqlx::query_scalar::<_, i64>(sql).fetch_one(&mut *conn)).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// One physical connection owned by a single worker.
pub struct PgSingleHandle {
    conn: Mutex<Option<PgConnection>>,
}

#[async_trait]
impl Connection for PgSingleHandle {
    async fn ping(&self) -> DbResult<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        conn.ping().await.map_err(|e| DbError::Ping(e.to_string()))
    }

    async fn list_tables(&self, sql: &str) -> DbResult<Vec<DbResult<WorkItem>>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        let rows = sqlx::query(sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(query_error)?;
        Ok(rows.iter().map(scan_table_row).collect())
    }

    async fn count_rows(&self, sql: &str, timeout: Option<Duration>) -> DbResult<i64> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DbError::Closed)?;
        bounded(timeout, sqlx::query_scalar::<_, i64>(sql).fetch_one(&mut *conn)).await
    }

    async fn close(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "closing connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowtally_core::config::ConnectionMode;

    fn cfg() -> DatabaseConfig {
        DatabaseConfig {
            database_user: "scott".into(),
            database_password: "tiger".into(),
            host_name: "db.internal".into(),
            port: 6543,
            service_name: "inventory".into(),
            exclude_owner: String::new(),
            connection_mode: ConnectionMode::SharedPool,
            max_open_connections: None,
        }
    }

    #[test]
    fn describe_omits_password() {
        let provider = PgConnectionProvider::new(&cfg(), Some(Duration::from_secs(30)));
        let target = provider.describe();
        assert_eq!(target, "postgres://scott@db.internal:6543/inventory");
        assert!(!target.contains("tiger"));
    }

    #[test]
    fn options_carry_connection_fields() {
        let provider = PgConnectionProvider::new(&cfg(), None);
        assert_eq!(provider.options.get_host(), "db.internal");
        assert_eq!(provider.options.get_port(), 6543);
        assert_eq!(provider.options.get_database(), Some("inventory"));
        assert_eq!(provider.options.get_username(), "scott");
    }
}
