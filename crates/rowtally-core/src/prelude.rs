//! Convenient re-exports for downstream crates.

pub use crate::config::{Config, ConnectionMode, DatabaseConfig};
pub use crate::database::{Connection, ConnectionProvider, DbError, DbResult, PoolLimits};
pub use crate::error::{Error, Result};
pub use crate::filter::{catalog_query, count_query, parse_owner_list, OwnerFilter};
pub use crate::manifest::{RunId, RunSummary};
pub use crate::types::{ResultRecord, WorkItem, FAILED_ROW_COUNT};
