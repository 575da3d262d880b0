//! Work items handed to the worker pool and the records they produce.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::quote_ident;

/// Row count recorded for a table whose count query failed.
///
/// A genuine empty table always reports `0`, so `-1` in the report means
/// "count failed" and nothing else.
pub const FAILED_ROW_COUNT: i64 = -1;

/// One schema-qualified table awaiting a row count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkItem {
    pub owner: String,
    pub table_name: String,
}

impl WorkItem {
    pub fn new(owner: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            table_name: table_name.into(),
        }
    }

    /// Quote-delimited reference, e.g. `"SALES"."ORDERS"`.
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}",
            quote_ident(&self.owner),
            quote_ident(&self.table_name)
        )
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// Outcome of one count attempt. Exactly one is published per dequeued item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub owner: String,
    pub table_name: String,
    pub row_count: i64,
    pub ok: bool,
}

impl ResultRecord {
    pub fn counted(item: WorkItem, row_count: i64) -> Self {
        Self {
            owner: item.owner,
            table_name: item.table_name,
            row_count,
            ok: true,
        }
    }

    pub fn failed(item: WorkItem) -> Self {
        Self {
            owner: item.owner,
            table_name: item.table_name,
            row_count: FAILED_ROW_COUNT,
            ok: false,
        }
    }

    /// `(owner, table_name)` key, for comparing unordered result sets.
    pub fn key(&self) -> (&str, &str) {
        (&self.owner, &self.table_name)
    }
}
