//! Collection point for worker results.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::error;

use rowtally_core::types::ResultRecord;
use rowtally_io::{ReportWriter, WriteStats};

use crate::queue::WorkQueue;

/// Append-only during the drain phase, consumed once afterwards.
#[derive(Debug, Default)]
pub struct ResultSink {
    records: WorkQueue<ResultRecord>,
    ok: AtomicUsize,
    failed: AtomicUsize,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, record: ResultRecord) {
        let counter = if record.ok { &self.ok } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
        self.records.enqueue(record);
    }

    pub fn try_take(&self) -> Option<ResultRecord> {
        self.records.try_dequeue()
    }

    /// Records published so far with `ok = true`.
    pub fn ok_count(&self) -> usize {
        self.ok.load(Ordering::Relaxed)
    }

    /// Records published so far carrying the failure sentinel.
    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Move every record into `report`, one line each.
    ///
    /// Only call once all publishers have finished. A line that fails to write
    /// is logged and skipped.
    pub fn drain_into<W: Write>(&self, report: &mut ReportWriter<W>) -> WriteStats {
        while let Some(record) = self.try_take() {
            if let Err(e) = report.write_record(&record) {
                error!(
                    owner = %record.owner,
                    table = %record.table_name,
                    row_count = record.row_count,
                    error = %e,
                    "Failed to write report line"
                );
            }
        }
        report.stats()
    }
}
