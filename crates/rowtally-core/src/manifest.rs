//! Run summary emitted at the end of every run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ConnectionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,

    /// Version string for provenance.
    pub version: String,

    pub mode: ConnectionMode,
    pub workers: usize,

    /// Catalog rows turned into work items / rows that failed to scan.
    pub enqueued: usize,
    pub enqueue_failed: usize,

    /// Count queries that succeeded / produced a failure record.
    pub counted: usize,
    pub count_failed: usize,

    /// Report lines written / lines that failed to write.
    pub written: usize,
    pub write_failed: usize,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunSummary {
    pub fn new(mode: ConnectionMode, workers: usize, started_ms: u64) -> Self {
        Self {
            id: RunId(Uuid::new_v4()),
            version: crate::VERSION.to_string(),
            mode,
            workers,
            enqueued: 0,
            enqueue_failed: 0,
            counted: 0,
            count_failed: 0,
            written: 0,
            write_failed: 0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64) -> Self {
        self.finished_ms = finished_ms.max(self.started_ms);
        self
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.finished_ms.saturating_sub(self.started_ms))
    }

    /// Every enqueued table produced exactly one record.
    pub fn is_complete(&self) -> bool {
        self.counted + self.count_failed == self.enqueued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_never_negative() {
        let summary = RunSummary::new(ConnectionMode::SharedPool, 4, 1_000).finish(500);
        assert_eq!(summary.elapsed(), Duration::ZERO);

        let summary = RunSummary::new(ConnectionMode::SharedPool, 4, 1_000).finish(3_500);
        assert_eq!(summary.elapsed(), Duration::from_millis(2_500));
    }

    #[test]
    fn summary_serializes() {
        let summary = RunSummary::new(ConnectionMode::PerWorker, 2, 0);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["mode"], "per_worker");
        assert_eq!(json["workers"], 2);
    }
}
