#![forbid(unsafe_code)]
//! rowtally-exec: the concurrent counting pipeline.
//!
//! A run is strictly phased: one producer enumerates the catalog into a
//! [`WorkQueue`], a fixed [`WorkerPool`] drains it against the database, and
//! only after every worker has exited is the [`ResultSink`] drained, on one
//! task, into the report.

pub mod enumerator;
pub mod pool;
pub mod queue;
pub mod runtime;
pub mod sink;

pub use enumerator::{enumerate, EnumerationReport};
pub use pool::{PoolReport, WorkerConnections, WorkerPool};
pub use queue::WorkQueue;
pub use runtime::{ExecError, RunOptions, Runner};
pub use sink::ResultSink;
