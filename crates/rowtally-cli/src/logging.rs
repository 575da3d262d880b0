//! Event log: stderr plus an append-only log file.
//!
//! File output goes through a non-blocking writer with its own worker
//! thread. The [`EventLog`] owns that thread's guard; [`EventLog::close`]
//! drops it, which blocks until buffered entries have been written.

use std::error::Error;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub struct EventLog {
    guard: Option<WorkerGuard>,
}

impl EventLog {
    /// Install the global subscriber, appending to `path`.
    ///
    /// `RUST_LOG` overrides the default `info` level.
    pub fn init(path: &Path) -> Result<Self, Box<dyn Error>> {
        let file_name = path
            .file_name()
            .ok_or_else(|| format!("log file path {} has no file name", path.display()))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name.to_string_lossy().into_owned())
            .build(dir)?;
        // Never drop entries under load; workers wait for the writer instead.
        let (writer, guard) = NonBlockingBuilder::default().lossy(false).finish(appender);

        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init()?;

        Ok(Self { guard: Some(guard) })
    }

    /// Flush every buffered entry to disk, then stop the writer thread.
    pub fn close(mut self) {
        drop(self.guard.take());
    }
}
