//! CSV row-count report.
//!
//! One line per table, no header, `\n`-terminated, UTF-8. Each line is
//! encoded on its own and handed to the underlying writer exactly once, so a
//! line that fails to write is dropped, never replayed by a later flush, and
//! never stops the lines after it.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use rowtally_core::types::ResultRecord;

use crate::error::{Error, Result};

/// Field layout of each report line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportLayout {
    /// `owner,tableName,rowCount`
    #[default]
    OwnerTableCount,
    /// `tableName,rowCount`
    TableCount,
}

impl ReportLayout {
    pub fn from_owner_column(include_owner: bool) -> Self {
        if include_owner {
            ReportLayout::OwnerTableCount
        } else {
            ReportLayout::TableCount
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub failed: usize,
}

/// Create (or truncate) the report file, creating missing parent directories.
pub fn create_output(path: &Path) -> Result<File> {
    let create_err = |source| Error::Create {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(create_err)?;
    }
    File::create(path).map_err(create_err)
}

pub struct ReportWriter<W: Write> {
    out: W,
    encoder: csv::WriterBuilder,
    layout: ReportLayout,
    stats: WriteStats,
    /// A previous line stopped partway; start the next one on a fresh line.
    torn: bool,
}

impl ReportWriter<File> {
    pub fn create(path: &Path, layout: ReportLayout) -> Result<Self> {
        let f = create_output(path)?;
        Ok(Self::to_writer(f, layout))
    }
}

impl<W: Write> ReportWriter<W> {
    pub fn to_writer(out: W, layout: ReportLayout) -> Self {
        let mut encoder = csv::WriterBuilder::new();
        encoder
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'));
        Self {
            out,
            encoder,
            layout,
            stats: WriteStats::default(),
            torn: false,
        }
    }

    pub fn layout(&self) -> ReportLayout {
        self.layout
    }

    /// Append one line for `record`.
    ///
    /// Failures are counted in [`WriteStats::failed`] and returned; the writer
    /// stays usable for the next record.
    pub fn write_record(&mut self, record: &ResultRecord) -> Result<()> {
        let outcome = self.encode(record).and_then(|line| self.emit(&line));
        match outcome {
            Ok(()) => self.stats.written += 1,
            Err(_) => self.stats.failed += 1,
        }
        outcome
    }

    fn encode(&self, record: &ResultRecord) -> Result<Vec<u8>> {
        let count = record.row_count.to_string();
        let mut line = self.encoder.from_writer(Vec::with_capacity(64));
        match self.layout {
            ReportLayout::OwnerTableCount => line.write_record([
                record.owner.as_str(),
                record.table_name.as_str(),
                count.as_str(),
            ])?,
            ReportLayout::TableCount => {
                line.write_record([record.table_name.as_str(), count.as_str()])?
            }
        }
        line.into_inner().map_err(|e| {
            let err = e.error();
            Error::Io(io::Error::new(err.kind(), err.to_string()))
        })
    }

    /// Hand `line` to the writer once. Bytes that were accepted before an
    /// error stay where they are; the next line starts after a newline.
    fn emit(&mut self, line: &[u8]) -> Result<()> {
        if self.torn {
            self.write_fully(b"\n")?;
            self.torn = false;
        }
        self.write_fully(line)?;
        self.out.flush()?;
        Ok(())
    }

    fn write_fully(&mut self, mut buf: &[u8]) -> Result<()> {
        let mut accepted = false;
        while !buf.is_empty() {
            match self.out.write(buf) {
                Ok(0) => {
                    self.torn |= accepted;
                    return Err(io::Error::from(io::ErrorKind::WriteZero).into());
                }
                Ok(n) => {
                    accepted = true;
                    buf = &buf[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.torn |= accepted;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Flush outstanding bytes and return the final counters.
    pub fn finish(mut self) -> Result<WriteStats> {
        self.out.flush()?;
        Ok(self.stats)
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
