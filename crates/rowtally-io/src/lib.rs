#![forbid(unsafe_code)]
//! rowtally-io: output file creation and the row-count report writer.

pub mod error;
pub mod report;

pub use error::{Error, Result};
pub use report::{create_output, ReportLayout, ReportWriter, WriteStats};
