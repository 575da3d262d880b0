#![forbid(unsafe_code)]
//! rowtally: exact row counts for every table owned by a set of schemas.
//!
//! Thin facade over the workspace crates so integration tests and benches
//! can depend on a single package.

pub use rowtally_core as core;
pub use rowtally_db as db;
pub use rowtally_exec as exec;
pub use rowtally_io as io;
