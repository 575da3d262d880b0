#![forbid(unsafe_code)]
//! rowtally-core: shared types, configuration, owner filters, and the
//! database capability traits.
//!
//! This crate never touches the network or a database. The traits in [`database`] are
//! implemented by `rowtally-db` (PostgreSQL via sqlx) and by in-memory stubs
//! in tests, so the execution crate never depends on a concrete driver.

pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod manifest;
pub mod prelude;
pub mod types;

/// Crate version, recorded in every run summary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
