#![forbid(unsafe_code)]
//! rowtally-db: PostgreSQL implementation of the `rowtally-core` database
//! traits.
//!
//! Two handle flavors back the two connection modes: a shared `PgPool` and a
//! single private `PgConnection`. Both run the catalog statement, scalar
//! counts, and a `SELECT 1` liveness probe.

pub mod postgres;

pub use postgres::{PgConnectionProvider, PgPoolHandle, PgSingleHandle};
