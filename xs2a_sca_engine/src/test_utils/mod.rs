//! Test support: an in-memory store, a fake banking backend, seed data and SQLite environment preparation.
pub mod fake_spi;
pub mod fixtures;
pub mod memory_db;
#[cfg(feature = "sqlite")]
pub mod prepare_env;
