//! SQLite storage backend for the SCA engine.
//!
//! The schema lives in `migrations/`. [`SqliteDatabase`] implements [`crate::traits::Xs2aDatabase`] on top of the
//! low-level functions in [`db`].
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
