//! SQLite backend for the Bloom engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
