//! Pulse Storage crate - the key/value cache service.
//!
//! Pre-computed listings (partners, products) are written into a WAL-mode
//! SQLite table by an external job and read back here by key.

pub mod cache;
pub mod db;
pub mod migrations;

pub use cache::{CacheStore, MemoryCache, SqliteCache};
pub use db::Database;
