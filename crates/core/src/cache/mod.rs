//! Named response caches for the offline layer.
//!
//! Every cache is addressed by name. The core cache name carries the build
//! date of its generation; `api-cache` and `news-cache` are unversioned and
//! live across generations.
//!
//! Two [`CacheStore`] backends are provided:
//!
//! - [`CacheDb`]: SQLite via tokio-rusqlite, persisted across runs
//! - [`MemoryStore`]: process-local, for tests and ephemeral hosts

pub mod connection;
pub mod entries;
pub mod generation;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
pub use generation::{API_CACHE, Generation, NEWS_CACHE};
pub use memory::MemoryStore;
pub use store::CacheStore;
