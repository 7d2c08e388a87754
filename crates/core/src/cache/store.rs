//! The injectable cache store interface.

use async_trait::async_trait;

use super::entries::CacheEntry;
use crate::Error;

/// A registry of named caches holding immutable response snapshots.
///
/// Writing to a cache that does not exist creates it. A write fully replaces
/// any previous entry with the same identity in the same cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the named cache if it does not exist yet.
    async fn open(&self, cache: &str) -> Result<(), Error>;

    /// Store one entry.
    async fn put(&self, cache: &str, entry: CacheEntry) -> Result<(), Error>;

    /// Store a batch of entries. Either all of them land or none do.
    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> Result<(), Error>;

    /// Look up an entry by request identity in one cache.
    async fn lookup(&self, cache: &str, identity: &str) -> Result<Option<CacheEntry>, Error>;

    /// Delete a whole cache. Returns false if it did not exist.
    async fn delete(&self, cache: &str) -> Result<bool, Error>;

    /// Names of all existing caches, oldest first.
    async fn keys(&self) -> Result<Vec<String>, Error>;
}
