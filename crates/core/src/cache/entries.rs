//! Cache entry CRUD operations on the SQLite backend.
//!
//! Provides the [`CacheStore`] implementation for [`CacheDb`].

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use super::store::CacheStore;
use crate::Error;

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Canonical request URL this entry answers.
    pub identity: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// RFC 3339 timestamp of the write.
    pub stored_at: String,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    pub fn new(identity: impl Into<String>, status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self { identity: identity.into(), status, headers, body, stored_at: Utc::now().to_rfc3339() }
    }
}

fn ensure_cache(conn: &rusqlite::Connection, cache: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO caches (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
        params![cache, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn upsert_entry(conn: &rusqlite::Connection, cache: &str, entry: &CacheEntry) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&entry.headers)?;
    conn.execute(
        "INSERT INTO entries (cache_name, hash, identity, status, headers_json, body, stored_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(cache_name, hash) DO UPDATE SET
            identity = excluded.identity,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            cache,
            compute_cache_key(&entry.identity),
            &entry.identity,
            entry.status,
            headers_json,
            &entry.body,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

fn validate_name(cache: &str) -> Result<(), Error> {
    if cache.trim().is_empty() {
        return Err(Error::InvalidInput("cache name cannot be empty".into()));
    }
    Ok(())
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn open(&self, cache: &str) -> Result<(), Error> {
        validate_name(cache)?;
        let cache = cache.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> { ensure_cache(conn, &cache) })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, cache: &str, entry: CacheEntry) -> Result<(), Error> {
        self.put_all(cache, vec![entry]).await
    }

    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> Result<(), Error> {
        validate_name(cache)?;
        let cache = cache.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_cache(&tx, &cache)?;
                for entry in &entries {
                    upsert_entry(&tx, &cache, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn lookup(&self, cache: &str, identity: &str) -> Result<Option<CacheEntry>, Error> {
        let cache = cache.to_string();
        let hash = compute_cache_key(identity);
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT identity, status, headers_json, body, stored_at
                    FROM entries WHERE cache_name = ?1 AND hash = ?2",
                )?;

                let result = stmt.query_row(params![cache, hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                });

                match result {
                    Ok((identity, status, headers_json, body, stored_at)) => Ok(Some(CacheEntry {
                        identity,
                        status,
                        headers: serde_json::from_str(&headers_json)?,
                        body,
                        stored_at,
                    })),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, cache: &str) -> Result<bool, Error> {
        let cache = cache.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM caches WHERE name = ?1", params![cache])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheDb {
    /// Number of entries stored in one cache.
    pub async fn entry_count(&self, cache: &str) -> Result<u64, Error> {
        let cache = cache.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE cache_name = ?1", params![cache], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
