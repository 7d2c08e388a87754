//! Cache generation naming.
//!
//! A core generation is named `<prefix>-<YYYY-MM-DD>`, e.g.
//! `techtalks-v6-2026-10-18`. Exactly one generation is current at a time.

use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;

/// Unversioned store for generic API responses.
pub const API_CACHE: &str = "api-cache";

/// Unversioned store for news responses.
pub const NEWS_CACHE: &str = "news-cache";

static GENERATION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<prefix>.+)-(?P<date>\d{4}-\d{2}-\d{2})$").expect("valid generation regex"));

/// One version epoch of the core cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation {
    prefix: String,
    build_date: NaiveDate,
}

impl Generation {
    pub fn new(prefix: impl Into<String>, build_date: NaiveDate) -> Self {
        Self { prefix: prefix.into(), build_date }
    }

    /// Generation for the current UTC date.
    pub fn today(prefix: impl Into<String>) -> Self {
        Self::new(prefix, Utc::now().date_naive())
    }

    /// Parse a cache name back into a generation.
    ///
    /// Returns None for names that are not core generations, including
    /// [`API_CACHE`] and [`NEWS_CACHE`].
    pub fn parse(name: &str) -> Option<Self> {
        let caps = GENERATION_NAME.captures(name)?;
        let date = NaiveDate::parse_from_str(&caps["date"], "%Y-%m-%d").ok()?;
        Some(Self::new(&caps["prefix"], date))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn build_date(&self) -> NaiveDate {
        self.build_date
    }

    /// Cache name, also used as the install-time cache-busting token.
    pub fn name(&self) -> String {
        format!("{}-{}", self.prefix, self.build_date.format("%Y-%m-%d"))
    }

    /// Whether `cache_name` should be evicted when this generation activates.
    ///
    /// Everything except this generation and the two unversioned stores is
    /// garbage.
    pub fn is_stale(&self, cache_name: &str) -> bool {
        cache_name != self.name() && cache_name != API_CACHE && cache_name != NEWS_CACHE
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
