//! Core types and shared functionality for techtalks.
//!
//! This crate provides:
//! - Cache store abstraction with in-memory and SQLite backends
//! - Cache generation naming
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{API_CACHE, CacheDb, CacheEntry, CacheStore, Generation, MemoryStore, NEWS_CACHE};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
