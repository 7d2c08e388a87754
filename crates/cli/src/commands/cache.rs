//! Cache store inspection.

use anyhow::{Result, bail};
use techtalks_core::{AppConfig, CacheDb, CacheStore};

pub async fn list(config: &AppConfig) -> Result<()> {
    let store = CacheDb::open(&config.db_path).await?;
    let current = config.generation();

    for name in store.keys().await? {
        let count = store.entry_count(&name).await?;
        let marker = if current.is_stale(&name) { "stale" } else { "kept" };
        println!("{name}\t{count} entries\t{marker}");
    }
    Ok(())
}

pub async fn purge(config: &AppConfig, name: &str) -> Result<()> {
    let store = CacheDb::open(&config.db_path).await?;
    if !store.delete(name).await? {
        bail!("no cache named {name}");
    }
    println!("deleted {name}");
    Ok(())
}
