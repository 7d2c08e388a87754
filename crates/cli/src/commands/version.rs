use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use techtalks_client::{HtmlFile, ResourceVersioner};
use techtalks_core::AppConfig;

pub async fn run(config: &AppConfig, file: PathBuf, watch: bool) -> Result<()> {
    let versioner = ResourceVersioner::from_config(config)?;
    let target = HtmlFile::new(file);

    if watch {
        Arc::new(versioner).spawn_periodic(Arc::new(target), config.versioner_interval()).await?;
        return Ok(());
    }

    let count = versioner.run_once(&target, Utc::now()).await?;
    println!("versioned {count} resources");
    Ok(())
}
