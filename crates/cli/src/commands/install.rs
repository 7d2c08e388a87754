use anyhow::Result;
use techtalks_core::AppConfig;

use super::Context;

pub async fn run(config: &AppConfig) -> Result<()> {
    let ctx = Context::open(config).await?;

    match ctx.worker.start().await? {
        Some(report) => {
            println!("active generation: {}", report.generation);
            for name in &report.deleted {
                println!("deleted cache: {name}");
            }
        }
        None => println!("installed {}, waiting to activate", config.generation()),
    }
    Ok(())
}
