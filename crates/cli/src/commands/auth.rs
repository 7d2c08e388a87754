//! Login and registration.

use anyhow::{Context as _, Result};
use techtalks_core::{AppConfig, ConfigError};

use super::Context;

fn credentials(config: &AppConfig) -> Result<(&str, &str), ConfigError> {
    let missing = |field: &str| ConfigError::Missing {
        field: field.into(),
        hint: format!("Set TECHTALKS_{}", field.to_uppercase()),
    };
    let username = config.username.as_deref().ok_or_else(|| missing("username"))?;
    let password = config.password.as_deref().ok_or_else(|| missing("password"))?;
    Ok((username, password))
}

pub async fn login(config: &AppConfig) -> Result<()> {
    let (username, password) = credentials(config)?;
    let session = Context::open(config).await?.api(config).login(username, password).await?;
    println!("{}", session.token);
    Ok(())
}

pub async fn register(config: &AppConfig, public_key: &str) -> Result<()> {
    let (username, password) = credentials(config)?;
    let public_key: serde_json::Value = serde_json::from_str(public_key).context("public key is not valid JSON")?;
    let session = Context::open(config).await?.api(config).register(username, password, &public_key).await?;
    println!("{}", session.token);
    Ok(())
}
