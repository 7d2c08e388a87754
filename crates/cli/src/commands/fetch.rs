//! One request through the interceptor.

use anyhow::{Context as _, Result};
use techtalks_client::fetch::{Method, Request, canonicalize};
use techtalks_client::worker::Interception;
use techtalks_core::AppConfig;

use super::Context;

pub async fn run(config: &AppConfig, path: &str, method: &str) -> Result<()> {
    let ctx = Context::open(config).await?;
    let interceptor = ctx.interceptor();

    let method = Method::from_bytes(method.to_uppercase().as_bytes()).with_context(|| format!("bad method {method}"))?;
    let mut request = Request::new(method, canonicalize(interceptor.origin(), path)?);
    if let Some(token) = &config.token {
        request = request.bearer(token)?;
    }

    let outcome = interceptor.handle(&request).await;
    let source = match &outcome {
        Interception::Passthrough(_) => "passthrough",
        Interception::Network(_) => "network",
        Interception::Cache(_) => "cache",
        Interception::OfflinePage(_) => "offline page",
        Interception::Unavailable(_) => "unavailable",
        Interception::Miss => "miss",
    };
    let response = outcome.into_result(&request.identity())?;
    interceptor.flush().await;

    eprintln!("{} {} ({source})", response.status.as_u16(), response.url);
    println!("{}", response.text());
    Ok(())
}
