//! techtalks command-line host.
//!
//! Wires the offline worker, the live channel and the resource versioner to
//! real network, disk and WebSocket I/O. Logging goes to stderr so command
//! output on stdout stays readable.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use techtalks_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "techtalks")]
#[command(about = "Offline-first client for the techtalks chat")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install and activate the configured cache generation
    Install,

    /// Send one request through the fetch interceptor
    Fetch {
        /// Origin-relative path or absolute URL
        path: String,

        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,
    },

    /// Inspect or purge the cache store
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Log in with TECHTALKS_USERNAME / TECHTALKS_PASSWORD and print the token
    Login,

    /// Register TECHTALKS_USERNAME / TECHTALKS_PASSWORD and print the token
    Register {
        /// Exported public key as JSON
        #[arg(long, default_value = "null")]
        public_key: String,
    },

    /// Join the chat: live channel plus stdin composer
    Chat,

    /// Rewrite stylesheet and script versions in an HTML file
    Version {
        file: PathBuf,

        /// Keep rewriting on the configured interval
        #[arg(short, long)]
        watch: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// List caches and their entry counts
    List,
    /// Delete one cache
    Purge { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    let config = AppConfig::load()?;
    tracing::debug!(origin = %config.origin, generation = %config.generation(), "configuration loaded");

    match args.command {
        Command::Install => commands::install::run(&config).await,
        Command::Fetch { path, method } => commands::fetch::run(&config, &path, &method).await,
        Command::Cache { action: CacheAction::List } => commands::cache::list(&config).await,
        Command::Cache { action: CacheAction::Purge { name } } => commands::cache::purge(&config, &name).await,
        Command::Login => commands::auth::login(&config).await,
        Command::Register { public_key } => commands::auth::register(&config, &public_key).await,
        Command::Chat => commands::chat::run(&config).await,
        Command::Version { file, watch } => commands::version::run(&config, file, watch).await,
    }
}
