mod action;
mod bot;
mod browser;
mod config;
mod dispatcher;
mod memory;
mod platform;
mod poller;
mod reply;
#[cfg(test)]
mod testing;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chorebot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Mode: {}", config.bot.mode);
    info!("  Database: {}", config.memory.database_path.display());
    info!("  Log table: {}", config.memory.log_table);
    info!("  WebDriver: {}", config.browser.webdriver_url);
    info!("  Allowed users: {:?}", config.telegram.allowed_user_ids);

    bot::run(config).await
}
