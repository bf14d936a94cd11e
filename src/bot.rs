use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::action::{validate_target, ActionExecutor, ExecutorSettings};
use crate::browser::webdriver::WebDriverBrowser;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::memory::MemoryStore;
use crate::platform::telegram::TelegramChannel;
use crate::poller::{PollSettings, Poller};

/// Build every collaborator from the validated config.
pub fn build(config: &Config) -> Result<Poller> {
    let store = MemoryStore::open(&config.memory.database_path, &config.memory.log_table)?;

    let browser = Arc::new(WebDriverBrowser::new(&config.browser)?);
    let executor = ActionExecutor::new(browser, ExecutorSettings::from(&config.browser));

    let default_target = config
        .browser
        .default_target
        .as_deref()
        .map(validate_target)
        .transpose()
        .context("Invalid default target")?;

    let dispatcher = Dispatcher::new(config.bot.mode, store, executor, default_target);
    let channel = Arc::new(TelegramChannel::new(&config.telegram)?);

    Ok(Poller::new(
        channel,
        dispatcher,
        PollSettings::from(&config.telegram),
    ))
}

/// Start the bot and poll until the process is stopped.
pub async fn run(config: Config) -> Result<()> {
    let mut poller = build(&config)?;

    info!("Starting bot in {} mode...", config.bot.mode);
    poller.run().await;

    Ok(())
}
