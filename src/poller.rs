use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::config::TelegramConfig;
use crate::dispatcher::{Dispatcher, ERROR_RESPONSE};
use crate::platform::{Channel, IncomingMessage, Update};
use crate::reply::Reply;

/// Next update id to ask the channel for. Only ever moves forward.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    next_id: Option<i64>,
}

impl Cursor {
    pub fn next_id(&self) -> Option<i64> {
        self.next_id
    }

    /// Move past the highest id in `batch`.
    pub fn advance(&mut self, batch: &[Update]) {
        if let Some(max) = batch.iter().map(|update| update.id).max() {
            let next = max + 1;
            self.next_id = Some(self.next_id.map_or(next, |current| current.max(next)));
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub timeout_secs: u32,
    pub retry_delay: Duration,
    pub interval: Duration,
    pub allowed_user_ids: Vec<u64>,
}

impl From<&TelegramConfig> for PollSettings {
    fn from(config: &TelegramConfig) -> Self {
        Self {
            timeout_secs: config.poll_timeout_secs,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            interval: Duration::from_millis(config.poll_interval_ms),
            allowed_user_ids: config.allowed_user_ids.clone(),
        }
    }
}

/// Long-polls the channel and feeds each update through the dispatcher,
/// one at a time.
pub struct Poller {
    channel: Arc<dyn Channel>,
    dispatcher: Dispatcher,
    settings: PollSettings,
    cursor: Cursor,
    /// Highest update id already handed to the dispatcher.
    last_processed: Option<i64>,
}

impl Poller {
    pub fn new(channel: Arc<dyn Channel>, dispatcher: Dispatcher, settings: PollSettings) -> Self {
        Self {
            channel,
            dispatcher,
            settings,
            cursor: Cursor::default(),
            last_processed: None,
        }
    }

    #[cfg(test)]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Poll forever. Channel failures are logged and retried after a fixed
    /// delay.
    pub async fn run(&mut self) {
        info!("Polling for updates...");
        loop {
            match self.poll_once().await {
                Ok(_) => tokio::time::sleep(self.settings.interval).await,
                Err(e) => {
                    error!(
                        "Failed to fetch updates (retry in {:?}): {:#}",
                        self.settings.retry_delay, e
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            }
        }
    }

    /// Fetch one batch and handle it. Returns how many messages were
    /// dispatched.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let batch = self
            .channel
            .fetch(self.cursor.next_id(), self.settings.timeout_secs)
            .await?;

        // Advance before dispatching: a handler crash drops the rest of the
        // batch instead of re-running side effects on the next fetch.
        self.cursor.advance(&batch);

        let mut dispatched = 0;
        for update in batch {
            if self.last_processed.is_some_and(|done| update.id <= done) {
                debug!("Skipping already processed update {}", update.id);
                continue;
            }
            self.last_processed = Some(update.id);

            let message = match update.message {
                Some(message) => message,
                None => {
                    debug!("Skipping update {} without a message", update.id);
                    continue;
                }
            };

            if !self.is_allowed(&message) {
                warn!(
                    "Ignoring message from unauthorized user {:?} in chat {}",
                    message.user_id, message.chat_id
                );
                continue;
            }

            if let Some(reply) = self.dispatch_guarded(&message).await {
                if let Err(e) = self.channel.send(message.chat_id, &reply).await {
                    error!("Failed to send reply to chat {}: {:#}", message.chat_id, e);
                }
            }
            dispatched += 1;
        }

        Ok(dispatched)
    }

    fn is_allowed(&self, message: &IncomingMessage) -> bool {
        let allowed = &self.settings.allowed_user_ids;
        allowed.is_empty()
            || message
                .user_id
                .is_some_and(|user_id| allowed.contains(&user_id))
    }

    /// Dispatch, turning a panicking handler into the generic error reply.
    async fn dispatch_guarded(&self, message: &IncomingMessage) -> Option<Reply> {
        match AssertUnwindSafe(self.dispatcher.dispatch(message))
            .catch_unwind()
            .await
        {
            Ok(reply) => reply,
            Err(panic) => {
                let description = format!("handler panicked: {}", panic_message(&*panic));
                error!("{} (chat {})", description, message.chat_id);
                self.dispatcher.record_failure(&description).await;
                Some(Reply::text(ERROR_RESPONSE))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
