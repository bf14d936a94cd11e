use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup, UpdateKind,
};
use tracing::debug;

use crate::config::TelegramConfig;
use crate::platform::{Channel, IncomingMessage, Update};
use crate::reply::{Markup, Reply};

/// Telegram rejects messages longer than 4096 characters.
const MAX_MESSAGE_LEN: usize = 4000;

/// Extra room on top of the long-poll timeout before the HTTP client gives up.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Render our keyboard payload as a Telegram reply markup.
fn to_reply_markup(markup: &Markup) -> ReplyMarkup {
    match markup {
        Markup::Choices(items) => ReplyMarkup::Keyboard(
            KeyboardMarkup::new(
                items
                    .iter()
                    .map(|item| vec![KeyboardButton::new(item.clone())]),
            )
            .one_time_keyboard(),
        ),
        Markup::Remove => ReplyMarkup::KeyboardRemove(KeyboardRemove::new()),
    }
}

fn convert_update(update: teloxide::types::Update) -> Update {
    let id = i64::from(update.id.0);
    let message = match update.kind {
        UpdateKind::Message(msg) => Some(IncomingMessage {
            chat_id: msg.chat.id.0,
            user_id: msg.from.as_ref().map(|user| user.id.0),
            text: msg.text().map(str::to_string),
        }),
        _ => None,
    };
    Update { id, message }
}

/// Telegram Bot API transport built on teloxide.
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let timeout =
            Duration::from_secs(u64::from(config.poll_timeout_secs)) + CLIENT_TIMEOUT_SLACK;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            bot: Bot::with_client(&config.bot_token, client),
        })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    async fn fetch(&self, offset: Option<i64>, timeout_secs: u32) -> Result<Vec<Update>> {
        let mut request = self.bot.get_updates().timeout(timeout_secs);
        if let Some(offset) = offset {
            let offset = i32::try_from(offset)
                .with_context(|| format!("Update offset {} out of range", offset))?;
            request = request.offset(offset);
        }

        let updates = request.await.context("getUpdates failed")?;
        debug!("Fetched {} update(s)", updates.len());

        Ok(updates.into_iter().map(convert_update).collect())
    }

    async fn send(&self, chat_id: i64, reply: &Reply) -> Result<()> {
        let chunks = split_message(&reply.text, MAX_MESSAGE_LEN);
        let last = chunks.len().saturating_sub(1);

        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut request = self.bot.send_message(ChatId(chat_id), chunk);
            // The keyboard rides on the final chunk only
            if index == last {
                if let Some(markup) = &reply.markup {
                    request = request.reply_markup(to_reply_markup(markup));
                }
            }
            request.await.context("sendMessage failed")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_not_split() {
        assert_eq!(split_message("milk", 10), vec!["milk"]);
    }

    #[test]
    fn test_split_prefers_newlines() {
        let chunks = split_message("milk\neggs\nbread", 10);
        assert_eq!(chunks, vec!["milk\neggs\n", "bread"]);
        assert_eq!(chunks.concat(), "milk\neggs\nbread");
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "🌱".repeat(10);
        let chunks = split_message(&text, 9);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.len() <= 9));
    }

    #[test]
    fn test_choices_render_one_button_per_row() {
        let markup = to_reply_markup(&Markup::Choices(vec!["milk".into(), "eggs".into()]));
        let json = serde_json::to_value(&markup).unwrap();
        let rows = json["keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0]["text"], "milk");
        assert_eq!(json["one_time_keyboard"], true);
    }

    #[test]
    fn test_remove_renders_remove_keyboard() {
        let json = serde_json::to_value(to_reply_markup(&Markup::Remove)).unwrap();
        assert_eq!(json["remove_keyboard"], true);
    }
}
