pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::reply::Reply;

/// One inbound notification from the messaging channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Channel-assigned, strictly increasing identifier.
    pub id: i64,
    /// `None` for updates that carry no chat message (edits, callbacks, ...).
    pub message: Option<IncomingMessage>,
}

/// The chat message carried by an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub user_id: Option<u64>,
    /// Absent for stickers, photos and other non-text content.
    pub text: Option<String>,
}

/// Transport to the chat service.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Long-poll for updates with id >= `offset`, waiting up to
    /// `timeout_secs`. Returns an empty batch on timeout.
    async fn fetch(&self, offset: Option<i64>, timeout_secs: u32) -> Result<Vec<Update>>;

    async fn send(&self, chat_id: i64, reply: &Reply) -> Result<()>;
}
