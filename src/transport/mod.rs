//! Messaging transport
//!
//! The scheduler and the command router only see the [`Transport`] trait;
//! [`TelegramTransport`] is the production implementation over the Telegram
//! Bot API. Incoming traffic is modelled by [`Update`] and friends, which
//! deserialize straight from the Bot API's JSON.

mod telegram;

pub use telegram::TelegramTransport;

use crate::error::TransportError;
use crate::types::{ChatId, PrincipalId, UploadUnit};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Outbound and inbound messaging operations
///
/// Implementations must be safe to share across the tasks handling
/// concurrent requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `unit` as a document to `chat`, captioned with `unit.caption`.
    ///
    /// `timeout` bounds the whole request. The unit's strategy decides whether
    /// the file is buffered or streamed from disk.
    async fn send_document(
        &self,
        chat: ChatId,
        unit: &UploadUnit,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Send a plain text message
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), TransportError>;

    /// Download a file the user sent, writing it to `dest`. Returns bytes written.
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, TransportError>;

    /// Long-poll for updates with id >= `offset`
    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TransportError>;
}

/// One incoming update
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    /// Monotonic update id; the next poll starts after the highest seen
    pub update_id: i64,
    /// New message, if this update carries one
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

/// A message sent to the bot
#[derive(Clone, Debug, Deserialize)]
pub struct IncomingMessage {
    /// Message id within the chat
    pub message_id: i64,
    /// Sender; absent for channel posts
    #[serde(default)]
    pub from: Option<User>,
    /// Chat the message arrived in
    pub chat: Chat,
    /// Text body
    #[serde(default)]
    pub text: Option<String>,
    /// Caption of a media message
    #[serde(default)]
    pub caption: Option<String>,
    /// Attached document
    #[serde(default)]
    pub document: Option<Document>,
}

impl IncomingMessage {
    /// Principal that sent the message
    pub fn principal(&self) -> Option<PrincipalId> {
        self.from.as_ref().map(|u| PrincipalId(u.id))
    }

    /// Chat to reply into
    pub fn chat_id(&self) -> ChatId {
        ChatId(self.chat.id)
    }
}

/// Message sender
#[derive(Clone, Debug, Deserialize)]
pub struct User {
    /// User id
    pub id: i64,
    /// Handle without the leading '@'
    #[serde(default)]
    pub username: Option<String>,
}

/// Chat reference
#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    /// Chat id
    pub id: i64,
}

/// Attached file
#[derive(Clone, Debug, Deserialize)]
pub struct Document {
    /// Opaque id used to download the file
    pub file_id: String,
    /// Original file name
    #[serde(default)]
    pub file_name: Option<String>,
    /// Size in bytes, when known
    #[serde(default)]
    pub file_size: Option<u64>,
}
