use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChannelId, WebhookId},
    errors::Error,
    Result,
};

/// A platform webhook bound to one destination channel.
///
/// A handle with no (or an empty) token cannot send and counts as "no handle".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookHandle {
    pub id: WebhookId,
    pub channel_id: ChannelId,
    pub name: String,
    pub token: Option<String>,
}

impl WebhookHandle {
    pub fn is_usable(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Result of a liveness probe on an existing webhook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Still exists; carries the freshly fetched handle (token may be missing).
    Valid(WebhookHandle),
    NotFound,
    Forbidden,
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    /// Channels that accept webhooks (text and announcement channels).
    Text,
    Other(u8),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
}

/// Rich content attached to an outgoing message.
///
/// Plain records; the Discord adapter translates them to embed JSON.
#[derive(Clone, Debug, PartialEq)]
pub enum RichBlock {
    /// An embed object forwarded as received.
    Verbatim(serde_json::Value),
    Image { url: String },
    Notice { description: String, color: Option<u32> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutgoingMessage {
    pub username: String,
    pub avatar_url: Option<String>,
    pub content: Option<String>,
    pub blocks: Vec<RichBlock>,
    pub file: Option<FileAttachment>,
}

impl OutgoingMessage {
    /// Drops empty text and rejects a message that would carry nothing at all.
    pub fn normalized(mut self) -> Result<Self> {
        if self.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
            self.content = None;
        }
        if self.avatar_url.as_deref().is_some_and(|a| a.trim().is_empty()) {
            self.avatar_url = None;
        }
        if self.content.is_none() && self.blocks.is_empty() && self.file.is_none() {
            return Err(Error::Validation("refusing to send an empty message".to_string()));
        }
        Ok(self)
    }
}
