//! The message payload posted to the relay endpoint by the client plugin.

use serde::{Deserialize, Serialize};

use crate::domain::{opt_string_or_number, string_or_number};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default, deserialize_with = "string_or_number")]
    pub channel_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub message_id: String,
    #[serde(default)]
    pub author: Author,
    #[serde(default, deserialize_with = "string_or_number")]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<InboundAttachment>,
    #[serde(default)]
    pub embeds: Vec<serde_json::Value>,
}

/// Bot-authored messages are filtered by the sender; the relay does not re-check `bot`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default = "unknown_user")]
    pub username: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: Option<bool>,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            username: unknown_user(),
            id: None,
            avatar: None,
            bot: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundAttachment {
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl InboundAttachment {
    /// Direct URL, falling back to the proxy URL.
    pub fn link(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.proxy_url.as_deref().filter(|u| !u.is_empty()))
    }
}

fn unknown_user() -> String {
    "Unknown User".to_string()
}

fn default_filename() -> String {
    "file".to_string()
}
