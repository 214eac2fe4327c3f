//! Discord adapter: webhook management and delivery over the REST API (v10).
//!
//! Maps HTTP outcomes onto core errors: 404 is `NotFound`, 401/403 are
//! `Permission`, everything else (rate limits included) is `Remote`. Nothing is
//! retried here; the next request or poll cycle is the retry.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{
    domain::{ChannelId, WebhookId},
    errors::Error,
    messaging::{
        port::WebhookPort,
        types::{ChannelInfo, ChannelKind, OutgoingMessage, ProbeOutcome, RichBlock, WebhookHandle},
    },
    Result,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("DiscordBot (relay, ", env!("CARGO_PKG_VERSION"), ")");

/// Channel types that accept webhooks: guild text and announcement channels.
const WEBHOOK_CHANNEL_TYPES: [u8; 2] = [0, 5];
const INCOMING_WEBHOOK: u8 = 1;

#[derive(Clone, Debug)]
pub struct DiscordClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BotUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl BotUser {
    pub fn display_name(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if !d.is_empty() && d != "0" => format!("{}#{d}", self.username),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct WireWebhook {
    id: String,
    #[serde(rename = "type", default = "incoming")]
    kind: u8,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

fn incoming() -> u8 {
    INCOMING_WEBHOOK
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(MANAGEMENT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("discord http client: {e}")))?;
        Ok(Self {
            http,
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// The bot's own user; doubles as a token check at startup.
    pub async fn current_user(&self) -> Result<BotUser> {
        let resp = self.send(self.bot(Method::GET, "/users/@me"), "identify").await?;
        let resp = expect_success(resp, "identify").await?;
        resp.json()
            .await
            .map_err(|e| Error::Remote(format!("identify: invalid body: {e}")))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn bot(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("Authorization", format!("Bot {}", self.token))
            .timeout(MANAGEMENT_TIMEOUT)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        req.send()
            .await
            .map_err(|e| Error::Remote(format!("{what}: {e}")))
    }
}

#[async_trait]
impl WebhookPort for DiscordClient {
    async fn channel(&self, channel_id: ChannelId) -> Result<Option<ChannelInfo>> {
        let path = format!("/channels/{channel_id}");
        let resp = self.send(self.bot(Method::GET, &path), "get channel").await?;
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => return Ok(None),
            _ => {}
        }
        let wire: WireChannel = expect_success(resp, "get channel")
            .await?
            .json()
            .await
            .map_err(|e| Error::Remote(format!("get channel: invalid body: {e}")))?;
        Ok(Some(channel_info(wire, channel_id)))
    }

    async fn list_webhooks(&self, channel_id: ChannelId) -> Result<Vec<WebhookHandle>> {
        let path = format!("/channels/{channel_id}/webhooks");
        let resp = self.send(self.bot(Method::GET, &path), "list webhooks").await?;
        let wire: Vec<WireWebhook> = expect_success(resp, "list webhooks")
            .await?
            .json()
            .await
            .map_err(|e| Error::Remote(format!("list webhooks: invalid body: {e}")))?;
        Ok(wire
            .into_iter()
            .filter(|w| w.kind == INCOMING_WEBHOOK)
            .filter_map(|w| webhook_handle(w, channel_id))
            .collect())
    }

    async fn create_webhook(&self, channel_id: ChannelId, name: &str) -> Result<WebhookHandle> {
        let path = format!("/channels/{channel_id}/webhooks");
        let req = self.bot(Method::POST, &path).json(&json!({ "name": name }));
        let resp = self.send(req, "create webhook").await?;
        let wire: WireWebhook = expect_success(resp, "create webhook")
            .await?
            .json()
            .await
            .map_err(|e| Error::Remote(format!("create webhook: invalid body: {e}")))?;
        webhook_handle(wire, channel_id)
            .ok_or_else(|| Error::Remote("create webhook: response has no usable id".to_string()))
    }

    async fn delete_webhook(&self, handle: &WebhookHandle, reason: &str) -> Result<()> {
        let path = format!("/webhooks/{}", handle.id);
        let req = self
            .bot(Method::DELETE, &path)
            .header("X-Audit-Log-Reason", reason);
        let resp = self.send(req, "delete webhook").await?;
        expect_success(resp, "delete webhook").await?;
        Ok(())
    }

    async fn probe_webhook(&self, handle: &WebhookHandle) -> ProbeOutcome {
        let req = match handle.token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => self
                .http
                .get(self.url(&format!("/webhooks/{}/{token}", handle.id)))
                .timeout(MANAGEMENT_TIMEOUT),
            None => self.bot(Method::GET, &format!("/webhooks/{}", handle.id)),
        };

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return ProbeOutcome::Failed(e.to_string()),
        };

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => return ProbeOutcome::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return ProbeOutcome::Forbidden,
            s => return ProbeOutcome::Failed(format!("status {s}")),
        }

        match resp.json::<WireWebhook>().await {
            Ok(wire) => match webhook_handle(wire, handle.channel_id) {
                Some(mut fresh) => {
                    if fresh.token.is_none() {
                        fresh.token = handle.token.clone();
                    }
                    ProbeOutcome::Valid(fresh)
                }
                None => ProbeOutcome::Failed("webhook response has no usable id".to_string()),
            },
            Err(e) => ProbeOutcome::Failed(format!("invalid body: {e}")),
        }
    }

    async fn execute_webhook(&self, handle: &WebhookHandle, message: &OutgoingMessage) -> Result<()> {
        let token = handle
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Validation(format!("webhook {} has no token", handle.id)))?;

        let payload = message_payload(message);
        let req = self
            .http
            .post(self.url(&format!("/webhooks/{}/{token}", handle.id)));

        let req = match &message.file {
            None => req.json(&payload),
            Some(file) => {
                let part = reqwest::multipart::Part::bytes(file.bytes.clone())
                    .file_name(file.filename.clone())
                    .mime_str(&file.content_type)
                    .map_err(|e| Error::Validation(format!("attachment content type: {e}")))?;
                let form = reqwest::multipart::Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", part);
                req.multipart(form)
            }
        };

        let resp = self.send(req, "execute webhook").await?;
        expect_success(resp, "execute webhook").await?;
        debug!(webhook = %handle.id, "webhook executed");
        Ok(())
    }
}

async fn expect_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_status(status, what, &body))
}

fn classify_status(status: StatusCode, what: &str, body: &str) -> Error {
    let detail = format!(
        "{what}: {status} {}",
        body.chars().take(200).collect::<String>()
    );
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Permission(detail),
        _ => Error::Remote(detail),
    }
}

fn channel_info(wire: WireChannel, requested: ChannelId) -> ChannelInfo {
    let kind = if WEBHOOK_CHANNEL_TYPES.contains(&wire.kind) {
        ChannelKind::Text
    } else {
        ChannelKind::Other(wire.kind)
    };
    ChannelInfo {
        id: wire.id.parse().unwrap_or(requested),
        name: wire.name.unwrap_or_default(),
        kind,
    }
}

fn webhook_handle(wire: WireWebhook, fallback_channel: ChannelId) -> Option<WebhookHandle> {
    let id = wire.id.parse::<u64>().ok()?;
    Some(WebhookHandle {
        id: WebhookId(id),
        channel_id: wire
            .channel_id
            .and_then(|c| c.parse().ok())
            .unwrap_or(fallback_channel),
        name: wire.name.unwrap_or_default(),
        token: wire.token.filter(|t| !t.is_empty()),
    })
}

fn block_json(block: &RichBlock) -> Value {
    match block {
        RichBlock::Verbatim(v) => v.clone(),
        RichBlock::Image { url } => json!({ "image": { "url": url } }),
        RichBlock::Notice { description, color } => {
            let mut embed = json!({ "description": description });
            if let Some(color) = color {
                embed["color"] = json!(color);
            }
            embed
        }
    }
}

/// JSON body for "execute webhook".
pub fn message_payload(message: &OutgoingMessage) -> Value {
    let mut payload = json!({ "username": message.username });
    if let Some(avatar) = &message.avatar_url {
        payload["avatar_url"] = json!(avatar);
    }
    if let Some(content) = &message.content {
        payload["content"] = json!(content);
    }
    if !message.blocks.is_empty() {
        payload["embeds"] = Value::Array(message.blocks.iter().map(block_json).collect());
    }
    if let Some(file) = &message.file {
        payload["attachments"] = json!([{ "id": 0, "filename": file.filename }]);
    }
    payload
}

#[cfg(test)]
mod tests {
    use relay_core::messaging::types::FileAttachment;

    use super::*;

    #[test]
    fn statuses_map_to_core_errors() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "x", "Unknown Webhook"),
            Error::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "x", ""),
            Error::Permission(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "x", ""),
            Error::Permission(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "x", ""),
            Error::Remote(_)
        ));
    }

    #[test]
    fn announcement_channels_accept_webhooks() {
        let text = channel_info(
            WireChannel {
                id: "5".into(),
                name: Some("news".into()),
                kind: 5,
            },
            ChannelId(5),
        );
        assert_eq!(text.kind, ChannelKind::Text);

        let voice = channel_info(
            WireChannel {
                id: "6".into(),
                name: None,
                kind: 2,
            },
            ChannelId(6),
        );
        assert_eq!(voice.kind, ChannelKind::Other(2));
    }

    #[test]
    fn webhook_wire_parsing_tolerates_missing_fields() {
        let wire: WireWebhook =
            serde_json::from_value(json!({ "id": "42", "name": "Relay Bot", "token": "" })).unwrap();
        let handle = webhook_handle(wire, ChannelId(7)).unwrap();
        assert_eq!(handle.id, WebhookId(42));
        assert_eq!(handle.channel_id, ChannelId(7));
        assert_eq!(handle.token, None);

        let bad: WireWebhook = serde_json::from_value(json!({ "id": "nope" })).unwrap();
        assert!(webhook_handle(bad, ChannelId(7)).is_none());
    }

    #[test]
    fn payload_translates_blocks_to_embeds() {
        let message = OutgoingMessage {
            username: "alice".into(),
            avatar_url: Some("https://cdn/a.png".into()),
            content: Some("hi".into()),
            blocks: vec![
                RichBlock::Verbatim(json!({ "title": "t" })),
                RichBlock::Image {
                    url: "https://cdn/x.png".into(),
                },
                RichBlock::Notice {
                    description: "town made".into(),
                    color: Some(0xFFAA00),
                },
            ],
            file: None,
        };
        let payload = message_payload(&message);
        assert_eq!(payload["username"], "alice");
        assert_eq!(payload["avatar_url"], "https://cdn/a.png");
        assert_eq!(payload["embeds"][0]["title"], "t");
        assert_eq!(payload["embeds"][1]["image"]["url"], "https://cdn/x.png");
        assert_eq!(payload["embeds"][2]["color"], 0xFFAA00);
        assert!(payload.get("attachments").is_none());
    }

    #[test]
    fn file_payload_declares_the_attachment() {
        let message = OutgoingMessage {
            username: "Project Pulitzer".into(),
            file: Some(FileAttachment {
                filename: "image.png".into(),
                content_type: "image/png".into(),
                bytes: vec![1, 2, 3],
            }),
            ..Default::default()
        };
        let payload = message_payload(&message);
        assert_eq!(payload["attachments"][0]["filename"], "image.png");
        assert!(payload.get("content").is_none());
        assert!(payload.get("embeds").is_none());
    }

    #[test]
    fn legacy_discriminators_are_shown() {
        let user = BotUser {
            id: "1".into(),
            username: "relay".into(),
            discriminator: Some("0042".into()),
        };
        assert_eq!(user.display_name(), "relay#0042");
        let user = BotUser {
            discriminator: Some("0".into()),
            ..user
        };
        assert_eq!(user.display_name(), "relay");
    }
}
