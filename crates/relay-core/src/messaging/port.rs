use async_trait::async_trait;

use crate::{
    domain::ChannelId,
    messaging::types::{ChannelInfo, OutgoingMessage, ProbeOutcome, WebhookHandle},
    Result,
};

/// Webhook management + delivery on the destination platform.
///
/// Implementations map "gone" to `Error::NotFound` and "forbidden" to
/// `Error::Permission`; everything else is `Error::Remote`.
#[async_trait]
pub trait WebhookPort: Send + Sync {
    /// `Ok(None)` when the channel does not exist or is not visible to the bot.
    async fn channel(&self, channel_id: ChannelId) -> Result<Option<ChannelInfo>>;

    async fn list_webhooks(&self, channel_id: ChannelId) -> Result<Vec<WebhookHandle>>;
    async fn create_webhook(&self, channel_id: ChannelId, name: &str) -> Result<WebhookHandle>;
    async fn delete_webhook(&self, handle: &WebhookHandle, reason: &str) -> Result<()>;

    async fn probe_webhook(&self, handle: &WebhookHandle) -> ProbeOutcome;

    async fn execute_webhook(&self, handle: &WebhookHandle, message: &OutgoingMessage)
        -> Result<()>;
}
