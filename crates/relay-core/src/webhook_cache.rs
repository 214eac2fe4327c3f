//! Per-channel webhook cache with fallback recovery.
//!
//! Resolution for one channel is serialized so concurrent callers never race to
//! create duplicate webhooks; different channels resolve independently.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
    domain::{ChannelId, WebhookId},
    errors::Error,
    messaging::{
        port::WebhookPort,
        types::{ChannelKind, OutgoingMessage, ProbeOutcome, WebhookHandle},
    },
    Result,
};

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub handle: WebhookHandle,
    pub validated_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ChannelLocks {
    inner: Mutex<HashMap<ChannelId, Arc<Mutex<()>>>>,
}

impl ChannelLocks {
    pub async fn lock_channel(&self, channel_id: ChannelId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(channel_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub struct WebhookCache {
    port: Arc<dyn WebhookPort>,
    identity: String,
    entries: Mutex<HashMap<ChannelId, CacheEntry>>,
    locks: ChannelLocks,
}

impl WebhookCache {
    /// `identity` is the display name of webhooks this bot owns.
    pub fn new(port: Arc<dyn WebhookPort>, identity: impl Into<String>) -> Self {
        Self {
            port,
            identity: identity.into(),
            entries: Mutex::new(HashMap::new()),
            locks: ChannelLocks::default(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn cached(&self, channel_id: ChannelId) -> Option<CacheEntry> {
        self.entries.lock().await.get(&channel_id).cloned()
    }

    /// Return a usable webhook for the channel, validating, recovering or creating it.
    pub async fn resolve(&self, channel_id: ChannelId) -> Result<WebhookHandle> {
        let _guard = self.locks.lock_channel(channel_id).await;

        if let Some(handle) = self.revalidate_cached(channel_id).await {
            return Ok(handle);
        }

        let handle = self.resolve_remote(channel_id).await?;
        self.entries.lock().await.insert(
            channel_id,
            CacheEntry {
                handle: handle.clone(),
                validated_at: Utc::now(),
            },
        );
        Ok(handle)
    }

    /// Resolve, then deliver. A failure that shows the webhook is gone evicts it.
    pub async fn send(&self, channel_id: ChannelId, message: OutgoingMessage) -> Result<()> {
        let message = message.normalized()?;
        let handle = self.resolve(channel_id).await?;

        match self.port.execute_webhook(&handle, &message).await {
            Ok(()) => {
                debug!(channel = %channel_id, "webhook message sent");
                Ok(())
            }
            Err(e) => {
                if e.evicts_handle() {
                    warn!(channel = %channel_id, webhook = %handle.id, error = %e, "send failed, evicting webhook");
                    self.evict_if_current(channel_id, handle.id).await;
                }
                Err(e)
            }
        }
    }

    pub async fn evict(&self, channel_id: ChannelId) -> Option<CacheEntry> {
        self.entries.lock().await.remove(&channel_id)
    }

    async fn evict_if_current(&self, channel_id: ChannelId, webhook_id: WebhookId) {
        let mut entries = self.entries.lock().await;
        if entries
            .get(&channel_id)
            .is_some_and(|e| e.handle.id == webhook_id)
        {
            entries.remove(&channel_id);
        }
    }

    async fn revalidate_cached(&self, channel_id: ChannelId) -> Option<WebhookHandle> {
        let entry = self.cached(channel_id).await?;

        match self.port.probe_webhook(&entry.handle).await {
            ProbeOutcome::Valid(fresh) if fresh.is_usable() => {
                self.entries.lock().await.insert(
                    channel_id,
                    CacheEntry {
                        handle: fresh.clone(),
                        validated_at: Utc::now(),
                    },
                );
                return Some(fresh);
            }
            ProbeOutcome::Valid(_) => {
                warn!(channel = %channel_id, "cached webhook has no token, removing from cache")
            }
            ProbeOutcome::NotFound => {
                info!(channel = %channel_id, "cached webhook was deleted, removing from cache")
            }
            ProbeOutcome::Forbidden => {
                warn!(channel = %channel_id, "lost access to cached webhook, removing from cache")
            }
            ProbeOutcome::Failed(e) => {
                warn!(channel = %channel_id, error = %e, "webhook validation failed, removing from cache")
            }
        }

        self.evict(channel_id).await;
        None
    }

    async fn resolve_remote(&self, channel_id: ChannelId) -> Result<WebhookHandle> {
        match self.port.channel(channel_id).await? {
            None => {
                warn!(channel = %channel_id, "destination channel not found or not accessible");
                return Err(Error::NotFound(format!("channel {channel_id}")));
            }
            Some(info) if info.kind != ChannelKind::Text => {
                warn!(channel = %channel_id, kind = ?info.kind, "destination is not a text channel");
                return Err(Error::Validation(format!(
                    "channel {channel_id} is not a text channel"
                )));
            }
            Some(_) => {}
        }

        let existing = self
            .port
            .list_webhooks(channel_id)
            .await
            .map_err(|e| self.log_management_error(channel_id, e))?;

        for hook in existing.into_iter().filter(|h| h.name == self.identity) {
            if hook.is_usable() {
                info!(channel = %channel_id, webhook = %hook.id, "found existing valid webhook");
                return Ok(hook);
            }

            info!(channel = %channel_id, webhook = %hook.id, "found webhook without token, deleting");
            if let Err(e) = self
                .port
                .delete_webhook(&hook, "Webhook has no token, recreating")
                .await
            {
                debug!(channel = %channel_id, webhook = %hook.id, error = %e, "best-effort webhook delete failed");
            }
        }

        let created = self
            .port
            .create_webhook(channel_id, &self.identity)
            .await
            .map_err(|e| self.log_management_error(channel_id, e))?;

        if !created.is_usable() {
            return Err(Error::Remote(format!(
                "webhook created in channel {channel_id} has no token"
            )));
        }

        info!(channel = %channel_id, webhook = %created.id, "created new webhook");
        Ok(created)
    }

    fn log_management_error(&self, channel_id: ChannelId, e: Error) -> Error {
        match &e {
            Error::Permission(_) => {
                error!(channel = %channel_id, "no permission to manage webhooks")
            }
            other => error!(channel = %channel_id, error = %other, "error managing webhook"),
        }
        e
    }
}
