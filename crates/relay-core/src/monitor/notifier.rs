//! Turns rendered change text into webhook posts for every subscribed destination.

use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
    config::{Config, MonitorConfig},
    domain::{ChannelId, Population},
    formatting::{parse_color_codes, parse_hex_color},
    messaging::types::{FileAttachment, OutgoingMessage, RichBlock},
    webhook_cache::WebhookCache,
    Result,
};

#[derive(Clone, Debug, PartialEq)]
pub enum NotificationBody {
    Rich(RichBlock),
    File(FileAttachment),
}

impl NotificationBody {
    pub fn into_message(self, username: &str) -> OutgoingMessage {
        let mut message = OutgoingMessage {
            username: username.to_string(),
            ..Default::default()
        };
        match self {
            NotificationBody::Rich(block) => message.blocks.push(block),
            NotificationBody::File(file) => message.file = Some(file),
        }
        message
    }
}

/// Renders notification text (with `§` colour codes) into a postable body.
///
/// Receives the live monitor settings so a reload takes effect on the next cycle.
pub trait NotificationRenderer: Send + Sync {
    fn render(
        &self,
        settings: &MonitorConfig,
        text: &str,
        population: Population,
    ) -> Result<NotificationBody>;
}

/// Plain-text rendering: codes are stripped and the notice takes the colour
/// active at the end of the text.
#[derive(Clone, Copy, Debug, Default)]
pub struct ColorCodeRenderer;

impl NotificationRenderer for ColorCodeRenderer {
    fn render(
        &self,
        settings: &MonitorConfig,
        text: &str,
        _population: Population,
    ) -> Result<NotificationBody> {
        let segments = parse_color_codes(text, &settings.minecraft_colors);
        let description: String = segments.iter().map(|s| s.text.as_str()).collect();
        let color = segments.last().and_then(|s| parse_hex_color(&s.color));
        Ok(NotificationBody::Rich(RichBlock::Notice { description, color }))
    }
}

/// Inter-send spacing across one poll cycle.
#[derive(Debug)]
pub struct Pacing {
    delay: Duration,
    sent_any: bool,
}

impl Pacing {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            sent_any: false,
        }
    }

    async fn wait_turn(&mut self) {
        if self.sent_any && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent_any = true;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
}

#[derive(Clone)]
pub struct Notifier {
    cache: Arc<WebhookCache>,
    renderer: Arc<dyn NotificationRenderer>,
}

impl Notifier {
    pub fn new(cache: Arc<WebhookCache>, renderer: Arc<dyn NotificationRenderer>) -> Self {
        Self { cache, renderer }
    }

    /// Send one notification to every destination of every subscribed group.
    /// Failures are logged per destination and never stop the rest.
    pub async fn broadcast(
        &self,
        cfg: &Config,
        population: Population,
        text: &str,
        pacing: &mut Pacing,
    ) -> BroadcastReport {
        let destinations = subscribed_destinations(cfg, population);
        if destinations.is_empty() {
            warn!(%population, "no relay groups subscribed to notifications");
            return BroadcastReport::default();
        }

        let body = match self.renderer.render(&cfg.earthmc, text, population) {
            Ok(body) => body,
            Err(e) => {
                warn!(%population, error = %e, "failed to render notification");
                return BroadcastReport {
                    attempted: destinations.len(),
                    delivered: 0,
                };
            }
        };
        let message = body.into_message(&cfg.earthmc.notifier_username);

        let mut report = BroadcastReport {
            attempted: destinations.len(),
            delivered: 0,
        };
        for dest in destinations {
            pacing.wait_turn().await;
            match self.cache.send(dest, message.clone()).await {
                Ok(()) => {
                    report.delivered += 1;
                    info!(%population, destination = %dest, "sent notification");
                }
                Err(e) => {
                    warn!(%population, destination = %dest, error = %e, "failed to send notification")
                }
            }
        }
        report
    }
}

/// Destinations of all subscribed groups, first occurrence wins.
pub fn subscribed_destinations(cfg: &Config, population: Population) -> Vec<ChannelId> {
    let registry = &cfg.relay_groups;
    let mut out: Vec<ChannelId> = Vec::new();
    for group in registry.subscribed_groups(population) {
        for dest in registry.destinations(group) {
            if !out.contains(&dest) {
                out.push(dest);
            }
        }
    }
    out
}
