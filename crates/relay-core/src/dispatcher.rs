//! Fans one inbound message out to every destination of its relay group.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    config::{Config, ConfigHandle},
    formatting::{
        attachment_line, avatar_url, format_footer, is_image_url, message_link,
        sanitize_webhook_username, truncate_text, TRUNCATION_MARKER,
    },
    messaging::{
        inbound::InboundMessage,
        types::{OutgoingMessage, RichBlock},
    },
    registry::SourceChannel,
    webhook_cache::WebhookCache,
};

/// Why a message was not relayed at all. These are outcomes, not system faults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    MissingChannel,
    NotConfigured,
    NoDestinations,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::MissingChannel => "Missing channel_id",
            Rejection::NotConfigured => "Channel not in any relay group",
            Rejection::NoDestinations => "No destinations configured",
        }
    }
}

/// Aggregate result of one dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    /// True iff at least one destination accepted the message.
    pub success: bool,
    pub summary: String,
    pub attempted: usize,
    pub delivered: usize,
    pub rejection: Option<Rejection>,
}

impl DispatchReport {
    fn rejected(rejection: Rejection) -> Self {
        Self {
            success: false,
            summary: rejection.reason().to_string(),
            attempted: 0,
            delivered: 0,
            rejection: Some(rejection),
        }
    }

    fn fanned_out(attempted: usize, delivered: usize) -> Self {
        let summary = if delivered > 0 {
            format!("Sent to {delivered}/{attempted} destinations")
        } else {
            format!("Failed to send to all {} destinations", attempted - delivered)
        };
        Self {
            success: delivered > 0,
            summary,
            attempted,
            delivered,
            rejection: None,
        }
    }
}

#[derive(Clone)]
pub struct MessageDispatcher {
    config: Arc<ConfigHandle>,
    cache: Arc<WebhookCache>,
}

impl MessageDispatcher {
    pub fn new(config: Arc<ConfigHandle>, cache: Arc<WebhookCache>) -> Self {
        Self { config, cache }
    }

    pub async fn process(&self, inbound: &InboundMessage) -> DispatchReport {
        let channel_id = inbound.channel_id.trim();
        if channel_id.is_empty() {
            warn!("inbound message has no channel_id");
            return DispatchReport::rejected(Rejection::MissingChannel);
        }

        let cfg = self.config.current();
        let registry = &cfg.relay_groups;

        let Some(group) = registry.group_for_channel(channel_id) else {
            info!(channel = channel_id, "channel not configured for relay");
            return DispatchReport::rejected(Rejection::NotConfigured);
        };
        info!(group, channel = channel_id, "processing message for relay group");

        let source = match registry.source_info(channel_id) {
            Some(s) => s.clone(),
            None => {
                warn!(channel = channel_id, "no source info for channel");
                SourceChannel::unknown()
            }
        };

        let destinations = registry.destinations(group);
        if destinations.is_empty() {
            warn!(group, "no destinations configured");
            return DispatchReport::rejected(Rejection::NoDestinations);
        }

        let message = build_relay_message(&cfg, inbound, &source);

        let mut delivered = 0;
        for dest in &destinations {
            match self.cache.send(*dest, message.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(group, destination = %dest, error = %e, "relay to destination failed"),
            }
        }

        let report = DispatchReport::fanned_out(destinations.len(), delivered);
        if report.success {
            info!(group, "{}", report.summary);
        } else {
            warn!(group, "{}", report.summary);
        }
        report
    }
}

/// Build the webhook message for one inbound message. Pure; shared by every destination.
pub fn build_relay_message(
    cfg: &Config,
    inbound: &InboundMessage,
    source: &SourceChannel,
) -> OutgoingMessage {
    let limits = &cfg.limits;

    let link = message_link(&source.guild_id, &inbound.channel_id, &inbound.message_id);
    let footer = format_footer(source, link.as_deref());

    let mut content = if inbound.content.is_empty() {
        footer
    } else {
        format!("{}\n{footer}", inbound.content)
    };
    if let Some(line) = attachment_line(&inbound.attachments, limits.max_attachment_links) {
        content.push('\n');
        content.push_str(&line);
    }

    OutgoingMessage {
        username: sanitize_webhook_username(&inbound.author.username, limits.max_username_len),
        avatar_url: avatar_url(&inbound.author),
        content: Some(truncate_text(
            &content,
            limits.max_content_len,
            TRUNCATION_MARKER,
        )),
        blocks: build_blocks(inbound, limits.max_embeds),
        file: None,
    }
}

fn build_blocks(inbound: &InboundMessage, max: usize) -> Vec<RichBlock> {
    let mut blocks: Vec<RichBlock> = Vec::new();

    for embed in inbound.embeds.iter().take(max) {
        if embed.is_object() {
            blocks.push(RichBlock::Verbatim(embed.clone()));
        } else {
            debug!("skipping embed that is not an object");
        }
    }

    for attachment in inbound.attachments.iter().take(max) {
        if blocks.len() >= max {
            break;
        }
        if let Some(url) = attachment.link().filter(|u| is_image_url(u)) {
            blocks.push(RichBlock::Image {
                url: url.to_string(),
            });
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::{
        domain::ChannelId,
        messaging::inbound::{Author, InboundAttachment},
        registry::{RelayGroup, Registry},
        test_support::{FakeWebhooks, SendFailure},
    };

    fn config_with(destinations: &[&str]) -> Config {
        let mut sources = BTreeMap::new();
        sources.insert(
            "100".to_string(),
            SourceChannel {
                guild_id: "9".to_string(),
                guild_name: "Home".to_string(),
                channel_name: "general".to_string(),
            },
        );
        let mut groups = BTreeMap::new();
        groups.insert(
            "main".to_string(),
            RelayGroup {
                name: "Main".to_string(),
                source_channels: sources,
                destination_channels: destinations.iter().map(|d| d.to_string()).collect(),
                ..Default::default()
            },
        );
        let mut cfg = Config::example().unwrap();
        cfg.relay_groups = Registry::new(groups);
        cfg
    }

    fn inbound(content: &str) -> InboundMessage {
        InboundMessage {
            channel_id: "100".to_string(),
            message_id: "555".to_string(),
            author: Author {
                username: "alice".to_string(),
                id: Some("42".to_string()),
                avatar: Some("abc".to_string()),
                bot: None,
            },
            content: content.to_string(),
            ..Default::default()
        }
    }

    fn dispatcher(cfg: Config, port: &Arc<FakeWebhooks>) -> MessageDispatcher {
        let cache = Arc::new(WebhookCache::new(port.clone(), "Relay Bot"));
        MessageDispatcher::new(Arc::new(ConfigHandle::new(cfg)), cache)
    }

    #[tokio::test]
    async fn partial_failure_is_a_qualified_success() {
        let port = Arc::new(FakeWebhooks::default());
        for id in [1, 2, 3] {
            port.add_text_channel(ChannelId(id));
        }
        port.fail_sends(ChannelId(2), SendFailure::Transient);
        let d = dispatcher(config_with(&["1", "2", "3"]), &port);

        let report = d.process(&inbound("hello")).await;
        assert!(report.success);
        assert_eq!(report.summary, "Sent to 2/3 destinations");
        assert_eq!(port.sent_to(ChannelId(1)).len(), 1);
        assert_eq!(port.sent_to(ChannelId(3)).len(), 1);
    }

    #[tokio::test]
    async fn all_failures_report_failure_count() {
        let port = Arc::new(FakeWebhooks::default());
        port.add_text_channel(ChannelId(1));
        port.fail_sends(ChannelId(1), SendFailure::Transient);
        let d = dispatcher(config_with(&["1", "2"]), &port);

        let report = d.process(&inbound("hello")).await;
        assert!(!report.success);
        assert_eq!(report.summary, "Failed to send to all 2 destinations");
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn missing_or_wrong_type_destination_does_not_block_others() {
        let port = Arc::new(FakeWebhooks::default());
        port.add_channel(ChannelId(1), crate::messaging::types::ChannelKind::Other(2));
        port.add_text_channel(ChannelId(3));
        let d = dispatcher(config_with(&["1", "2", "3"]), &port);

        let report = d.process(&inbound("hello")).await;
        assert!(report.success);
        assert_eq!(report.summary, "Sent to 1/3 destinations");
    }

    #[tokio::test]
    async fn missing_channel_id_fails_fast() {
        let port = Arc::new(FakeWebhooks::default());
        let d = dispatcher(config_with(&["1"]), &port);

        let mut msg = inbound("hello");
        msg.channel_id = String::new();
        let report = d.process(&msg).await;
        assert_eq!(report.rejection, Some(Rejection::MissingChannel));
        assert_eq!(report.summary, "Missing channel_id");
        assert_eq!(port.list_calls(), 0);
    }

    #[tokio::test]
    async fn unconfigured_channel_and_empty_destinations_are_outcomes() {
        let port = Arc::new(FakeWebhooks::default());
        let d = dispatcher(config_with(&[]), &port);

        let mut msg = inbound("hello");
        let report = d.process(&msg).await;
        assert_eq!(report.rejection, Some(Rejection::NoDestinations));

        msg.channel_id = "999".to_string();
        let report = d.process(&msg).await;
        assert_eq!(report.rejection, Some(Rejection::NotConfigured));
        assert!(!report.success);
    }

    #[test]
    fn relay_message_carries_footer_link_and_attachments() {
        let cfg = config_with(&["1"]);
        let mut msg = inbound("hello");
        msg.attachments = vec![
            InboundAttachment {
                filename: "cat.PNG".to_string(),
                url: Some("https://cdn/x/cat.PNG?ex=1".to_string()),
                proxy_url: None,
            },
            InboundAttachment {
                filename: "notes.txt".to_string(),
                url: None,
                proxy_url: Some("https://proxy/notes.txt".to_string()),
            },
        ];
        let source = cfg.relay_groups.source_info("100").unwrap().clone();

        let out = build_relay_message(&cfg, &msg, &source);
        assert_eq!(out.username, "alice");
        assert_eq!(
            out.avatar_url.as_deref(),
            Some("https://cdn.discordapp.com/avatars/42/abc.png")
        );
        let content = out.content.unwrap();
        assert!(content.starts_with("hello\n\n-# 📍 **Home** | #general"));
        assert!(content.contains("-# [Jump to Message](https://discord.com/channels/9/100/555)"));
        assert!(content.ends_with(
            "-# [cat.PNG](https://cdn/x/cat.PNG?ex=1), [notes.txt](https://proxy/notes.txt)"
        ));
        assert_eq!(
            out.blocks,
            vec![RichBlock::Image {
                url: "https://cdn/x/cat.PNG?ex=1".to_string()
            }]
        );
    }

    #[test]
    fn long_content_is_cut_to_the_platform_cap() {
        let cfg = config_with(&["1"]);
        let source = SourceChannel::unknown();
        let out = build_relay_message(&cfg, &inbound(&"é".repeat(5000)), &source);
        let content = out.content.unwrap();
        assert_eq!(content.chars().count(), 2000);
        assert!(content.ends_with("..."));
    }

    #[test]
    fn embeds_and_images_share_one_cap() {
        let cfg = config_with(&["1"]);
        let mut msg = inbound("");
        msg.embeds = (0..9).map(|i| json!({ "title": i })).collect();
        msg.embeds.push(json!("not an embed"));
        msg.attachments = (0..5)
            .map(|i| InboundAttachment {
                filename: format!("{i}.png"),
                url: Some(format!("https://cdn/{i}.png")),
                proxy_url: None,
            })
            .collect();

        let out = build_relay_message(&cfg, &msg, &SourceChannel::unknown());
        assert_eq!(out.blocks.len(), 10);
        assert!(matches!(out.blocks[9], RichBlock::Image { .. }));
    }
}
