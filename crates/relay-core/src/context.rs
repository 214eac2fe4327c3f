//! Application context: every long-lived component, built once at startup.

use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::{
    config::{Config, ConfigHandle},
    dispatcher::MessageDispatcher,
    messaging::port::WebhookPort,
    monitor::{EntitySource, Monitor, NotificationRenderer, Notifier, StateStore},
    webhook_cache::WebhookCache,
    Result,
};

/// Adapters the core is wired to.
pub struct Ports {
    pub webhooks: Arc<dyn WebhookPort>,
    pub entities: Arc<dyn EntitySource>,
    pub state: Arc<dyn StateStore>,
    pub renderer: Arc<dyn NotificationRenderer>,
}

pub struct AppContext {
    config: Arc<ConfigHandle>,
    webhooks: Arc<WebhookCache>,
    dispatcher: MessageDispatcher,
    monitor: Monitor,
    bot_name: OnceLock<String>,
}

impl AppContext {
    pub fn new(config: Config, ports: Ports) -> Self {
        // Webhook identity is fixed for the process lifetime; a reload does not rename.
        let webhooks = Arc::new(WebhookCache::new(ports.webhooks, config.webhook_name.clone()));
        let config = Arc::new(ConfigHandle::new(config));
        let dispatcher = MessageDispatcher::new(config.clone(), webhooks.clone());
        let notifier = Notifier::new(webhooks.clone(), ports.renderer);
        let monitor = Monitor::new(config.clone(), ports.entities, ports.state, notifier);

        Self {
            config,
            webhooks,
            dispatcher,
            monitor,
            bot_name: OnceLock::new(),
        }
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.current()
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn webhooks(&self) -> &WebhookCache {
        &self.webhooks
    }

    /// Record the connected bot identity. Only the first call has an effect.
    pub fn mark_ready(&self, bot_name: impl Into<String>) {
        let bot_name = bot_name.into();
        if self.bot_name.set(bot_name.clone()).is_ok() {
            info!(bot = %bot_name, "relay ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.bot_name.get().is_some()
    }

    pub fn bot_name(&self) -> Option<&str> {
        self.bot_name.get().map(String::as_str)
    }

    pub async fn start_monitor_if_enabled(&self) -> bool {
        if !self.config().earthmc.enabled {
            info!("entity monitor disabled in config");
            return false;
        }
        self.monitor.start().await
    }

    /// Re-read the config file this context was loaded from, then restart the
    /// monitor (full stop, then start if still enabled and the bot is ready).
    /// A file that fails to parse leaves the running configuration untouched.
    pub async fn reload_config(&self) -> Result<Arc<Config>> {
        let path = self.config().source_path.clone();
        let fresh = Config::load_from(&path)?;
        let cfg = self.config.replace(fresh);
        info!(path = %path.display(), groups = cfg.relay_groups.group_count(), "configuration reloaded");

        self.monitor.stop().await;
        if self.is_ready() && self.start_monitor_if_enabled().await {
            info!("entity monitor restarted with new config");
        }
        Ok(cfg)
    }

    pub async fn shutdown(&self) {
        self.monitor.stop().await;
    }
}
