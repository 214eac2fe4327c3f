//! Fakes for router tests.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use relay_core::{
    config::{Config, MonitorConfig},
    context::{AppContext, Ports},
    domain::{ChannelId, Population, WebhookId},
    messaging::{
        port::WebhookPort,
        types::{ChannelInfo, ChannelKind, OutgoingMessage, ProbeOutcome, WebhookHandle},
    },
    monitor::{ColorCodeRenderer, EntitySnapshot, EntitySource, FileStateStore},
    registry::{RelayGroup, Registry, SourceChannel},
    Result,
};

use crate::AppState;

/// Every known channel is a text channel; webhooks always validate.
#[derive(Default)]
pub struct StubWebhooks {
    hidden: Mutex<HashSet<u64>>,
    execute_delay: Mutex<Option<Duration>>,
    next_id: AtomicU64,
    executed: AtomicUsize,
}

impl StubWebhooks {
    pub fn hide_channel(&self, id: u64) {
        self.hidden.lock().unwrap().insert(id);
    }

    pub fn set_execute_delay(&self, delay: Duration) {
        *self.execute_delay.lock().unwrap() = Some(delay);
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookPort for StubWebhooks {
    async fn channel(&self, channel_id: ChannelId) -> Result<Option<ChannelInfo>> {
        if self.hidden.lock().unwrap().contains(&channel_id.0) {
            return Ok(None);
        }
        Ok(Some(ChannelInfo {
            id: channel_id,
            name: "dest".to_string(),
            kind: ChannelKind::Text,
        }))
    }

    async fn list_webhooks(&self, _channel_id: ChannelId) -> Result<Vec<WebhookHandle>> {
        Ok(Vec::new())
    }

    async fn create_webhook(&self, channel_id: ChannelId, name: &str) -> Result<WebhookHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(WebhookHandle {
            id: WebhookId(id),
            channel_id,
            name: name.to_string(),
            token: Some(format!("token-{id}")),
        })
    }

    async fn delete_webhook(&self, _handle: &WebhookHandle, _reason: &str) -> Result<()> {
        Ok(())
    }

    async fn probe_webhook(&self, handle: &WebhookHandle) -> ProbeOutcome {
        ProbeOutcome::Valid(handle.clone())
    }

    async fn execute_webhook(&self, _handle: &WebhookHandle, _message: &OutgoingMessage) -> Result<()> {
        let delay = *self.execute_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct EmptySource;

#[async_trait]
impl EntitySource for EmptySource {
    async fn fetch_snapshot(
        &self,
        _settings: &MonitorConfig,
        _population: Population,
    ) -> Result<EntitySnapshot> {
        Ok(EntitySnapshot::new())
    }

    async fn fetch_leader(
        &self,
        _settings: &MonitorConfig,
        _population: Population,
        _id: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

pub struct TestPorts {
    pub webhooks: Arc<StubWebhooks>,
    pub config_path: PathBuf,
    _dir: tempfile::TempDir,
}

/// One group `main` relaying source channel 100 to destinations 1 and 2, town
/// notifications on. `tweak` adjusts the config before it is written to disk.
pub fn test_context(tweak: impl FnOnce(&mut Config)) -> (AppState, TestPorts) {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");

    let mut cfg = Config::example().unwrap();
    cfg.relay_groups = Registry::new(
        [(
            "main".to_string(),
            RelayGroup {
                name: "Main".to_string(),
                source_channels: [(
                    "100".to_string(),
                    SourceChannel {
                        guild_id: "9".to_string(),
                        guild_name: "Home".to_string(),
                        channel_name: "general".to_string(),
                    },
                )]
                .into_iter()
                .collect(),
                destination_channels: vec!["1".to_string(), "2".to_string()],
                earthmc_towns: true,
                earthmc_nations: false,
            },
        )]
        .into_iter()
        .collect(),
    );
    cfg.earthmc.state_file = dir.path().join("state.json");
    tweak(&mut cfg);
    cfg.save_to(&config_path).unwrap();
    cfg.source_path = config_path.clone();

    let webhooks = Arc::new(StubWebhooks::default());
    let ctx = AppContext::new(
        cfg.clone(),
        Ports {
            webhooks: webhooks.clone(),
            entities: Arc::new(EmptySource),
            state: Arc::new(FileStateStore::new(cfg.earthmc.state_file.clone())),
            renderer: Arc::new(ColorCodeRenderer),
        },
    );

    (
        AppState::new(Arc::new(ctx)),
        TestPorts {
            webhooks,
            config_path,
            _dir: dir,
        },
    )
}
