//! In-memory fakes shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    config::MonitorConfig,
    domain::{ChannelId, Population, WebhookId},
    errors::Error,
    messaging::{
        port::WebhookPort,
        types::{ChannelInfo, ChannelKind, OutgoingMessage, ProbeOutcome, WebhookHandle},
    },
    monitor::{
        differ::EntitySnapshot,
        source::EntitySource,
        store::{PersistedState, StateStore},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub enum SendFailure {
    /// Delivery fails as if the webhook had been deleted.
    Gone,
    Transient,
}

/// A fake destination platform that tracks remote webhooks per channel.
#[derive(Default)]
pub struct FakeWebhooks {
    channels: Mutex<HashMap<ChannelId, ChannelInfo>>,
    remote: Mutex<HashMap<ChannelId, Vec<WebhookHandle>>>,
    forbidden: Mutex<HashSet<ChannelId>>,
    failing: Mutex<HashMap<ChannelId, SendFailure>>,
    sent: Mutex<Vec<(ChannelId, OutgoingMessage)>>,
    create_delay: Mutex<Option<Duration>>,
    fail_deletes: AtomicBool,
    next_id: AtomicU64,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    execute_calls: AtomicUsize,
}

impl FakeWebhooks {
    pub fn add_text_channel(&self, id: ChannelId) {
        self.add_channel(id, ChannelKind::Text);
    }

    pub fn add_channel(&self, id: ChannelId, kind: ChannelKind) {
        self.channels.lock().unwrap().insert(
            id,
            ChannelInfo {
                id,
                name: format!("chan-{id}"),
                kind,
            },
        );
    }

    pub fn seed_webhook(&self, channel_id: ChannelId, name: &str, token: Option<&str>) -> WebhookHandle {
        let handle = WebhookHandle {
            id: self.fresh_id(),
            channel_id,
            name: name.to_string(),
            token: token.map(str::to_string),
        };
        self.remote
            .lock()
            .unwrap()
            .entry(channel_id)
            .or_default()
            .push(handle.clone());
        handle
    }

    pub fn remove_remote(&self, id: WebhookId) {
        for hooks in self.remote.lock().unwrap().values_mut() {
            hooks.retain(|h| h.id != id);
        }
    }

    pub fn forbid(&self, channel_id: ChannelId) {
        self.forbidden.lock().unwrap().insert(channel_id);
    }

    pub fn fail_sends(&self, channel_id: ChannelId, failure: SendFailure) {
        self.failing.lock().unwrap().insert(channel_id, failure);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    pub fn sent(&self) -> Vec<(ChannelId, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel_id: ChannelId) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == channel_id)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    fn fresh_id(&self) -> WebhookId {
        WebhookId(1000 + self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn is_forbidden(&self, channel_id: ChannelId) -> bool {
        self.forbidden.lock().unwrap().contains(&channel_id)
    }

    fn find_remote(&self, id: WebhookId) -> Option<WebhookHandle> {
        self.remote
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|h| h.id == id)
            .cloned()
    }
}

#[async_trait]
impl WebhookPort for FakeWebhooks {
    async fn channel(&self, channel_id: ChannelId) -> Result<Option<ChannelInfo>> {
        Ok(self.channels.lock().unwrap().get(&channel_id).cloned())
    }

    async fn list_webhooks(&self, channel_id: ChannelId) -> Result<Vec<WebhookHandle>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_forbidden(channel_id) {
            return Err(Error::Permission(format!("channel {channel_id}")));
        }
        Ok(self
            .remote
            .lock()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_webhook(&self, channel_id: ChannelId, name: &str) -> Result<WebhookHandle> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_forbidden(channel_id) {
            return Err(Error::Permission(format!("channel {channel_id}")));
        }
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let id = self.fresh_id();
        let handle = WebhookHandle {
            id,
            channel_id,
            name: name.to_string(),
            token: Some(format!("token-{id}")),
        };
        self.remote
            .lock()
            .unwrap()
            .entry(channel_id)
            .or_default()
            .push(handle.clone());
        Ok(handle)
    }

    async fn delete_webhook(&self, handle: &WebhookHandle, _reason: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::Remote("delete failed".to_string()));
        }
        self.remove_remote(handle.id);
        Ok(())
    }

    async fn probe_webhook(&self, handle: &WebhookHandle) -> ProbeOutcome {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_forbidden(handle.channel_id) {
            return ProbeOutcome::Forbidden;
        }
        match self.find_remote(handle.id) {
            Some(h) => ProbeOutcome::Valid(h),
            None => ProbeOutcome::NotFound,
        }
    }

    async fn execute_webhook(&self, handle: &WebhookHandle, message: &OutgoingMessage) -> Result<()> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failing.lock().unwrap().get(&handle.channel_id).copied();
        match failure {
            Some(SendFailure::Gone) => return Err(Error::NotFound(format!("webhook {}", handle.id))),
            Some(SendFailure::Transient) => return Err(Error::Remote("503".to_string())),
            None => {}
        }
        if self.find_remote(handle.id).is_none() {
            return Err(Error::NotFound(format!("webhook {}", handle.id)));
        }
        self.sent
            .lock()
            .unwrap()
            .push((handle.channel_id, message.clone()));
        Ok(())
    }
}

/// A fake entity API with per-population snapshots and leaders.
#[derive(Default)]
pub struct FakeSource {
    snapshots: Mutex<HashMap<Population, EntitySnapshot>>,
    leaders: Mutex<HashMap<(Population, String), String>>,
    failing_leaders: Mutex<HashSet<(Population, String)>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    town_fetches: AtomicUsize,
    last_api_base: Mutex<Option<String>>,
}

impl FakeSource {
    pub fn set_snapshot(&self, population: Population, pairs: &[(&str, &str)]) {
        let snapshot = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.snapshots.lock().unwrap().insert(population, snapshot);
    }

    pub fn set_leader(&self, population: Population, id: &str, leader: &str) {
        self.leaders
            .lock()
            .unwrap()
            .insert((population, id.to_string()), leader.to_string());
    }

    pub fn fail_leader(&self, population: Population, id: &str) {
        self.failing_leaders
            .lock()
            .unwrap()
            .insert((population, id.to_string()));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn town_fetches(&self) -> usize {
        self.town_fetches.load(Ordering::SeqCst)
    }

    pub fn last_api_base(&self) -> Option<String> {
        self.last_api_base.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntitySource for FakeSource {
    async fn fetch_snapshot(
        &self,
        settings: &MonitorConfig,
        population: Population,
    ) -> Result<EntitySnapshot> {
        *self.last_api_base.lock().unwrap() = Some(settings.api_base.clone());
        if population == Population::Town {
            self.town_fetches.fetch_add(1, Ordering::SeqCst);
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Remote("503 from entity api".to_string()));
        }
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .get(&population)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_leader(
        &self,
        _settings: &MonitorConfig,
        population: Population,
        id: &str,
    ) -> Result<Option<String>> {
        let key = (population, id.to_string());
        if self.failing_leaders.lock().unwrap().contains(&key) {
            return Err(Error::Remote("detail lookup failed".to_string()));
        }
        Ok(self.leaders.lock().unwrap().get(&key).cloned())
    }
}

/// Records every save; `load` returns whatever was configured up front.
#[derive(Default)]
pub struct MemoryStore {
    initial: Mutex<PersistedState>,
    saved: Mutex<Vec<(EntitySnapshot, EntitySnapshot)>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            initial: Mutex::new(state),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Replaces what the next `load` returns.
    pub fn set_state(&self, state: PersistedState) {
        *self.initial.lock().unwrap() = state;
    }

    pub fn saves(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub fn last_saved(&self) -> Option<(EntitySnapshot, EntitySnapshot)> {
        self.saved.lock().unwrap().last().cloned()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> PersistedState {
        self.initial.lock().unwrap().clone()
    }

    fn save(&self, towns: &EntitySnapshot, nations: &EntitySnapshot, _at: DateTime<Utc>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Persistence {
                path: "memory".into(),
                reason: "disk full".to_string(),
            });
        }
        self.saved
            .lock()
            .unwrap()
            .push((towns.clone(), nations.clone()));
        Ok(())
    }
}
