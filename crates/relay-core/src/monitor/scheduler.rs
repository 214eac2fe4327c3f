//! The poll loop.
//!
//! One background task runs `Idle -> Fetching -> Diffing -> Notifying -> Persisting`
//! at a fixed cadence measured from the start of one fetch to the start of the
//! next. A failed fetch abandons the cycle and waits a full interval.
//!
//! Adopting a new baseline and saving it happen without a suspension point in
//! between, so cancelling the task can never leave a half-committed cycle. `stop`
//! and `force_check` await the cancelled task before anything else runs, which keeps
//! an old cycle from writing over a newer one.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::{Config, ConfigHandle},
    domain::Population,
    errors::Error,
    monitor::{
        differ::{diff, resolve_leaders, Baseline, ChangeEvent, EntitySnapshot},
        notifier::{Notifier, Pacing},
        source::EntitySource,
        store::StateStore,
    },
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    Idle,
    Fetching,
    Diffing,
    Notifying,
    Persisting,
    Stopped,
}

#[derive(Clone, Debug, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub phase: MonitorPhase,
    pub towns_tracked: usize,
    pub nations_tracked: usize,
    pub last_cycle: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Baselines {
    towns: Baseline,
    nations: Baseline,
    last_cycle: Option<DateTime<Utc>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    config: Arc<ConfigHandle>,
    source: Arc<dyn EntitySource>,
    store: Arc<dyn StateStore>,
    notifier: Notifier,
    baselines: StdMutex<Baselines>,
    phase: watch::Sender<MonitorPhase>,
    control: Mutex<Option<Running>>,
}

#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    pub fn new(
        config: Arc<ConfigHandle>,
        source: Arc<dyn EntitySource>,
        store: Arc<dyn StateStore>,
        notifier: Notifier,
    ) -> Self {
        let (phase, _) = watch::channel(MonitorPhase::Stopped);
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                store,
                notifier,
                baselines: StdMutex::new(Baselines::default()),
                phase,
                control: Mutex::new(None),
            }),
        }
    }

    /// Load persisted state and start polling. Returns `false` if already running.
    pub async fn start(&self) -> bool {
        let mut control = self.inner.control.lock().await;
        if is_running(&control) {
            return false;
        }

        self.inner.restore();
        *control = Some(self.spawn_loop());
        info!("monitor started");
        true
    }

    /// Cancel the loop and wait for it to finish.
    pub async fn stop(&self) {
        let mut control = self.inner.control.lock().await;
        if stop_locked(&mut control).await {
            info!("monitor stopped");
        }
        self.inner.set_phase(MonitorPhase::Stopped);
    }

    /// Abandon the current wait or cycle and poll immediately.
    /// Returns `false` when the monitor is not running.
    pub async fn force_check(&self) -> bool {
        let mut control = self.inner.control.lock().await;
        if !is_running(&control) {
            return false;
        }
        stop_locked(&mut control).await;
        *control = Some(self.spawn_loop());
        info!("forced monitor check");
        true
    }

    pub async fn is_running(&self) -> bool {
        is_running(&*self.inner.control.lock().await)
    }

    pub fn phase(&self) -> MonitorPhase {
        *self.inner.phase.borrow()
    }

    pub fn phases(&self) -> watch::Receiver<MonitorPhase> {
        self.inner.phase.subscribe()
    }

    pub async fn status(&self) -> MonitorStatus {
        let running = self.is_running().await;
        let b = self.inner.lock_baselines();
        MonitorStatus {
            running,
            phase: self.phase(),
            towns_tracked: b.towns.len(),
            nations_tracked: b.nations.len(),
            last_cycle: b.last_cycle,
        }
    }

    fn spawn_loop(&self) -> Running {
        let cancel = CancellationToken::new();
        let inner = self.inner.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.run(token).await });
        Running { cancel, handle }
    }
}

fn is_running(control: &Option<Running>) -> bool {
    control.as_ref().is_some_and(|r| !r.handle.is_finished())
}

async fn stop_locked(control: &mut Option<Running>) -> bool {
    let Some(running) = control.take() else {
        return false;
    };
    running.cancel.cancel();
    if let Err(e) = running.handle.await {
        if e.is_panic() {
            error!(error = %e, "monitor task panicked");
        }
    }
    true
}

impl Inner {
    fn lock_baselines(&self) -> MutexGuard<'_, Baselines> {
        self.baselines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load persisted baselines, but only while memory holds none. After a cycle has
    /// run, memory is at least as new as the store (a save may have failed).
    fn restore(&self) {
        if self.lock_baselines().last_cycle.is_some() {
            return;
        }
        let saved = self.store.load();
        let mut b = self.lock_baselines();
        b.towns = saved.towns;
        b.nations = saved.nations;
        b.last_cycle = saved.last_updated;
    }

    fn set_phase(&self, phase: MonitorPhase) {
        self.phase.send_replace(phase);
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let started = Instant::now();
            let cfg = self.config.current();
            let interval = cfg.earthmc.poll_interval();

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.run_cycle(&cfg) => r,
            };

            let wake = match outcome {
                Ok(()) => started + interval,
                Err(e) => {
                    warn!(error = %e, "poll cycle failed, retrying after the full interval");
                    Instant::now() + interval
                }
            };

            self.set_phase(MonitorPhase::Idle);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep_until(wake) => {}
            }
        }
        self.set_phase(MonitorPhase::Stopped);
        debug!("monitor loop exited");
    }

    async fn run_cycle(&self, cfg: &Config) -> Result<()> {
        self.set_phase(MonitorPhase::Fetching);
        info!("polling entity source");
        let towns = self.fetch(cfg, Population::Town).await?;
        let nations = self.fetch(cfg, Population::Nation).await?;

        self.set_phase(MonitorPhase::Diffing);
        let (prev_towns, prev_nations) = {
            let b = self.lock_baselines();
            (b.towns.clone(), b.nations.clone())
        };
        let mut town_events = diff(&prev_towns, &towns);
        let mut nation_events = diff(&prev_nations, &nations);
        let settings = &cfg.earthmc;
        resolve_leaders(&mut town_events, settings, Population::Town, self.source.as_ref()).await;
        resolve_leaders(&mut nation_events, settings, Population::Nation, self.source.as_ref())
            .await;

        if !town_events.is_empty() || !nation_events.is_empty() {
            self.set_phase(MonitorPhase::Notifying);
            let mut pacing = Pacing::new(cfg.earthmc.send_delay());
            self.notify(cfg, Population::Town, &town_events, &mut pacing)
                .await;
            self.notify(cfg, Population::Nation, &nation_events, &mut pacing)
                .await;
        }

        self.set_phase(MonitorPhase::Persisting);
        self.commit(towns, nations);
        Ok(())
    }

    async fn fetch(&self, cfg: &Config, population: Population) -> Result<EntitySnapshot> {
        tokio::time::timeout(
            cfg.earthmc.fetch_timeout(),
            self.source.fetch_snapshot(&cfg.earthmc, population),
        )
        .await
        .map_err(|_| Error::Remote(format!("{population} fetch timed out")))?
    }

    async fn notify(
        &self,
        cfg: &Config,
        population: Population,
        events: &[ChangeEvent],
        pacing: &mut Pacing,
    ) {
        let templates = cfg.earthmc.templates(population);
        for event in events {
            info!(%population, kind = event.kind(), id = event.id(), "entity change detected");
            match templates.render(event) {
                Ok(text) => {
                    self.notifier
                        .broadcast(cfg, population, &text, pacing)
                        .await;
                }
                Err(e) => warn!(%population, kind = event.kind(), error = %e, "cannot render notification"),
            }
        }
    }

    /// Persist, then adopt. No await in here.
    fn commit(&self, towns: EntitySnapshot, nations: EntitySnapshot) {
        let now = Utc::now();
        if let Err(e) = self.store.save(&towns, &nations, now) {
            error!(error = %e, "failed to save monitor state");
        }

        info!(
            towns = towns.len(),
            nations = nations.len(),
            "monitor cycle complete"
        );
        let mut b = self.lock_baselines();
        b.towns = Baseline::Seeded(towns);
        b.nations = Baseline::Seeded(nations);
        b.last_cycle = Some(now);
    }
}
