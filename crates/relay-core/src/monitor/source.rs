use async_trait::async_trait;

use crate::{config::MonitorConfig, domain::Population, monitor::differ::EntitySnapshot, Result};

/// Where entity snapshots come from (the game server's public API in production).
///
/// Each call gets the live monitor settings, so a reloaded `api_base` or fetch
/// timeout applies from the next cycle on.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Full id -> name listing of one population. Any failure abandons the cycle.
    async fn fetch_snapshot(
        &self,
        settings: &MonitorConfig,
        population: Population,
    ) -> Result<EntitySnapshot>;

    /// Display name of the entity's leader (mayor or king), if known.
    async fn fetch_leader(
        &self,
        settings: &MonitorConfig,
        population: Population,
        id: &str,
    ) -> Result<Option<String>>;
}
