//! Destination registry: source channel -> relay group -> destination channels.
//!
//! Pure lookup over loaded configuration; owns no state of its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{ChannelId, Population};

/// Where a relayed message came from, as configured for a source channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceChannel {
    #[serde(default)]
    pub guild_id: String,
    #[serde(default = "unknown_guild")]
    pub guild_name: String,
    #[serde(default = "unknown_channel")]
    pub channel_name: String,
}

impl SourceChannel {
    pub fn unknown() -> Self {
        Self {
            guild_id: String::new(),
            guild_name: unknown_guild(),
            channel_name: unknown_channel(),
        }
    }
}

fn unknown_guild() -> String {
    "Unknown Server".to_string()
}

fn unknown_channel() -> String {
    "unknown".to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source_channels: BTreeMap<String, SourceChannel>,
    /// Sent to in this order.
    #[serde(default)]
    pub destination_channels: Vec<String>,
    #[serde(default)]
    pub earthmc_towns: bool,
    #[serde(default)]
    pub earthmc_nations: bool,
}

impl RelayGroup {
    pub fn subscribes_to(&self, population: Population) -> bool {
        match population {
            Population::Town => self.earthmc_towns,
            Population::Nation => self.earthmc_nations,
        }
    }
}

/// All relay groups keyed by group name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    groups: BTreeMap<String, RelayGroup>,
}

impl Registry {
    pub fn new(groups: BTreeMap<String, RelayGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &RelayGroup)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// First group (by name) that lists `channel_id` as a source.
    pub fn group_for_channel(&self, channel_id: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, g)| g.source_channels.contains_key(channel_id))
            .map(|(name, _)| name.as_str())
    }

    pub fn source_info(&self, channel_id: &str) -> Option<&SourceChannel> {
        self.groups
            .values()
            .find_map(|g| g.source_channels.get(channel_id))
    }

    /// Destination channels for a group in configured order; unparsable ids are skipped.
    pub fn destinations(&self, group_name: &str) -> Vec<ChannelId> {
        let Some(group) = self.groups.get(group_name) else {
            return Vec::new();
        };
        group
            .destination_channels
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .filter_map(|raw| match raw.parse::<ChannelId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(group = group_name, channel = %raw, "ignoring invalid destination channel id");
                    None
                }
            })
            .collect()
    }

    pub fn subscribed_groups(&self, population: Population) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|(_, g)| g.subscribes_to(population))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn destination_count(&self) -> usize {
        self.groups
            .values()
            .map(|g| g.destination_channels.len())
            .sum()
    }
}
