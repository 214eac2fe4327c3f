//! Entity-state diffing between two polls of one population.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{config::MonitorConfig, domain::Population, monitor::source::EntitySource};

pub const UNKNOWN_LEADER: &str = "Unknown";

/// Stable entity id -> current display name, ordered by id.
pub type EntitySnapshot = BTreeMap<String, String>;

/// The previous observation a new snapshot is compared against.
///
/// `Unseeded` means nothing was ever observed, which is not the same as an
/// observed population of zero entities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Baseline {
    #[default]
    Unseeded,
    Seeded(EntitySnapshot),
}

impl Baseline {
    pub fn is_seeded(&self) -> bool {
        matches!(self, Baseline::Seeded(_))
    }

    pub fn snapshot(&self) -> Option<&EntitySnapshot> {
        match self {
            Baseline::Unseeded => None,
            Baseline::Seeded(s) => Some(s),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    Created {
        id: String,
        name: String,
        leader: Option<String>,
    },
    Removed {
        id: String,
        name: String,
    },
    Renamed {
        id: String,
        old_name: String,
        new_name: String,
    },
}

impl ChangeEvent {
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Created { id, .. }
            | ChangeEvent::Removed { id, .. }
            | ChangeEvent::Renamed { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Created { .. } => "created",
            ChangeEvent::Removed { .. } => "removed",
            ChangeEvent::Renamed { .. } => "renamed",
        }
    }
}

/// Creations, then removals, then renames; ids ascending within each group.
/// An unseeded baseline yields nothing.
pub fn diff(previous: &Baseline, current: &EntitySnapshot) -> Vec<ChangeEvent> {
    let Some(previous) = previous.snapshot() else {
        return Vec::new();
    };

    let created = current
        .iter()
        .filter(|(id, _)| !previous.contains_key(*id))
        .map(|(id, name)| ChangeEvent::Created {
            id: id.clone(),
            name: name.clone(),
            leader: None,
        });

    let removed = previous
        .iter()
        .filter(|(id, _)| !current.contains_key(*id))
        .map(|(id, name)| ChangeEvent::Removed {
            id: id.clone(),
            name: name.clone(),
        });

    let renamed = current.iter().filter_map(|(id, new_name)| {
        let old_name = previous.get(id)?;
        (old_name != new_name).then(|| ChangeEvent::Renamed {
            id: id.clone(),
            old_name: old_name.clone(),
            new_name: new_name.clone(),
        })
    });

    created.chain(removed).chain(renamed).collect()
}

/// Look up the leader of every created entity. A failed lookup becomes `UNKNOWN_LEADER`.
pub async fn resolve_leaders(
    events: &mut [ChangeEvent],
    settings: &MonitorConfig,
    population: Population,
    source: &dyn EntitySource,
) {
    for event in events.iter_mut() {
        let ChangeEvent::Created { id, leader, .. } = event else {
            continue;
        };
        let found = match source.fetch_leader(settings, population, id.as_str()).await {
            Ok(Some(name)) if !name.trim().is_empty() => name,
            Ok(_) => UNKNOWN_LEADER.to_string(),
            Err(e) => {
                debug!(%population, id = %id, error = %e, "leader lookup failed");
                UNKNOWN_LEADER.to_string()
            }
        };
        *leader = Some(found);
    }
}
