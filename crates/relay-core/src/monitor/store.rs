//! Durable snapshot state for the monitor.
//!
//! The file is a flat record `{towns: {id: name}, nations: {id: name}, last_updated}`
//! rewritten in full after each completed cycle:
//! 1. write `<path>.tmp`
//! 2. fsync the temp file
//! 3. rename over `<path>`
//! 4. fsync the parent directory
//!
//! A missing or unreadable file loads as "never observed" for both populations.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    domain::Population,
    errors::Error,
    monitor::differ::{Baseline, EntitySnapshot},
    Result,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub towns: Baseline,
    pub nations: Baseline,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PersistedState {
    pub fn baseline(&self, population: Population) -> &Baseline {
        match population {
            Population::Town => &self.towns,
            Population::Nation => &self.nations,
        }
    }
}

/// Synchronous so that adopting a new baseline and persisting it cannot be split
/// by a cancellation point.
pub trait StateStore: Send + Sync {
    fn load(&self) -> PersistedState;
    fn save(&self, towns: &EntitySnapshot, nations: &EntitySnapshot, at: DateTime<Utc>)
        -> Result<()>;
}

#[derive(Serialize)]
struct StateFile<'a> {
    towns: &'a EntitySnapshot,
    nations: &'a EntitySnapshot,
    last_updated: String,
}

#[derive(Clone, Debug)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, reason: impl ToString) -> Error {
        Error::Persistence {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_atomic(&self, bytes: &[u8]) -> std::io::Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }

        std::fs::rename(&tmp_path, &self.path)?;
        File::open(parent)?.sync_all()
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> PersistedState {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved monitor state");
                return PersistedState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read monitor state, starting fresh");
                return PersistedState::default();
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "monitor state is corrupt, starting fresh");
                return PersistedState::default();
            }
        };

        let state = PersistedState {
            towns: baseline_from(&value, "towns"),
            nations: baseline_from(&value, "nations"),
            last_updated: value
                .get("last_updated")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc)),
        };
        info!(
            towns = state.towns.len(),
            nations = state.nations.len(),
            "loaded monitor state"
        );
        state
    }

    fn save(
        &self,
        towns: &EntitySnapshot,
        nations: &EntitySnapshot,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&StateFile {
            towns,
            nations,
            last_updated: at.to_rfc3339(),
        })?;
        self.write_atomic(&bytes)
            .map_err(|e| self.persistence_error(e))
    }
}

fn baseline_from(value: &Value, key: &str) -> Baseline {
    let Some(section) = value.get(key) else {
        return Baseline::Unseeded;
    };
    let Some(map) = section.as_object() else {
        warn!(key, "saved monitor state section is not an object, resetting");
        return Baseline::Unseeded;
    };

    let mut snapshot = EntitySnapshot::new();
    for (id, name) in map {
        match name.as_str() {
            Some(name) => {
                snapshot.insert(id.clone(), name.to_string());
            }
            None => {
                warn!(key, id = %id, "saved monitor state has a non-string name, resetting");
                return Baseline::Unseeded;
            }
        }
    }
    Baseline::Seeded(snapshot)
}
