use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Duration,
};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::{
    domain::Population, errors::Error, monitor::templates::NotificationTemplates,
    registry::Registry, Result,
};

pub const DEFAULT_CONFIG_PATH: &str = "./tbi/config.json";

/// Typed configuration for the relay.
///
/// Loaded from a JSON file (same layout the bot has always used); secrets and the
/// port can be overridden from the environment or a `.env` file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Display name of the webhooks this bot owns in destination channels.
    #[serde(default = "default_webhook_name")]
    pub webhook_name: String,
    /// Users allowed to run chat commands. Carried in the file; the HTTP surface
    /// authenticates with `auth_token` instead.
    #[serde(default, deserialize_with = "id_list")]
    pub admin_users: Vec<String>,
    #[serde(default)]
    pub relay_groups: Registry,
    #[serde(default)]
    pub limits: RelayLimits,
    #[serde(default)]
    pub earthmc: MonitorConfig,

    #[serde(skip)]
    pub source_path: PathBuf,
}

/// Platform limits applied while building relayed messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayLimits {
    pub max_content_len: usize,
    pub max_username_len: usize,
    pub max_embeds: usize,
    pub max_attachment_links: usize,
    pub request_timeout_secs: u64,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            max_content_len: 2000,
            max_username_len: 80,
            max_embeds: 10,
            max_attachment_links: 10,
            request_timeout_secs: 30,
        }
    }
}

impl RelayLimits {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between the start of one poll and the start of the next.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_send_delay")]
    pub send_delay_ms: u64,
    #[serde(default = "default_notifier_username")]
    pub notifier_username: String,
    #[serde(default = "default_minecraft_colors")]
    pub minecraft_colors: BTreeMap<String, String>,
    #[serde(default)]
    pub notifications: Notifications,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notifications {
    #[serde(default = "town_notifications")]
    pub town: PopulationNotifications,
    #[serde(default = "nation_notifications")]
    pub nation: PopulationNotifications,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopulationNotifications {
    pub templates: NotificationTemplates,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            town: town_notifications(),
            nation: nation_notifications(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval: default_poll_interval(),
            api_base: default_api_base(),
            state_file: default_state_file(),
            fetch_timeout_secs: default_fetch_timeout(),
            send_delay_ms: default_send_delay(),
            notifier_username: default_notifier_username(),
            minecraft_colors: default_minecraft_colors(),
            notifications: Notifications::default(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn templates(&self, population: Population) -> &NotificationTemplates {
        match population {
            Population::Town => &self.notifications.town.templates,
            Population::Nation => &self.notifications.nation.templates,
        }
    }
}

impl Config {
    /// Load from `RELAY_CONFIG_PATH` (default `./tbi/config.json`).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let path = env_path("RELAY_CONFIG_PATH").unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load a config file, writing an example configuration first if none exists.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let txt = fs::read_to_string(path)?;
            let cfg: Config = serde_json::from_str(&txt)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
            info!(path = %path.display(), "configuration loaded");
            cfg
        } else {
            warn!(path = %path.display(), "no config file found, writing example configuration");
            let cfg = Self::example()?;
            if let Err(e) = cfg.save_to(path) {
                warn!(path = %path.display(), error = %e, "failed to write example configuration");
            }
            cfg
        };

        cfg.source_path = path.to_path_buf();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let txt = serde_json::to_string_pretty(self)?;
        fs::write(path, txt)?;
        Ok(())
    }

    /// Startup requirement; the HTTP surface can run without it but nothing can be sent.
    pub fn require_bot_token(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            return Err(Error::Config(
                "bot_token is required (config file or DISCORD_BOT_TOKEN)".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(token) = env_non_empty("DISCORD_BOT_TOKEN") {
            self.bot_token = token;
        }
        if let Some(token) = env_non_empty("RELAY_AUTH_TOKEN") {
            self.auth_token = token;
        }
        if let Some(port) = env_non_empty("RELAY_PORT").and_then(|s| s.parse::<u16>().ok()) {
            self.port = port;
        }
    }

    /// The configuration written on first start.
    pub fn example() -> Result<Self> {
        let v = serde_json::json!({
            "bot_token": "",
            "auth_token": "",
            "port": default_port(),
            "webhook_name": default_webhook_name(),
            "admin_users": ["123456789012345678"],
            "relay_groups": {
                "example_group": {
                    "name": "Example Relay Group",
                    "source_channels": {
                        "123456789012345678": {
                            "guild_id": "987654321098765432",
                            "guild_name": "Source Server",
                            "channel_name": "general"
                        }
                    },
                    "destination_channels": ["111222333444555666", "222333444555666777"],
                    "earthmc_towns": false,
                    "earthmc_nations": false
                }
            }
        });
        Ok(serde_json::from_value(v)?)
    }
}

/// Shared, hot-swappable configuration.
///
/// Readers take an `Arc<Config>` snapshot and never hold the lock across an await.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<Config>>,
}

impl ConfigHandle {
    pub fn new(cfg: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(cfg)),
        }
    }

    pub fn current(&self) -> Arc<Config> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, cfg: Config) -> Arc<Config> {
        let cfg = Arc::new(cfg);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = cfg.clone();
        cfg
    }
}

fn default_port() -> u16 {
    25600
}

fn default_webhook_name() -> String {
    "Relay Bot".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_api_base() -> String {
    "https://api.earthmc.net/v3/aurora".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./tbi/data/state.json")
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_send_delay() -> u64 {
    500
}

fn default_notifier_username() -> String {
    "Project Pulitzer".to_string()
}

fn default_minecraft_colors() -> BTreeMap<String, String> {
    [
        ("0", "#000000"),
        ("1", "#0000AA"),
        ("2", "#00AA00"),
        ("3", "#00AAAA"),
        ("4", "#AA0000"),
        ("5", "#AA00AA"),
        ("6", "#FFAA00"),
        ("7", "#AAAAAA"),
        ("8", "#555555"),
        ("9", "#5555FF"),
        ("a", "#55FF55"),
        ("b", "#55FFFF"),
        ("c", "#FF5555"),
        ("d", "#FF55FF"),
        ("e", "#FFFF55"),
        ("f", "#FFFFFF"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn town_notifications() -> PopulationNotifications {
    PopulationNotifications {
        templates: NotificationTemplates {
            created: "§6[Towny] §b{leader} created a new town {name}".to_string(),
            removed: "§6[Towny] §bThe town {name} has fallen into ruins!".to_string(),
            renamed: "§6[Towny] §bThe town {old_name} has been renamed to {new_name}".to_string(),
        },
    }
}

fn nation_notifications() -> PopulationNotifications {
    PopulationNotifications {
        templates: NotificationTemplates {
            created: "§6[Towny] §b{leader} created a new nation called {name}".to_string(),
            removed: "§6[Towny] §bThe nation {name} was disbanded!".to_string(),
            renamed: "§6[Towny] §bThe nation {old_name} has been renamed to {new_name}"
                .to_string(),
        },
    }
}

fn id_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

/// Set, trimmed and not blank.
fn env_non_empty(key: &str) -> Option<String> {
    let v = env::var(key).ok()?;
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

/// Export `KEY=value` pairs from a `.env` file. Variables already present in the
/// process environment win.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    let mut applied = 0usize;
    for (key, value) in parse_dotenv(&contents) {
        if env::var_os(&key).is_none() {
            env::set_var(&key, value);
            applied += 1;
        }
    }
    debug!(path = %path.display(), applied, "loaded .env");
}

/// `#` comments, blank lines, an optional `export ` prefix, and one layer of
/// matching quotes around the value.
fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(q)
            .and_then(|rest| rest.strip_suffix(q))
        {
            return inner;
        }
    }
    value
}
