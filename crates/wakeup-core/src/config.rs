use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 1000;
pub const ENV_PREFIX: &str = "WAKEUP_";

/// Top-level config (wakeup.toml + WAKEUP_* env overrides).
///
/// Nested keys are addressed with a double underscore in the environment,
/// e.g. `WAKEUP_TIMER__EXACT_ALARMS=false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WakeupConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub fire: FireConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Host wake-timer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Whether the host grants exact-time alarms at start-up.
    /// When false every `schedule` attempt is refused and the alarm is disabled.
    #[serde(default = "bool_true")]
    pub exact_alarms: bool,
    /// How often `run` checks the database for alarms changed by other
    /// processes (e.g. `wakeupd add`).
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            exact_alarms: true,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
        }
    }
}

/// Presentation hand-off channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Timer → fire handler channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_sync_interval_ms() -> u64 {
    DEFAULT_SYNC_INTERVAL_MS
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wakeup/wakeup.db", home)
}

impl WakeupConfig {
    /// Load config from a TOML file with WAKEUP_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. WAKEUP_CONFIG env var
    ///   3. ~/.wakeup/wakeup.toml
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("WAKEUP_CONFIG").ok())
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        let config: WakeupConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| crate::error::WakeupError::Config(e.to_string()))?;

        Ok(config)
    }
}

pub fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wakeup/wakeup.toml", home)
}
