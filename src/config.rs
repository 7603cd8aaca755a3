//! Service configuration
//!
//! Defaults, then an optional TOML file, then `WHEELHOUSE_*` environment
//! variables, then validation. The binary applies CLI flags on top.

use crate::errors::{ConfigurationError, WheelhouseResult};
use crate::games::round::TableLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WheelhouseConfig {
    pub game: GameConfig,
    pub lifecycle: LifecycleConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

/// Table and ledger parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Credits granted to a newly referenced account
    pub starting_balance: u64,
    pub house_starting_balance: u64,
    pub player_log_capacity: usize,
    pub house_log_capacity: usize,
    pub min_bet: u64,
    pub max_bet: u64,
    pub max_bets_per_round: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1000,
            house_starting_balance: 1_000_000,
            player_log_capacity: 100,
            house_log_capacity: 1000,
            min_bet: 1,
            max_bet: 100_000,
            max_bets_per_round: 50,
        }
    }
}

impl GameConfig {
    pub fn limits(&self) -> TableLimits {
        TableLimits {
            min_bet: self.min_bet,
            max_bet: self.max_bet,
            max_positions: self.max_bets_per_round,
        }
    }
}

/// Background task timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    pub sweep_interval_secs: u64,
    /// Settled rounds idle longer than this are evicted
    pub round_idle_secs: u64,
    pub flush_interval_secs: u64,
    pub stats_window_secs: u64,
    pub settlement_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            round_idle_secs: 3600,
            flush_interval_secs: 5,
            stats_window_secs: 86_400,
            settlement_timeout_ms: 5_000,
        }
    }
}

impl LifecycleConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn settlement_timeout(&self) -> Duration {
        Duration::from_millis(self.settlement_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    RocksDb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rocksdb" | "rocks" => Ok(StorageBackend::RocksDb),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: PathBuf,
    pub backup_directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: PathBuf::from("./DB/wheelhouse"),
            backup_directory: PathBuf::from("./DB/backups"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// Log a table summary on every sweep
    pub summary_on_sweep: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            summary_on_sweep: true,
        }
    }
}

impl WheelhouseConfig {
    /// Local play: in-memory store, quick flushes, verbose logs
    pub fn development() -> Self {
        Self {
            lifecycle: LifecycleConfig {
                sweep_interval_secs: 30,
                flush_interval_secs: 1,
                ..LifecycleConfig::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..StorageConfig::default()
            },
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                ..ApiConfig::default()
            },
            monitoring: MonitoringConfig {
                log_level: "debug".to_string(),
                ..MonitoringConfig::default()
            },
            ..Self::default()
        }
    }

    /// Durable RocksDB store, conservative timeouts
    pub fn production() -> Self {
        Self {
            lifecycle: LifecycleConfig {
                flush_interval_secs: 2,
                ..LifecycleConfig::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::RocksDb,
                data_directory: PathBuf::from("/var/lib/wheelhouse/db"),
                backup_directory: PathBuf::from("/var/lib/wheelhouse/backups"),
            },
            api: ApiConfig {
                request_timeout_secs: 10,
                ..ApiConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let game = &self.game;
        if game.player_log_capacity == 0 {
            return Err(invalid("game.player_log_capacity", 0, "must be at least 1"));
        }
        if game.house_log_capacity == 0 {
            return Err(invalid("game.house_log_capacity", 0, "must be at least 1"));
        }
        if game.min_bet == 0 {
            return Err(invalid("game.min_bet", 0, "must be at least 1"));
        }
        if game.max_bet < game.min_bet {
            return Err(invalid("game.max_bet", game.max_bet, "must not be below game.min_bet"));
        }
        if game.max_bets_per_round == 0 {
            return Err(invalid("game.max_bets_per_round", 0, "must be at least 1"));
        }

        let lifecycle = &self.lifecycle;
        if lifecycle.sweep_interval_secs == 0 {
            return Err(invalid("lifecycle.sweep_interval_secs", 0, "must be at least 1"));
        }
        if lifecycle.flush_interval_secs == 0 {
            return Err(invalid("lifecycle.flush_interval_secs", 0, "must be at least 1"));
        }
        if lifecycle.stats_window_secs == 0 {
            return Err(invalid("lifecycle.stats_window_secs", 0, "must be at least 1"));
        }
        if lifecycle.settlement_timeout_ms < 10 {
            return Err(invalid(
                "lifecycle.settlement_timeout_ms",
                lifecycle.settlement_timeout_ms,
                "must be at least 10ms",
            ));
        }

        if self.storage.backend == StorageBackend::RocksDb && self.storage.data_directory.as_os_str().is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_directory".to_string()));
        }
        if self.storage.backup_directory.as_os_str().is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.backup_directory".to_string()));
        }

        if self.api.port == 0 {
            return Err(invalid("api.port", 0, "port cannot be zero"));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(invalid("api.request_timeout_secs", 0, "must be at least 1"));
        }
        if self.monitoring.log_level.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired("monitoring.log_level".to_string()));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Loads configuration with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    base: Option<WheelhouseConfig>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting point used when no file is given
    pub fn with_base(mut self, base: WheelhouseConfig) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// File (or defaults), then process environment, then validation
    pub fn load(&self) -> WheelhouseResult<WheelhouseConfig> {
        self.load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with an explicit variable lookup
    pub fn load_with<F>(&self, lookup: F) -> WheelhouseResult<WheelhouseConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.config_path {
            Some(path) => Self::load_from_file(path)?,
            None => self.base.clone().unwrap_or_default(),
        };

        apply_overrides(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> WheelhouseResult<WheelhouseConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    pub fn save(&self, config: &WheelhouseConfig, path: &Path) -> WheelhouseResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path.display(), e)).into()
        })
    }
}

fn apply_overrides<F>(config: &mut WheelhouseConfig, lookup: F) -> Result<(), ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = parsed(&lookup, "WHEELHOUSE_STARTING_BALANCE")? {
        config.game.starting_balance = v;
    }
    if let Some(v) = parsed(&lookup, "WHEELHOUSE_HOUSE_BALANCE")? {
        config.game.house_starting_balance = v;
    }
    if let Some(v) = parsed(&lookup, "WHEELHOUSE_MAX_BET")? {
        config.game.max_bet = v;
    }
    if let Some(v) = parsed(&lookup, "WHEELHOUSE_FLUSH_INTERVAL_SECS")? {
        config.lifecycle.flush_interval_secs = v;
    }
    if let Some(v) = parsed(&lookup, "WHEELHOUSE_ROUND_IDLE_SECS")? {
        config.lifecycle.round_idle_secs = v;
    }
    if let Some(v) = parsed(&lookup, "WHEELHOUSE_STORAGE_BACKEND")? {
        config.storage.backend = v;
    }
    if let Some(dir) = lookup("WHEELHOUSE_DATA_DIR") {
        config.storage.data_directory = PathBuf::from(dir);
    }
    if let Some(dir) = lookup("WHEELHOUSE_BACKUP_DIR") {
        config.storage.backup_directory = PathBuf::from(dir);
    }
    if let Some(host) = lookup("WHEELHOUSE_API_HOST") {
        config.api.host = host;
    }
    if let Some(v) = parsed(&lookup, "WHEELHOUSE_API_PORT")? {
        config.api.port = v;
    }
    if let Some(level) = lookup("WHEELHOUSE_LOG_LEVEL") {
        config.monitoring.log_level = level;
    }
    Ok(())
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigurationError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigurationError::InvalidValue {
            field: key.to_string(),
            value: raw,
            reason: format!("expected {}", std::any::type_name::<T>()),
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = WheelhouseConfig::default();
        assert_eq!(config.game.starting_balance, 1000);
        assert_eq!(config.game.player_log_capacity, 100);
        assert_eq!(config.game.house_log_capacity, 1000);
        assert_eq!(config.lifecycle.round_idle_secs, 3600);
        assert_eq!(config.api.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        assert!(WheelhouseConfig::development().validate().is_ok());
        assert!(WheelhouseConfig::production().validate().is_ok());
        assert_eq!(WheelhouseConfig::development().storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_config_validation() {
        let mut config = WheelhouseConfig::default();
        config.api.port = 0;
        assert!(config.validate().is_err());

        let mut config = WheelhouseConfig::default();
        config.game.max_bet = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "game.max_bet"
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = ConfigLoader::new()
            .load_with(env(&[
                ("WHEELHOUSE_STARTING_BALANCE", "250"),
                ("WHEELHOUSE_STORAGE_BACKEND", "memory"),
                ("WHEELHOUSE_API_PORT", "9090"),
            ]))
            .unwrap();

        assert_eq!(config.game.starting_balance, 250);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.api.port, 9090);
    }

    #[test]
    fn test_base_preset_used_without_file() {
        let config = ConfigLoader::new()
            .with_base(WheelhouseConfig::development())
            .load_with(env(&[("WHEELHOUSE_API_PORT", "7070")]))
            .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.api.port, 7070);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let err = ConfigLoader::new()
            .load_with(env(&[("WHEELHOUSE_API_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(err.to_string().contains("WHEELHOUSE_API_PORT"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[game]\nstarting_balance = 42\n").unwrap();

        let config = ConfigLoader::new().with_path(file.path()).load_with(env(&[])).unwrap();

        assert_eq!(config.game.starting_balance, 42);
        assert_eq!(config.game.house_starting_balance, 1_000_000);
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_save_and_load_config() -> WheelhouseResult<()> {
        let file = NamedTempFile::new().unwrap();
        let original = WheelhouseConfig::production();

        ConfigLoader::new().save(&original, file.path())?;
        let loaded = ConfigLoader::new().with_path(file.path()).load_with(env(&[]))?;

        assert_eq!(loaded, original);
        Ok(())
    }
}
