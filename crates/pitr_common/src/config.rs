//! Configuration management for pitrctl.
//!
//! Loads settings from $PITRCTL_CONFIG or /etc/pitrctl/config.toml, or uses
//! defaults. Command-line flags override anything loaded here.

use crate::backrest::DEFAULT_BACKREST_CONFIG;
use crate::cluster::DEFAULT_CLUSTER_SERVICE;
use crate::confirm::Countdown;
use crate::exec::DEFAULT_DBSU;
use crate::postgres::DEFAULT_DATA_DIR;
use crate::service_state::StopPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/pitrctl/config.toml";

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "PITRCTL_CONFIG";

pub const DBSU_ENV: &str = "PITRCTL_DBSU";
pub const NON_INTERACTIVE_ENV: &str = "PITRCTL_NON_INTERACTIVE";
pub const PGDATA_ENV: &str = "PGDATA";

/// pgBackRest settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackrestSection {
    #[serde(default = "default_backrest_config")]
    pub config_path: String,

    /// Stanza name, detected from the pgBackRest config when unset
    #[serde(default)]
    pub stanza: Option<String>,

    /// Repository index
    #[serde(default)]
    pub repo: Option<String>,
}

fn default_backrest_config() -> String {
    DEFAULT_BACKREST_CONFIG.to_string()
}

impl Default for BackrestSection {
    fn default() -> Self {
        Self {
            config_path: default_backrest_config(),
            stanza: None,
            repo: None,
        }
    }
}

/// Waits and retries, all in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_cluster_poll_interval")]
    pub cluster_poll_interval_secs: u64,

    #[serde(default = "default_cluster_poll_checks")]
    pub cluster_poll_checks: u32,

    #[serde(default = "default_graceful_retries")]
    pub graceful_retries: u32,

    /// Doubled after every failed graceful stop
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    #[serde(default = "default_kill_settle")]
    pub kill_settle_secs: u64,

    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,

    #[serde(default = "default_start_wait")]
    pub start_wait_secs: u64,

    /// Confirmation countdown length, 0 disables it
    #[serde(default = "default_countdown_ticks")]
    pub countdown_ticks: u32,
}

fn default_cluster_poll_interval() -> u64 {
    5
}

fn default_cluster_poll_checks() -> u32 {
    6
}

fn default_graceful_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    2
}

fn default_stop_timeout() -> u64 {
    30
}

fn default_kill_settle() -> u64 {
    2
}

fn default_start_timeout() -> u64 {
    120
}

fn default_start_wait() -> u64 {
    30
}

fn default_countdown_ticks() -> u32 {
    5
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cluster_poll_interval_secs: default_cluster_poll_interval(),
            cluster_poll_checks: default_cluster_poll_checks(),
            graceful_retries: default_graceful_retries(),
            initial_backoff_secs: default_initial_backoff(),
            stop_timeout_secs: default_stop_timeout(),
            kill_settle_secs: default_kill_settle(),
            start_timeout_secs: default_start_timeout(),
            start_wait_secs: default_start_wait(),
            countdown_ticks: default_countdown_ticks(),
        }
    }
}

impl TimingConfig {
    pub fn stop_policy(&self) -> StopPolicy {
        StopPolicy {
            cluster_poll_interval: Duration::from_secs(self.cluster_poll_interval_secs),
            cluster_poll_checks: self.cluster_poll_checks,
            graceful_retries: self.graceful_retries.max(1),
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            kill_settle: Duration::from_secs(self.kill_settle_secs),
            start_timeout: Duration::from_secs(self.start_timeout_secs),
            start_wait: Duration::from_secs(self.start_wait_secs),
            ..StopPolicy::default()
        }
    }

    pub fn countdown(&self) -> Countdown {
        Countdown::new(self.countdown_ticks, Duration::from_secs(1))
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Database superuser
    #[serde(default = "default_dbsu")]
    pub dbsu: String,

    /// Data directory, overrides pgBackRest pg1-path and $PGDATA
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Directory holding pg_ctl
    #[serde(default)]
    pub pg_bin_dir: Option<String>,

    /// systemd unit of the cluster manager
    #[serde(default = "default_cluster_service")]
    pub cluster_service: String,

    /// Never prompt for sudo passwords
    #[serde(default)]
    pub non_interactive: bool,

    #[serde(default)]
    pub backrest: BackrestSection,

    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_dbsu() -> String {
    DEFAULT_DBSU.to_string()
}

fn default_cluster_service() -> String {
    DEFAULT_CLUSTER_SERVICE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dbsu: default_dbsu(),
            data_dir: None,
            pg_bin_dir: None,
            cluster_service: default_cluster_service(),
            non_interactive: false,
            backrest: BackrestSection::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    /// Load config from $PITRCTL_CONFIG, then the system path, else defaults
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| CONFIG_PATH.to_string());

        if !Path::new(&path).exists() {
            return Config::default();
        }
        Self::load_from_path(&path).unwrap_or_else(|e| {
            warn!("Invalid config {}, using defaults: {}", path, e);
            Config::default()
        })
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path);
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dbsu) = lookup(DBSU_ENV).filter(|v| !v.trim().is_empty()) {
            self.dbsu = dbsu.trim().to_string();
        }
        if let Some(flag) = lookup(NON_INTERACTIVE_ENV) {
            self.non_interactive = matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }
}

/// Data directory precedence: flag, config, pgBackRest pg1-path, $PGDATA,
/// then the default.
pub fn resolve_data_dir(
    flag: Option<&str>,
    config: &Config,
    pg1_path: Option<&Path>,
    pgdata_env: Option<&str>,
) -> PathBuf {
    let pick = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(PathBuf::from);

    pick(flag)
        .or_else(|| pick(config.data_dir.as_deref()))
        .or_else(|| pg1_path.map(Path::to_path_buf))
        .or_else(|| pick(pgdata_env))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dbsu, "postgres");
        assert_eq!(config.cluster_service, "patroni");
        assert_eq!(config.backrest.config_path, "/etc/pgbackrest/pgbackrest.conf");
        assert_eq!(config.timing.stop_policy(), StopPolicy::default());
        assert_eq!(config.timing.countdown(), Countdown::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
dbsu = "pg"
data_dir = "/data/pg16"

[backrest]
stanza = "pg-test"

[timing]
graceful_retries = 5
countdown_ticks = 0
"#,
        )
        .unwrap();

        let config = Config::load_from_path(path.to_str().unwrap()).unwrap();
        assert_eq!(config.dbsu, "pg");
        assert_eq!(config.data_dir.as_deref(), Some("/data/pg16"));
        assert_eq!(config.backrest.stanza.as_deref(), Some("pg-test"));
        assert_eq!(config.backrest.config_path, DEFAULT_BACKREST_CONFIG);
        assert_eq!(config.timing.graceful_retries, 5);
        assert_eq!(config.timing.stop_timeout_secs, 30);
        assert_eq!(config.timing.countdown().ticks, 0);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "dbsu = [").unwrap();
        assert!(Config::load_from_path(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            DBSU_ENV => Some("dba".to_string()),
            NON_INTERACTIVE_ENV => Some("1".to_string()),
            _ => None,
        });
        assert_eq!(config.dbsu, "dba");
        assert!(config.non_interactive);
    }

    #[test]
    fn test_data_dir_precedence() {
        let mut config = Config::default();
        let pg1 = Path::new("/backrest/data");

        assert_eq!(resolve_data_dir(None, &config, None, None), PathBuf::from("/pg/data"));
        assert_eq!(resolve_data_dir(None, &config, None, Some("/env/data")), PathBuf::from("/env/data"));
        assert_eq!(
            resolve_data_dir(None, &config, Some(pg1), Some("/env/data")),
            PathBuf::from("/backrest/data")
        );
        config.data_dir = Some("/cfg/data".to_string());
        assert_eq!(resolve_data_dir(None, &config, Some(pg1), None), PathBuf::from("/cfg/data"));
        assert_eq!(
            resolve_data_dir(Some("/flag/data"), &config, Some(pg1), None),
            PathBuf::from("/flag/data")
        );
    }
}
