// =============================================================================
// Module: Configuration
// =============================================================================
//
// TOML config file plus a couple of environment overrides, matching the
// three-section (`[general]`/`[database]`/`[interlink]`) layout of the
// original service configuration. The original's Postgres-backed database
// section took its connection parameters from `PGHOST`/`PGUSER`/
// `PGPASSWORD`; this SQLite-backed store has no host/user/password to
// override, so the equivalent knobs are `SERVICEMAP_DB_PATH` (file path)
// and `SERVICEMAP_LISTEN` (listen address). Every field carries
// `#[serde(default)]` so that adding a field never breaks loading an
// older config file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_risk_cache_every() -> String {
    "15m".to_string()
}

fn default_database_path() -> String {
    "servicemap.db".to_string()
}

fn default_run_every() -> String {
    "10m".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub interlink: InterlinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_risk_cache_every")]
    pub risk_cache_every: String,
    #[serde(default)]
    pub disable_api_auth: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            risk_cache_every: default_risk_cache_every(),
            disable_api_auth: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterlinkConfig {
    #[serde(default)]
    pub rule_path: Option<String>,
    #[serde(default = "default_run_every")]
    pub run_every: String,
}

impl Default for InterlinkConfig {
    fn default() -> Self {
        Self {
            rule_path: None,
            run_every: default_run_every(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            database: DatabaseConfig::default(),
            interlink: InterlinkConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config file at `path`, then applies `SERVICEMAP_DB_PATH`
    /// and `SERVICEMAP_LISTEN` environment overrides on top.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut cfg: Config =
            toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("SERVICEMAP_DB_PATH") {
            self.database.path = path;
        }
        if let Ok(listen) = std::env::var("SERVICEMAP_LISTEN") {
            self.general.listen = listen;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.listen.trim().is_empty() {
            anyhow::bail!("general.listen must not be empty");
        }
        if self.database.path.trim().is_empty() {
            anyhow::bail!("database.path must not be empty");
        }
        Ok(())
    }

    /// Parses `general.risk_cache_every`, falling back to the default and
    /// logging a warning if the string doesn't parse.
    pub fn risk_cache_every(&self) -> std::time::Duration {
        humantime::parse_duration(&self.general.risk_cache_every).unwrap_or_else(|_| {
            tracing::warn!(
                value = %self.general.risk_cache_every,
                "invalid general.risk_cache_every, falling back to 15m"
            );
            std::time::Duration::from_secs(15 * 60)
        })
    }

    /// Parses `interlink.run_every`, falling back to the default and
    /// logging a warning if the string doesn't parse.
    pub fn interlink_run_every(&self) -> std::time::Duration {
        humantime::parse_duration(&self.interlink.run_every).unwrap_or_else(|_| {
            tracing::warn!(
                value = %self.interlink.run_every,
                "invalid interlink.run_every, falling back to 10m"
            );
            std::time::Duration::from_secs(10 * 60)
        })
    }
}
