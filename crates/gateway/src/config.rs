//! Gateway configuration: optional YAML file, overridden by CLI flags / env.

use anyhow::Context as _;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_TABLE_PREFIX: &str = "mdl_";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Config file shape (`--config`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Per-call timeout in seconds (`0` disables it).
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub table_prefix: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// Apply the bundled schema migration on startup.
    #[serde(default)]
    pub migrate: bool,
    /// SQL script executed after migrations (relative paths resolve against the config file).
    #[serde(default)]
    pub seed_sql: Option<PathBuf>,
}

/// Values supplied on the command line / environment; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub database_url: Option<String>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind: SocketAddr,
    pub database_url: String,
    pub table_prefix: String,
    pub max_connections: u32,
    pub migrate: bool,
    pub seed_sql: Option<PathBuf>,
    pub request_timeout: Option<Duration>,
}

/// Load and parse a YAML config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid config.
pub fn load_config(path: &Path) -> anyhow::Result<GatewayConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let mut cfg: GatewayConfig =
        serde_yaml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;

    if let Some(seed) = cfg.database.seed_sql.as_mut()
        && seed.is_relative()
        && let Some(dir) = path.parent()
    {
        *seed = dir.join(&*seed);
    }

    Ok(cfg)
}

impl Settings {
    /// Merge file config and overrides over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if no database URL is configured or the bind address is invalid.
    pub fn resolve(file: GatewayConfig, overrides: Overrides) -> anyhow::Result<Self> {
        let bind = overrides
            .bind
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind
            .parse()
            .with_context(|| format!("invalid bind address '{bind}'"))?;

        let database_url = overrides
            .database_url
            .or(file.database.url)
            .filter(|u| !u.trim().is_empty())
            .context("no database URL configured (set --database-url or database.url)")?;

        let request_timeout = match file
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            bind,
            database_url,
            table_prefix: file
                .database
                .table_prefix
                .unwrap_or_else(|| DEFAULT_TABLE_PREFIX.to_string()),
            max_connections: file
                .database
                .max_connections
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            migrate: file.database.migrate,
            seed_sql: file.database.seed_sql,
            request_timeout,
        })
    }
}
