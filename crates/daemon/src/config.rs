//! Daemon configuration
//!
//! Layers, lowest to highest precedence:
//! 1. built-in defaults (the `Default` impls below and in each crate)
//! 2. a TOML file: `CATALOG_INGEST_CONFIG`, else `./catalog-ingest.toml` if present
//! 3. environment: `CATALOG_INGEST__<SECTION>__<KEY>`, e.g.
//!    `CATALOG_INGEST__WORKER__POOL_SIZE=8`

use anyhow::{Context, Result};
use catalog_ingest_api_http::{HttpConfig, RateLimitConfig};
use catalog_ingest_core::application::{RetryConfig, SweepConfig, WorkerConfig};
use catalog_ingest_core::port::{MaintenanceConfig, Topology};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_PATH_ENV: &str = "CATALOG_INGEST_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "catalog-ingest.toml";
const ENV_PREFIX: &str = "CATALOG_INGEST";
const DEFAULT_DB_URL: &str = "sqlite://~/.catalog-ingest/catalog.db";
const DEFAULT_STORAGE_ROOT: &str = "~/.catalog-ingest/uploads";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub http: HttpConfig,
    pub broker: BrokerSettings,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    pub sweep: SweepConfig,
    pub maintenance: MaintenanceSettings,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DB_URL.to_string(),
            max_connections: catalog_ingest_infra_sqlite::DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for uploaded source files
    pub root: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: DEFAULT_STORAGE_ROOT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Broker tables live here; defaults to the job database
    pub database_url: Option<String>,
    pub topology: Topology,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceSettings {
    pub interval_hours: u64,
    pub retention_days: i64,
    pub max_db_size_mb: f64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        let defaults = MaintenanceConfig::default();
        Self {
            interval_hours: 24,
            retention_days: defaults.finished_job_retention_days,
            max_db_size_mb: defaults.max_db_size_mb,
        }
    }
}

impl MaintenanceSettings {
    pub fn to_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            finished_job_retention_days: self.retention_days,
            max_db_size_mb: self.max_db_size_mb,
        }
    }
}

impl Settings {
    /// Load from the file named by `CATALOG_INGEST_CONFIG` (or the default
    /// file name in the working directory) and the environment
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from(explicit.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        Ok(settings.expanded())
    }

    /// Expand `~` and `$VAR` in path-like settings
    fn expanded(mut self) -> Self {
        self.database.url = expand(&self.database.url);
        self.storage.root = expand(&self.storage.root);
        self.broker.database_url = self.broker.database_url.as_deref().map(expand);
        self
    }

    pub fn broker_database_url(&self) -> &str {
        self.broker
            .database_url
            .as_deref()
            .unwrap_or(&self.database.url)
    }
}

fn expand(value: &str) -> String {
    match value.strip_prefix("sqlite://") {
        Some(path) => format!("sqlite://{}", expand_path(path)),
        None => expand_path(value),
    }
}

fn expand_path(value: &str) -> String {
    match shellexpand::full(value) {
        Ok(expanded) => expanded.into_owned(),
        Err(_) => shellexpand::tilde(value).into_owned(),
    }
}

/// Directory that must exist before SQLite can create the database file
pub fn sqlite_parent_dir(url: &str) -> Option<PathBuf> {
    let path = url.strip_prefix("sqlite://")?;
    let path = path.split('?').next()?;
    if path.is_empty() || path.starts_with(':') {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
