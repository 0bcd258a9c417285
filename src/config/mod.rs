use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub logos: LogoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token required by the admin refresh routes; open when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Where the token-list provider lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Full URL of the asset-platform listing
    #[serde(default = "default_asset_platforms_url")]
    pub asset_platforms_url: String,
    /// Base URL under which `<platformId>/all.json` token lists are served
    #[serde(default = "default_token_list_base_url")]
    pub token_list_base_url: String,
    #[serde(with = "duration", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Chains re-indexed on every scheduled cycle
    #[serde(default)]
    pub supported_chain_ids: Vec<u64>,
    /// Six-field cron expression (seconds first)
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(with = "duration", default = "default_base_delay")]
    pub base_delay: Duration,
    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,
    #[serde(with = "duration", default = "default_lock_ttl")]
    pub lock_ttl: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoConfig {
    /// HTTP gateway prefix that `ipfs://` URIs are rewritten onto
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
    /// Placeholder service; `<chainId>:<address>` is appended
    #[serde(default = "default_identicon_base_url")]
    pub identicon_base_url: String,
    #[serde(default = "default_native_logo")]
    pub default_native_logo: String,
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
    /// Native-token logos keyed by chain id
    #[serde(default = "default_native_logos")]
    pub native_logos: BTreeMap<String, String>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_asset_platforms_url() -> String {
    DEFAULT_ASSET_PLATFORMS_URL.to_string()
}

fn default_token_list_base_url() -> String {
    DEFAULT_TOKEN_LIST_BASE_URL.to_string()
}

fn default_connect_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_CONNECT_TIMEOUT).unwrap_or(Duration::from_secs(10))
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}

fn default_run_on_startup() -> bool {
    DEFAULT_RUN_ON_STARTUP
}

fn default_fetch_attempts() -> u32 {
    DEFAULT_FETCH_ATTEMPTS
}

fn default_base_delay() -> Duration {
    humantime::parse_duration(DEFAULT_BASE_DELAY).unwrap_or(Duration::from_millis(800))
}

fn default_write_concurrency() -> usize {
    DEFAULT_WRITE_CONCURRENCY
}

fn default_lock_ttl() -> Duration {
    humantime::parse_duration(DEFAULT_LOCK_TTL).unwrap_or(Duration::from_secs(300))
}

fn default_ipfs_gateway() -> String {
    DEFAULT_IPFS_GATEWAY.to_string()
}

fn default_identicon_base_url() -> String {
    DEFAULT_IDENTICON_BASE_URL.to_string()
}

fn default_native_logo() -> String {
    DEFAULT_NATIVE_LOGO.to_string()
}

fn default_native_logos() -> BTreeMap<String, String> {
    BTreeMap::from([("137".to_string(), POLYGON_NATIVE_LOGO.to_string())])
}

fn default_cache_control() -> String {
    DEFAULT_CACHE_CONTROL.to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_token: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            asset_platforms_url: default_asset_platforms_url(),
            token_list_base_url: default_token_list_base_url(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            supported_chain_ids: Vec::new(),
            schedule: default_schedule(),
            run_on_startup: default_run_on_startup(),
            fetch_attempts: default_fetch_attempts(),
            base_delay: default_base_delay(),
            write_concurrency: default_write_concurrency(),
            lock_ttl: default_lock_ttl(),
        }
    }
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            ipfs_gateway: default_ipfs_gateway(),
            identicon_base_url: default_identicon_base_url(),
            default_native_logo: default_native_logo(),
            cache_control: default_cache_control(),
            native_logos: default_native_logos(),
        }
    }
}

impl UpstreamConfig {
    /// Host name of the token-list provider, reported by the health route
    pub fn token_list_host(&self) -> Option<String> {
        url::Url::parse(&self.token_list_base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

impl LogoConfig {
    /// Canonical native-token logo for a chain
    pub fn native_logo(&self, chain_id: u64) -> &str {
        self.native_logos
            .get(&chain_id.to_string())
            .unwrap_or(&self.default_native_logo)
    }
}

/// Parse a comma-separated chain id list such as `1,137, 8453`
pub fn parse_chain_ids(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .with_context(|| format!("Invalid chain id '{s}'"))
        })
        .collect()
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Apply environment overrides through `lookup` so callers control the source
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_SUPPORTED_CHAIN_IDS) {
            self.indexer.supported_chain_ids = parse_chain_ids(&raw)?;
        }
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database.url = url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("upstream.asset_platforms_url", &self.upstream.asset_platforms_url),
            ("upstream.token_list_base_url", &self.upstream.token_list_base_url),
            ("logos.ipfs_gateway", &self.logos.ipfs_gateway),
            ("logos.identicon_base_url", &self.logos.identicon_base_url),
        ] {
            url::Url::parse(value).with_context(|| format!("{name} is not a valid URL: {value}"))?;
        }
        cron::Schedule::from_str(&self.indexer.schedule).map_err(|e| {
            anyhow::anyhow!("indexer.schedule '{}' is invalid: {}", self.indexer.schedule, e)
        })?;
        if self.indexer.fetch_attempts == 0 {
            anyhow::bail!("indexer.fetch_attempts must be at least 1");
        }
        if self.indexer.write_concurrency == 0 {
            anyhow::bail!("indexer.write_concurrency must be at least 1");
        }
        Ok(())
    }
}
