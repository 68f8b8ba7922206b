//! Runtime configuration.
//!
//! Values come from defaults in [`crate::constants`], then the environment
//! (a `.env` file is loaded first if present), then CLI flags.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::constants::{
    ALPHA_VANTAGE_BASE_URL, BIND_PORT, BROADCAST_CAPACITY, CACHE_TTL_MS, CORS_ORIGIN,
    FMP_BASE_URL, METRICS_REPORT_SECS, POLL_INTERVAL_MS, UPSTREAM_TIMEOUT_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Fmp,
    AlphaVantage,
}

impl ProviderKind {
    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Fmp => FMP_BASE_URL,
            ProviderKind::AlphaVantage => ALPHA_VANTAGE_BASE_URL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Fmp => "fmp",
            ProviderKind::AlphaVantage => "alpha_vantage",
        }
    }

    fn env_prefix(self) -> &'static str {
        match self {
            ProviderKind::Fmp => "FMP",
            ProviderKind::AlphaVantage => "ALPHA_VANTAGE",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fmp" => Ok(ProviderKind::Fmp),
            "alpha_vantage" | "alphavantage" => Ok(ProviderKind::AlphaVantage),
            other => Err(anyhow!(
                "unknown provider '{other}'. expected one of: fmp | alpha_vantage"
            )),
        }
    }
}

/// Who receives a poll update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Every connected listener gets every update.
    #[default]
    Global,
    /// Listeners only get updates for symbols they subscribed to.
    Subscribed,
}

impl FromStr for DeliveryMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(DeliveryMode::Global),
            "subscribed" => Ok(DeliveryMode::Subscribed),
            other => Err(anyhow!(
                "unknown delivery mode '{other}'. expected one of: global | subscribed"
            )),
        }
    }
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

// Keeps the API key out of debug output.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key_set", &!self.api_key.is_empty())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::for_kind(ProviderKind::default())
    }
}

impl ProviderConfig {
    pub fn for_kind(kind: ProviderKind) -> Self {
        Self {
            kind,
            base_url: kind.default_base_url().to_string(),
            api_key: String::new(),
            timeout: Duration::from_millis(UPSTREAM_TIMEOUT_MS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub bind_addr: SocketAddr,
    pub provider: ProviderConfig,
    pub cache_ttl: Duration,
    pub poll_interval: Duration,
    pub metrics_interval: Duration,
    pub broadcast_capacity: usize,
    pub cors_origin: String,
    pub delivery: DeliveryMode,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], BIND_PORT)),
            provider: ProviderConfig::default(),
            cache_ttl: Duration::from_millis(CACHE_TTL_MS),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            metrics_interval: Duration::from_secs(METRICS_REPORT_SECS),
            broadcast_capacity: BROADCAST_CAPACITY,
            cors_origin: CORS_ORIGIN.to_string(),
            delivery: DeliveryMode::default(),
        }
    }
}

impl FeedConfig {
    /// Load `.env` (if any) and read configuration from the process
    /// environment. `provider`, when set, wins over `STOCK_FEED_PROVIDER`
    /// and selects which provider-prefixed keys are read.
    pub fn from_env(provider: Option<ProviderKind>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| match (key, provider) {
            ("STOCK_FEED_PROVIDER", Some(kind)) => Some(kind.as_str().to_string()),
            _ => std::env::var(key).ok(),
        })
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("STOCK_FEED_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("invalid STOCK_FEED_ADDR '{addr}'"))?;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid PORT '{port}'"))?;
            config.bind_addr.set_port(port);
        }

        if let Some(kind) = lookup("STOCK_FEED_PROVIDER") {
            config.provider = ProviderConfig::for_kind(kind.parse()?);
        }
        let prefix = config.provider.kind.env_prefix();
        if let Some(base_url) = lookup(&format!("{prefix}_BASE_URL")) {
            config.provider.base_url = base_url;
        }
        if let Some(api_key) = lookup(&format!("{prefix}_API_KEY")) {
            config.provider.api_key = api_key;
        }
        if let Some(timeout) = millis(&lookup, "STOCK_FEED_UPSTREAM_TIMEOUT_MS")? {
            config.provider.timeout = timeout;
        }

        if let Some(ttl) = millis(&lookup, "STOCK_FEED_CACHE_TTL_MS")? {
            config.cache_ttl = ttl;
        }
        if let Some(interval) = millis(&lookup, "STOCK_FEED_POLL_INTERVAL_MS")? {
            config.poll_interval = interval;
        }
        if let Some(origin) = lookup("STOCK_FEED_CORS_ORIGIN") {
            config.cors_origin = origin;
        }
        if let Some(delivery) = lookup("STOCK_FEED_DELIVERY") {
            config.delivery = delivery.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }
        if self.provider.timeout.is_zero() {
            bail!("upstream timeout must be greater than zero");
        }
        if self.broadcast_capacity == 0 {
            bail!("broadcast capacity must be greater than zero");
        }
        Ok(())
    }
}

fn millis<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("invalid {key} '{raw}', expected milliseconds"))
        })
        .transpose()
}
