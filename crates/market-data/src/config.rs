//! Provider and aggregation settings read from the environment.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::aggregator::AggregatorOptions;
use crate::provider::moex::{self, MoexIssProvider};
use crate::provider::tbank::{self, TBankProvider};
use crate::provider::MarketDataProvider;
use crate::similarity::SimilarityStrategy;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[derive(Clone, Debug)]
pub struct MarketDataConfig {
    pub tbank_enabled: bool,
    pub tbank_token: Option<String>,
    pub tbank_base_url: String,
    pub moex_enabled: bool,
    pub moex_base_url: String,
    pub provider_timeout: Duration,
    pub quote_cache_ttl: Duration,
    pub calendar_cache_ttl: Duration,
    pub calendar_horizon_days: u32,
    pub snapshot_concurrency: usize,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        let options = AggregatorOptions::default();
        Self {
            tbank_enabled: false,
            tbank_token: None,
            tbank_base_url: tbank::DEFAULT_BASE_URL.to_string(),
            moex_enabled: true,
            moex_base_url: moex::DEFAULT_BASE_URL.to_string(),
            provider_timeout: options.provider_timeout,
            quote_cache_ttl: options.quote_ttl,
            calendar_cache_ttl: options.calendar_ttl,
            calendar_horizon_days: options.calendar_horizon_days,
            snapshot_concurrency: options.concurrency,
        }
    }
}

/// Typed reads over a key lookup with defaults.
pub struct Settings<F> {
    lookup: F,
}

impl<F> Settings<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    pub fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.string(key) {
            None => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(invalid(key, &v)),
            },
        }
    }

    pub fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.string(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| invalid(key, &v)),
        }
    }

    /// Whole seconds, must be positive.
    pub fn seconds(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parsed(key, default.as_secs())?;
        if secs == 0 {
            return Err(invalid(key, "0"));
        }
        Ok(Duration::from_secs(secs))
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl MarketDataConfig {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_settings(&Settings::new(|key| std::env::var(key).ok()))
    }

    pub fn from_settings<F>(settings: &Settings<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let tbank_token = settings.string("TIN_TOKEN");
        let config = Self {
            tbank_enabled: settings.flag("FEATURE_TBANK", true)?,
            tbank_token,
            tbank_base_url: settings.string_or("TIN_API_BASE", &defaults.tbank_base_url),
            moex_enabled: settings.flag("FEATURE_MOEX_ISS", true)?,
            moex_base_url: settings.string_or("MOEX_ISS_BASE", &defaults.moex_base_url),
            provider_timeout: settings.seconds("PROVIDER_TIMEOUT_SECS", defaults.provider_timeout)?,
            quote_cache_ttl: settings.seconds("QUOTE_CACHE_TTL_SECS", defaults.quote_cache_ttl)?,
            calendar_cache_ttl: settings
                .seconds("CALENDAR_CACHE_TTL_SECS", defaults.calendar_cache_ttl)?,
            calendar_horizon_days: settings
                .parsed("CALENDAR_HORIZON_DAYS", defaults.calendar_horizon_days)?,
            snapshot_concurrency: settings
                .parsed("SNAPSHOT_CONCURRENCY", defaults.snapshot_concurrency)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tbank_enabled && self.tbank_token.is_none() {
            return Err(ConfigError::Missing("TIN_TOKEN".to_string()));
        }
        if self.snapshot_concurrency == 0 {
            return Err(invalid("SNAPSHOT_CONCURRENCY", "0"));
        }
        Ok(())
    }

    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            provider_timeout: self.provider_timeout,
            quote_ttl: self.quote_cache_ttl,
            calendar_ttl: self.calendar_cache_ttl,
            calendar_horizon_days: self.calendar_horizon_days,
            concurrency: self.snapshot_concurrency,
        }
    }

    /// Instantiates every enabled provider.
    pub fn build_providers(
        &self,
        similarity: Arc<dyn SimilarityStrategy>,
    ) -> Vec<Arc<dyn MarketDataProvider>> {
        let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::new();
        if self.tbank_enabled {
            if let Some(token) = &self.tbank_token {
                providers.push(Arc::new(TBankProvider::new(
                    &self.tbank_base_url,
                    token,
                    self.provider_timeout,
                )));
            }
        }
        if self.moex_enabled {
            providers.push(Arc::new(MoexIssProvider::new(
                &self.moex_base_url,
                self.provider_timeout,
                similarity,
            )));
        }
        providers
    }
}
