//! Process configuration, extracted from the environment with figment.

use figment::{Figment, providers::Env};
use fundu::DurationParser;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::GatewayConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Crate log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Grace period for draining requests on shutdown.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    /// Provider credential. Absent means every translate request is rejected
    /// with a configuration error.
    #[serde(default)]
    pub provider_api_key: Option<String>,
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,
    #[serde(default = "default_provider_model")]
    pub provider_model: String,

    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_cache_ttl", deserialize_with = "deserialize_duration")]
    pub cache_ttl: Duration,
    #[serde(default = "default_max_concurrent_upstream")]
    pub max_concurrent_upstream: usize,
    #[serde(default = "default_retry_batch_limit")]
    pub retry_batch_limit: usize,
    #[serde(
        default = "default_upstream_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub upstream_timeout: Duration,
    #[serde(default = "default_target_language")]
    pub default_target_language: String,
}

impl Config {
    /// Load from environment variables (names are matched case-insensitively).
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::new().merge(Env::raw()).extract()
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            cache_ttl: self.cache_ttl,
            max_concurrent_upstream: self.max_concurrent_upstream,
            retry_batch_limit: self.retry_batch_limit,
            upstream_timeout: self.upstream_timeout,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_provider_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_provider_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("translation-cache.json")
}

fn default_cache_ttl() -> Duration {
    crate::gateway::DEFAULT_CACHE_TTL
}

fn default_max_concurrent_upstream() -> usize {
    4
}

fn default_retry_batch_limit() -> usize {
    50
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_target_language() -> String {
    "en".to_string()
}

/// Accepts either a bare number of seconds or a unit-suffixed string such as
/// `"750ms"`, `"30s"`, `"5m"` or `"30d"`.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    let parsed = DurationParser::with_all_time_units()
        .parse(text.trim())
        .map_err(|e| format!("invalid duration {text:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {text:?}: {e}"))
}
