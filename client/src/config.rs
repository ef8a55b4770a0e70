use crate::{defaults::*, retry::RetryPolicy};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use spinwheel_types::{
    GameRules, Segment, Wheel, WheelError, CLAIM_AMOUNT, CLAIM_COOLDOWN_SECS, DAILY_SPIN_LIMIT,
    INITIAL_CREDITS,
};
use std::{str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be 32 bytes of hex: {value}")]
    InvalidHex { field: &'static str, value: String },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: u64 },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} URL scheme must be http or https: {value}")]
    InvalidUrlScheme { field: &'static str, value: String },
    #[error("store_url scheme must be redis or rediss: {value}")]
    InvalidStoreUrl { value: String },
    #[error("invalid wheel: {0}")]
    InvalidWheel(#[from] WheelError),
}

/// Client configuration as read from YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Redis URL; the in-memory store is used when absent.
    #[serde(default)]
    pub store_url: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Computation gateway; every spin is a demo spin when absent.
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default)]
    pub explorer_url: Option<String>,
    #[serde(default = "default_program_id")]
    pub program_id: String,
    #[serde(default)]
    pub cluster_offset: u32,
    #[serde(default = "default_computation_definition")]
    pub computation_definition: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_demo_delay_ms")]
    pub demo_delay_ms: u64,

    #[serde(default = "default_daily_spin_limit")]
    pub daily_spin_limit: u32,
    #[serde(default = "default_initial_credits")]
    pub initial_credits: u64,
    #[serde(default = "default_claim_amount")]
    pub claim_amount: u64,
    #[serde(default = "default_claim_cooldown_secs")]
    pub claim_cooldown_secs: u64,

    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Custom wheel; the default eight-segment wheel when absent.
    #[serde(default)]
    pub wheel: Option<Vec<Segment>>,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_program_id() -> String {
    DEFAULT_PROGRAM_ID.to_string()
}

fn default_computation_definition() -> String {
    DEFAULT_COMPUTATION_DEFINITION.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_poll_max_attempts() -> u32 {
    DEFAULT_POLL_MAX_ATTEMPTS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_demo_delay_ms() -> u64 {
    DEFAULT_DEMO_DELAY_MS
}

fn default_daily_spin_limit() -> u32 {
    DAILY_SPIN_LIMIT
}

fn default_initial_credits() -> u64 {
    INITIAL_CREDITS
}

fn default_claim_amount() -> u64 {
    CLAIM_AMOUNT
}

fn default_claim_cooldown_secs() -> u64 {
    CLAIM_COOLDOWN_SECS as u64
}

fn default_leaderboard_size() -> usize {
    DEFAULT_LEADERBOARD_SIZE
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_url: None,
            key_prefix: default_key_prefix(),
            gateway_url: None,
            explorer_url: None,
            program_id: default_program_id(),
            cluster_offset: DEFAULT_CLUSTER_OFFSET,
            computation_definition: default_computation_definition(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
            demo_delay_ms: default_demo_delay_ms(),
            daily_spin_limit: default_daily_spin_limit(),
            initial_credits: default_initial_credits(),
            claim_amount: default_claim_amount(),
            claim_cooldown_secs: default_claim_cooldown_secs(),
            leaderboard_size: default_leaderboard_size(),
            search_limit: default_search_limit(),
            log_level: default_log_level(),
            wheel: None,
        }
    }
}

/// Configuration with every field checked and converted.
#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    pub store_url: Option<String>,
    pub key_prefix: String,
    pub gateway_url: Option<Url>,
    pub explorer_url: Option<Url>,
    pub program_id: [u8; 32],
    pub cluster_offset: u32,
    pub computation_definition: String,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub demo_delay: Duration,
    pub rules: GameRules,
    pub wheel: Wheel,
    pub leaderboard_size: usize,
    pub search_limit: usize,
    pub log_level: Level,
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn validate_http_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrlScheme {
            field,
            value: value.to_string(),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
    Ok(url)
}

fn validate_store_url(value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field: "store_url",
        value: value.to_string(),
    })?;
    if !matches!(url.scheme(), "redis" | "rediss") {
        return Err(ConfigError::InvalidStoreUrl {
            value: value.to_string(),
        });
    }
    Ok(())
}

fn parse_program_id(value: &str) -> Result<[u8; 32], ConfigError> {
    let invalid = || ConfigError::InvalidHex {
        field: "program_id",
        value: value.to_string(),
    };
    let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(value)).map_err(|_| invalid())?;
    bytes.try_into().map_err(|_| invalid())
}

impl ClientConfig {
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        ensure_nonzero("poll_interval_ms", self.poll_interval_ms)?;
        ensure_nonzero("poll_max_attempts", self.poll_max_attempts.into())?;
        ensure_nonzero("request_timeout_ms", self.request_timeout_ms)?;
        ensure_nonzero("daily_spin_limit", self.daily_spin_limit.into())?;
        ensure_nonzero("claim_amount", self.claim_amount)?;
        ensure_nonzero("claim_cooldown_secs", self.claim_cooldown_secs)?;
        ensure_nonzero("leaderboard_size", self.leaderboard_size as u64)?;
        ensure_nonzero("search_limit", self.search_limit as u64)?;
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Empty { field: "key_prefix" });
        }
        if self.computation_definition.is_empty() {
            return Err(ConfigError::Empty {
                field: "computation_definition",
            });
        }

        if let Some(store_url) = &self.store_url {
            validate_store_url(store_url)?;
        }
        let gateway_url = self
            .gateway_url
            .as_deref()
            .map(|url| validate_http_url("gateway_url", url))
            .transpose()?;
        let explorer_url = self
            .explorer_url
            .as_deref()
            .map(|url| validate_http_url("explorer_url", url))
            .transpose()?;
        let program_id = parse_program_id(&self.program_id)?;

        let claim_cooldown = i64::try_from(self.claim_cooldown_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or(ConfigError::OutOfRange {
                field: "claim_cooldown_secs",
                value: self.claim_cooldown_secs,
            })?;
        let wheel = match self.wheel {
            Some(segments) => Wheel::new(segments)?,
            None => Wheel::default(),
        };
        let log_level = Level::from_str(&self.log_level).map_err(|_| {
            ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            }
        })?;

        Ok(ValidatedConfig {
            store_url: self.store_url,
            key_prefix: self.key_prefix,
            gateway_url,
            explorer_url,
            program_id,
            cluster_offset: self.cluster_offset,
            computation_definition: self.computation_definition,
            retry: RetryPolicy::new(
                self.poll_max_attempts,
                Duration::from_millis(self.poll_interval_ms),
            ),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            demo_delay: Duration::from_millis(self.demo_delay_ms),
            rules: GameRules {
                daily_spin_limit: self.daily_spin_limit,
                initial_credits: self.initial_credits,
                claim_amount: self.claim_amount,
                claim_cooldown,
            },
            wheel,
            leaderboard_size: self.leaderboard_size,
            search_limit: self.search_limit,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = ClientConfig::from_yaml("{}").unwrap().validate().unwrap();
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.rules, GameRules::default());
        assert_eq!(config.wheel, Wheel::default());
        assert_eq!(config.demo_delay, Duration::from_millis(1_500));
        assert_eq!(config.leaderboard_size, 10);
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.store_url.is_none());
        assert!(config.gateway_url.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let yaml = r#"
store_url: "redis://127.0.0.1:6379"
gateway_url: "https://gateway.example.com/api"
explorer_url: "https://explorer.example.com"
poll_interval_ms: 500
poll_max_attempts: 10
daily_spin_limit: 3
log_level: debug
wheel:
  - label: jackpot
    effect: { kind: multiplier, value: 1.5 }
  - label: bust
    effect: { kind: percent, value: -100 }
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap().validate().unwrap();
        assert_eq!(config.retry.ceiling(), Duration::from_secs(5));
        assert_eq!(config.rules.daily_spin_limit, 3);
        assert_eq!(config.wheel.segment_count(), 2);
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(
            config.gateway_url.unwrap().as_str(),
            "https://gateway.example.com/api"
        );
    }

    #[test]
    fn rejects_zero_limits() {
        let config = ClientConfig {
            poll_max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNonZero {
                field: "poll_max_attempts",
                value: 0
            })
        ));
    }

    #[test]
    fn rejects_bad_urls_and_ids() {
        let config = ClientConfig {
            gateway_url: Some("ftp://gateway".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrlScheme { field: "gateway_url", .. })
        ));

        let config = ClientConfig {
            store_url: Some("http://localhost".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidStoreUrl { .. })));

        let config = ClientConfig {
            program_id: "abcd".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidHex { .. })));
    }

    #[test]
    fn rejects_invalid_wheel() {
        let config = ClientConfig {
            wheel: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWheel(WheelError::Empty))
        ));
    }
}
