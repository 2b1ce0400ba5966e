use std::time::Duration;

use crate::utils::RetryConfig;

// ============================================================================
// Order Store Configuration
// ============================================================================

pub const ENV_PAGE_SIZE: &str = "ORDERS_PAGE_SIZE";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "ORDERS_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_INITIAL_DELAY_MS: &str = "ORDERS_RETRY_INITIAL_DELAY_MS";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderStoreConfig {
    /// Orders fetched per batch when streaming active orders
    pub page_size: usize,
    /// Retry policy for optimistic concurrency conflicts
    pub retry: RetryConfig,
}

impl Default for OrderStoreConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            retry: RetryConfig::default(),
        }
    }
}

impl OrderStoreConfig {
    /// Defaults overridden by `ORDERS_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_PAGE_SIZE) {
            config.page_size = parse_positive(ENV_PAGE_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_MAX_ATTEMPTS) {
            config.retry.max_attempts = parse_positive(ENV_RETRY_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_INITIAL_DELAY_MS) {
            let millis: u64 = parse_positive(ENV_RETRY_INITIAL_DELAY_MS, &value)?;
            config.retry.initial_delay = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

fn parse_positive<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let parsed: T = value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    if parsed <= T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}
