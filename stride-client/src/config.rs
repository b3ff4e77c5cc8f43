use std::{env, fmt::Display, str::FromStr, time::Duration};

use reqwest::Url;
use tracing::info;

use crate::error::{StrideError, StrideResult};
use crate::retry::RetryPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub timeout: Duration,
    /// Upper bound on concurrently issued membership operations.
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> StrideResult<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            timeout: Duration::from_secs(10),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            retry: RetryPolicy::default(),
        })
    }

    /// Read the configuration from `STRIDE_*` environment variables.
    /// Missing keys fall back to defaults; malformed values are an error.
    pub fn from_env() -> StrideResult<Self> {
        let defaults = RetryPolicy::default();
        let base_url: String = try_load("STRIDE_API_URL", DEFAULT_API_URL)?;
        let timeout_secs: u64 = try_load("STRIDE_TIMEOUT_SECS", "10")?;
        let max_in_flight: usize = try_load("STRIDE_MAX_IN_FLIGHT", "8")?;
        let max_retries: u32 = try_load("STRIDE_MAX_RETRIES", &defaults.max_retries.to_string())?;
        let base_ms: u64 = try_load(
            "STRIDE_RETRY_BASE_MS",
            &defaults.base_delay.as_millis().to_string(),
        )?;

        if max_in_flight == 0 {
            return Err(StrideError::InvalidConfig(
                "STRIDE_MAX_IN_FLIGHT must be at least 1".into(),
            ));
        }

        Ok(Self {
            base_url: parse_base_url(&base_url)?,
            timeout: Duration::from_secs(timeout_secs),
            max_in_flight,
            retry: RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(base_ms),
                ..defaults
            },
        })
    }
}

fn parse_base_url(raw: &str) -> StrideResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| StrideError::InvalidConfig(format!("invalid base url {raw:?}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(StrideError::InvalidConfig(format!(
            "base url {raw:?} cannot carry a path"
        )));
    }
    Ok(url)
}

fn try_load<T: FromStr>(key: &str, default: &str) -> StrideResult<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| StrideError::InvalidConfig(format!("invalid {key} value {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_base_urls() {
        assert!(matches!(
            ClientConfig::new("mailto:coach@example.com"),
            Err(StrideError::InvalidConfig(_))
        ));
        assert!(ClientConfig::new("not a url").is_err());
    }

    #[test]
    fn new_uses_defaults() {
        let config = ClientConfig::new("http://127.0.0.1:9000/api/").unwrap();
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.base_url.path(), "/api/");
    }
}
