//! Gateway configuration.

use std::time::Duration;

use crate::retry::RetryConfig;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Credential pool, rotated on rate limiting
    pub api_keys: Vec<String>,
    pub base_url: String,
    pub model: String,
    /// Timeout for one request
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    /// How long a rate-limited credential is skipped
    pub rate_limit_cooldown: Duration,
    /// Pool-wide rate limiting is surfaced only after waiting this long for
    /// a credential to free up
    pub retry_window: Duration,
    /// Local pacing per credential
    pub requests_per_minute: u32,
    /// Largest media attachment sent inline
    pub max_inline_bytes: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            request_timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
            rate_limit_cooldown: Duration::from_secs(60),
            retry_window: Duration::from_secs(90),
            requests_per_minute: 10,
            max_inline_bytes: 20 * 1024 * 1024,
        }
    }
}

impl GatewayConfig {
    /// Create config from environment variables.
    ///
    /// `CUTMIRROR_API_KEYS` holds a comma-separated pool; a single
    /// `GEMINI_API_KEY` is used when the pool is unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_keys = std::env::var("CUTMIRROR_API_KEYS")
            .ok()
            .map(|keys| parse_key_list(&keys))
            .filter(|keys| !keys.is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok().map(|k| parse_key_list(&k)))
            .unwrap_or_default();

        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            api_keys,
            base_url: std::env::var("CUTMIRROR_REASONING_URL").unwrap_or(defaults.base_url),
            model: std::env::var("CUTMIRROR_REASONING_MODEL").unwrap_or(defaults.model),
            request_timeout: secs("CUTMIRROR_REASONING_TIMEOUT", defaults.request_timeout),
            retry: RetryConfig::default().with_max_attempts(
                std::env::var("CUTMIRROR_REASONING_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_attempts),
            ),
            rate_limit_cooldown: secs("CUTMIRROR_RATE_LIMIT_COOLDOWN", defaults.rate_limit_cooldown),
            retry_window: secs("CUTMIRROR_RETRY_WINDOW", defaults.retry_window),
            requests_per_minute: std::env::var("CUTMIRROR_REQUESTS_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.requests_per_minute),
            max_inline_bytes: defaults.max_inline_bytes,
        }
    }

    pub fn with_api_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_list() {
        assert_eq!(parse_key_list(" a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_key_list(" , ").is_empty());
    }
}
