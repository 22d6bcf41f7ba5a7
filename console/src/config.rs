use std::time::Duration;

use crate::error::{ConsoleError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    /// Base URL of the collaborator REST API (including the `/api` prefix)
    pub api_url: String,
    /// Records requested per page for messages and session logs
    pub page_size: usize,
    /// Refresh interval for the pending chat message
    pub chat_poll_interval: Duration,
    /// Refresh interval for a live execution trace
    pub log_poll_interval: Duration,
    /// Refresh interval for the newest page of the session-log feed
    pub feed_refresh_interval: Duration,
    /// Distance from the bottom (in view units) that still counts as "at bottom"
    pub follow_threshold: u32,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api".to_string(),
            page_size: 10,
            chat_poll_interval: Duration::from_millis(300),
            log_poll_interval: Duration::from_millis(500),
            feed_refresh_interval: Duration::from_millis(5000),
            follow_threshold: 80,
        }
    }
}

impl ConsoleConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            api_url: env_str("CONSOLE_API_URL", &defaults.api_url),
            page_size: env_parse("CONSOLE_PAGE_SIZE", defaults.page_size)?,
            chat_poll_interval: Duration::from_millis(env_parse("CONSOLE_CHAT_POLL_MS", 300)?),
            log_poll_interval: Duration::from_millis(env_parse("CONSOLE_LOG_POLL_MS", 500)?),
            feed_refresh_interval: Duration::from_millis(env_parse(
                "CONSOLE_FEED_REFRESH_MS",
                5000,
            )?),
            follow_threshold: env_parse("CONSOLE_FOLLOW_THRESHOLD", defaults.follow_threshold)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ConsoleError::Config(
                "CONSOLE_PAGE_SIZE must be at least 1".to_string(),
            ));
        }
        for (key, interval) in [
            ("CONSOLE_CHAT_POLL_MS", self.chat_poll_interval),
            ("CONSOLE_LOG_POLL_MS", self.log_poll_interval),
            ("CONSOLE_FEED_REFRESH_MS", self.feed_refresh_interval),
        ] {
            if interval.is_zero() {
                return Err(ConsoleError::Config(format!("{key} must be non-zero")));
            }
        }
        if self.api_url.trim().is_empty() {
            return Err(ConsoleError::Config("CONSOLE_API_URL is empty".to_string()));
        }
        Ok(())
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConsoleError::Config(format!("Failed to parse env var {key}={val}: {e}"))),
        Err(_) => Ok(default),
    }
}
