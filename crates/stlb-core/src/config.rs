use std::{env, time::Duration};

use crate::{errors::Error, localize::ClockStyle, Result};

/// Typed configuration, constructed once and passed into the components that
/// need it. Core logic never reads process environment directly.
#[derive(Clone, Debug)]
pub struct Config {
    pub slack_bot_token: String,

    // User lookup cache
    pub user_cache_size: usize,
    pub user_cache_ttl: Duration,

    // Rendering
    pub clock: ClockStyle,

    // Whether the author may receive their own localized notice when their
    // profile zone differs from the message's source zone.
    pub notify_author: bool,

    // Bounds on external calls
    pub api_timeout: Duration,

    // Window for suppressing exact duplicate event redeliveries
    pub dedup_window: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let slack_bot_token = env_str("SLACK_BOT_TOKEN").unwrap_or_default();
        if slack_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "SLACK_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let user_cache_size = env_parse("USER_CACHE_SIZE").unwrap_or(500);
        let user_cache_ttl =
            Duration::from_secs(env_parse("USER_CACHE_TTL").unwrap_or(600));
        let clock = if env_bool("PREFER_12H").unwrap_or(false) {
            ClockStyle::Hour12
        } else {
            ClockStyle::Hour24
        };
        let notify_author = env_bool("NOTIFY_AUTHOR").unwrap_or(true);
        let api_timeout =
            Duration::from_secs(env_parse("SLACK_API_TIMEOUT_SECS").unwrap_or(10));
        let dedup_window =
            Duration::from_secs(env_parse("DEDUP_WINDOW_SECS").unwrap_or(5));

        Ok(Self {
            slack_bot_token,
            user_cache_size,
            user_cache_ttl,
            clock,
            notify_author,
            api_timeout,
            dedup_window,
        })
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            slack_bot_token: "test-token".to_string(),
            user_cache_size: 500,
            user_cache_ttl: Duration::from_secs(600),
            clock: ClockStyle::Hour24,
            notify_author: true,
            api_timeout: Duration::from_secs(10),
            dedup_window: Duration::from_secs(5),
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_str(key).and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}
