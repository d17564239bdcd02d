//! Relay Configuration Settings
//!
//! Configuration types for the stream relay, loaded from environment variables.

use std::time::Duration;

/// Secret string with a redacted `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// Get the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Twitter API settings.
#[derive(Debug, Clone)]
pub struct TwitterSettings {
    /// App bearer token.
    pub bearer_token: Secret,
    /// Handle of the account whose posts are relayed.
    pub account_handle: String,
    /// API root, e.g. `https://api.twitter.com`.
    pub api_base_url: String,
    /// Site root for status URLs, e.g. `https://twitter.com`.
    pub status_url_base: String,
}

impl TwitterSettings {
    /// Default API root.
    pub const DEFAULT_API_BASE_URL: &'static str = "https://api.twitter.com";
    /// Default status URL root.
    pub const DEFAULT_STATUS_URL_BASE: &'static str = "https://twitter.com";

    /// Filtered stream endpoint.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!(
            "{}/2/tweets/search/stream",
            self.api_base_url.trim_end_matches('/')
        )
    }

    /// Stream rules endpoint.
    #[must_use]
    pub fn rules_url(&self) -> String {
        format!("{}/rules", self.stream_url())
    }
}

/// Discord API settings.
#[derive(Debug, Clone)]
pub struct DiscordSettings {
    /// Bot token.
    pub bot_token: Secret,
    /// Channel that receives relayed posts.
    pub posts_channel_id: String,
    /// Channel that receives operational errors, if any.
    pub log_channel_id: Option<String>,
    /// API root, e.g. `https://discord.com/api/v10`.
    pub api_base_url: String,
}

impl DiscordSettings {
    /// Default API root.
    pub const DEFAULT_API_BASE_URL: &'static str = "https://discord.com/api/v10";
}

/// Stream connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Longest wait for the next chunk.
    pub idle_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter as a fraction of the delay (0.0 = none).
    pub reconnect_jitter_factor: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(20),
            reconnect_delay_initial: Duration::from_millis(1),
            reconnect_delay_max: Duration::from_secs(64),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter_factor: 0.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Twitter API settings.
    pub twitter: TwitterSettings,
    /// Discord API settings.
    pub discord: DiscordSettings,
    /// Stream connection settings.
    pub stream: StreamSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing, empty
    /// or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing, empty or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bearer_token = required(&lookup, "TWITTER_BEARER_TOKEN")?;
        let account_handle = required(&lookup, "TWITTER_OFFICIAL_CHANNEL_NAME")?;
        let bot_token = required(&lookup, "DISCORD_BOT_TOKEN")?;
        let posts_channel_id = required(&lookup, "DISCORD_TWEETS_CHANNEL_ID")?;

        if !is_valid_handle(&account_handle) {
            return Err(ConfigError::Invalid {
                key: "TWITTER_OFFICIAL_CHANNEL_NAME".to_string(),
                reason: "expected 1-15 letters, digits or underscores".to_string(),
            });
        }
        validate_channel_id("DISCORD_TWEETS_CHANNEL_ID", &posts_channel_id)?;

        let log_channel_id = lookup("DISCORD_LOG_CHANNEL_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if let Some(id) = &log_channel_id {
            validate_channel_id("DISCORD_LOG_CHANNEL_ID", id)?;
        }

        let twitter = TwitterSettings {
            bearer_token: Secret::new(bearer_token),
            account_handle,
            api_base_url: optional(
                &lookup,
                "TWITTER_API_BASE_URL",
                TwitterSettings::DEFAULT_API_BASE_URL,
            ),
            status_url_base: optional(
                &lookup,
                "STREAM_RELAY_STATUS_URL_BASE",
                TwitterSettings::DEFAULT_STATUS_URL_BASE,
            ),
        };

        let discord = DiscordSettings {
            bot_token: Secret::new(bot_token),
            posts_channel_id,
            log_channel_id,
            api_base_url: optional(
                &lookup,
                "DISCORD_API_BASE_URL",
                DiscordSettings::DEFAULT_API_BASE_URL,
            ),
        };

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            idle_timeout: parse_duration_secs(
                &lookup,
                "STREAM_RELAY_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout,
            ),
            reconnect_delay_initial: parse_duration_millis(
                &lookup,
                "STREAM_RELAY_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_duration_secs(
                &lookup,
                "STREAM_RELAY_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_or(
                &lookup,
                "STREAM_RELAY_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            reconnect_jitter_factor: parse_or(
                &lookup,
                "STREAM_RELAY_RECONNECT_JITTER",
                defaults.reconnect_jitter_factor,
            ),
            max_reconnect_attempts: parse_or(
                &lookup,
                "STREAM_RELAY_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
        };

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "STREAM_RELAY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            twitter,
            discord,
            stream,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable is present but malformed.
    #[error("environment variable {key} is invalid: {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value.to_string())
}

fn optional<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

fn is_valid_handle(handle: &str) -> bool {
    (1..=15).contains(&handle.len())
        && handle
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn validate_channel_id(key: &str, id: &str) -> Result<(), ConfigError> {
    if id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: "expected a numeric channel id".to_string(),
        })
    }
}
