//! Discord Integration
//!
//! Posts relayed status URLs to the destination channel and operational
//! errors to the log channel through the REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::application::ports::{DeliveryError, ErrorReporter, PostSink};
use crate::infrastructure::config::{DiscordSettings, Secret};

/// Longest message the API accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

// =============================================================================
// Client
// =============================================================================

/// Discord REST client authenticated as a bot.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    client: Client,
    api_base_url: String,
    bot_token: Secret,
}

impl DiscordClient {
    /// Create a client from Discord settings.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Network` if the HTTP client cannot be built.
    pub fn new(settings: &DiscordSettings) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            bot_token: settings.bot_token.clone(),
        })
    }

    /// Post `content` to `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ChannelNotFound` on 404, `DeliveryError::Rejected`
    /// on any other non-success status and `DeliveryError::Network` if no
    /// response arrived.
    pub async fn create_message(&self, channel_id: &str, content: &str) -> Result<(), DeliveryError> {
        let url = format!("{}/channels/{channel_id}/messages", self.api_base_url);

        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.bot_token.expose()),
            )
            .json(&CreateMessage { content })
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DeliveryError::ChannelNotFound(channel_id.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

// =============================================================================
// Channels
// =============================================================================

/// A single channel, used as the post destination.
#[derive(Debug, Clone)]
pub struct DiscordChannel {
    client: Arc<DiscordClient>,
    channel_id: String,
}

impl DiscordChannel {
    /// Bind `client` to `channel_id`.
    #[must_use]
    pub fn new(client: Arc<DiscordClient>, channel_id: impl Into<String>) -> Self {
        Self {
            client,
            channel_id: channel_id.into(),
        }
    }

    /// Channel id.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

#[async_trait]
impl PostSink for DiscordChannel {
    async fn send(&self, content: &str) -> Result<(), DeliveryError> {
        self.client.create_message(&self.channel_id, content).await
    }
}

/// Error reporter that logs and, when configured, echoes to a log channel.
#[derive(Debug, Clone, Default)]
pub struct LogChannelReporter {
    channel: Option<DiscordChannel>,
}

impl LogChannelReporter {
    /// Create a reporter; `None` reports to the log output only.
    #[must_use]
    pub const fn new(channel: Option<DiscordChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ErrorReporter for LogChannelReporter {
    async fn report(&self, context: &str, detail: &str) {
        tracing::error!(context, detail, "Reported error");

        let Some(channel) = &self.channel else {
            return;
        };

        let message = truncate_message(&format!("{context} {detail}"));
        if let Err(e) = channel.send(&message).await {
            tracing::warn!(
                channel_id = channel.channel_id(),
                error = %e,
                "Failed to post to log channel"
            );
        }
    }
}

/// Cut `message` to the API length limit.
#[must_use]
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(MAX_MESSAGE_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}
