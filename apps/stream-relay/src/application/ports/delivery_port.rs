//! Delivery Ports (Driven Ports)
//!
//! Interfaces for forwarding posts to the chat channel and for reporting
//! operational errors to the log channel.

use async_trait::async_trait;

/// Failure to deliver a message to a channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The target channel does not exist or is not visible to the bot.
    #[error("channel {0} not found")]
    ChannelNotFound(String),

    /// The chat API refused the message.
    #[error("chat API rejected message with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The request never got a response.
    #[error("chat API request failed: {0}")]
    Network(String),
}

/// Port for posting text to the destination channel.
#[async_trait]
pub trait PostSink: Send + Sync {
    /// Send `content` to the channel.
    async fn send(&self, content: &str) -> Result<(), DeliveryError>;
}

/// Port for the side-channel log sink.
///
/// Reporting never fails from the caller's point of view; adapters swallow
/// their own errors after logging them.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    /// Report an operational error.
    async fn report(&self, context: &str, detail: &str);
}
