//! Stream Transport Port (Driven Port)
//!
//! Interface for opening the long-lived filtered stream connection.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::domain::post::contains_marker;
use crate::domain::session::FailureKind;

/// Framed chunks from an open stream, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Transport-level failure while opening or reading the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not establish the connection.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The connection was reset or broke mid-stream.
    #[error("connection reset: {0}")]
    Reset(String),

    /// The server ended the response body.
    #[error("stream closed by peer")]
    Closed,

    /// No chunk arrived within the idle timeout.
    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),

    /// The server answered the stream request with a non-success status.
    #[error("stream request rejected with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The request itself could not be built or sent as specified.
    #[error("invalid stream request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Classify the failure for recovery.
    ///
    /// Throttling (408, 420, 429) and server errors are transient; other
    /// client errors mean the request will keep failing.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Status { status, .. } if matches!(status, 408 | 420 | 429) || *status >= 500 => {
                FailureKind::Reset
            }
            Self::Status { .. } | Self::InvalidRequest(_) => FailureKind::Fatal,
            Self::Connect(_) | Self::Reset(_) | Self::Closed | Self::IdleTimeout(_) => {
                FailureKind::Reset
            }
        }
    }

    /// Short code for logs and metric labels.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Reset(_) => "reset",
            Self::Closed => "closed",
            Self::IdleTimeout(_) => "idle_timeout",
            Self::Status { .. } => "status",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Whether the response body carries the connection-limit marker.
    #[must_use]
    pub fn is_connection_limit(&self) -> bool {
        matches!(self, Self::Status { body, .. } if contains_marker(body.as_bytes()))
    }
}

/// Port for the filtered stream connection.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Issue the stream request and return its framed body.
    async fn open(&self) -> Result<ChunkStream, TransportError>;
}
