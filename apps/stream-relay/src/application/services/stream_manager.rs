//! Stream Manager
//!
//! Holds the filtered stream open, hands each chunk to the decoder, forwards
//! posts to the chat channel, and reconnects with exponential backoff when
//! the connection breaks.
//!
//! One session is live at a time. Chunks are handled in arrival order and
//! one at a time, so the retry counter is only ever touched by this task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    ChunkStream, ErrorReporter, PostSink, StreamTransport, Timer, TransportError,
};
use crate::domain::post::{Frame, Post, decode_frame};
use crate::domain::session::{ReconnectConfig, ReconnectPolicy, Recovery, plan_recovery};

// =============================================================================
// Error Type
// =============================================================================

/// Reasons the manager stops on its own.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The provider refused the stream in a way retrying will not fix.
    #[error("non-recoverable stream error: {0}")]
    Unrecoverable(TransportError),

    /// The configured reconnection limit was reached.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),
}

// =============================================================================
// Stream Events
// =============================================================================

/// Events emitted by the stream manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Opening a new session.
    Connecting {
        /// Retry counter carried into the session.
        retry_attempt: u32,
    },
    /// First chunk arrived on the current session.
    Streaming,
    /// A post was forwarded to the channel.
    PostDelivered {
        /// Post id.
        id: String,
    },
    /// A JSON payload failed validation and was reported.
    PayloadRejected,
    /// An undecodable chunk was dropped.
    ChunkDropped,
    /// The provider reported the connection limit.
    ConnectionLimit,
    /// Forwarding a post failed.
    DeliveryFailed,
    /// The session ended with a transport error.
    TransportFailed {
        /// Error code, see [`TransportError::code`].
        code: &'static str,
    },
    /// Waiting before the next connection attempt.
    Reconnecting {
        /// Retry counter for the next session.
        attempt: u32,
        /// Backoff delay.
        delay: Duration,
    },
    /// Stopped after a non-recoverable error.
    Halted {
        /// Error description.
        reason: String,
        /// Retry counter at the time of the failure.
        retry_attempt: u32,
    },
    /// Stopped by cancellation.
    Stopped,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream manager.
#[derive(Debug, Clone)]
pub struct StreamManagerConfig {
    /// Account whose posts are relayed; used to build status URLs.
    pub account_handle: String,
    /// Site root for status URLs.
    pub status_url_base: String,
    /// Longest wait for the next chunk before the connection is considered dead.
    pub idle_timeout: Duration,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
}

impl StreamManagerConfig {
    /// Default idle timeout for the stream connection.
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(20);

    /// Create a configuration with default timeout and backoff.
    #[must_use]
    pub fn new(account_handle: impl Into<String>, status_url_base: impl Into<String>) -> Self {
        Self {
            account_handle: account_handle.into(),
            status_url_base: status_url_base.into(),
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// External collaborators of the stream manager.
#[derive(Clone)]
pub struct StreamPorts {
    /// Filtered stream connection.
    pub transport: Arc<dyn StreamTransport>,
    /// Destination channel.
    pub sink: Arc<dyn PostSink>,
    /// Log channel.
    pub reporter: Arc<dyn ErrorReporter>,
    /// Backoff timer.
    pub timer: Arc<dyn Timer>,
}

// =============================================================================
// Stream Session
// =============================================================================

/// One attempt to hold the stream open.
///
/// Owns the connection exclusively; dropping the session closes it.
pub struct StreamSession {
    retry_attempt: u32,
    connection: ChunkStream,
}

impl StreamSession {
    /// Retry counter for this session.
    #[must_use]
    pub const fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    /// Next data or transport-error item, `None` once the server closes the body.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.connection.next().await
    }

    const fn reset_retry(&mut self) {
        self.retry_attempt = 0;
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("retry_attempt", &self.retry_attempt)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Stream Manager
// =============================================================================

/// Filtered stream connection manager.
///
/// Manages the connection lifecycle:
/// - Opening the stream and reading framed chunks
/// - Decoding and forwarding posts
/// - Reconnecting with exponential backoff on reset-type failures
/// - Halting and reporting on failures retrying cannot fix
pub struct StreamManager {
    config: StreamManagerConfig,
    policy: ReconnectPolicy,
    ports: StreamPorts,
    event_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamManager {
    /// Create a new stream manager.
    #[must_use]
    pub fn new(
        config: StreamManagerConfig,
        ports: StreamPorts,
        event_tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let policy = ReconnectPolicy::new(config.reconnect.clone());
        Self {
            config,
            policy,
            ports,
            event_tx,
            cancel,
        }
    }

    /// Open a session carrying `retry_attempt`.
    ///
    /// The request is issued when the session is first read. A failure to
    /// open arrives as the session's first item rather than as an error
    /// here, so connect failures and mid-stream drops share one recovery path.
    #[must_use]
    pub fn connect(&self, retry_attempt: u32) -> StreamSession {
        let transport = Arc::clone(&self.ports.transport);
        let connection = stream::once(async move { transport.open().await }).flat_map(
            |opened| match opened {
                Ok(chunks) => chunks,
                Err(e) => Box::pin(stream::iter([Err(e)])) as ChunkStream,
            },
        );

        StreamSession {
            retry_attempt,
            connection: Box::pin(connection),
        }
    }

    /// Run the connect loop until cancelled or a failure ends it.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Unrecoverable` on a non-reset transport error and
    /// `StreamError::MaxReconnectAttemptsExceeded` when a configured attempt
    /// limit is used up.
    pub async fn run(&self) -> Result<(), StreamError> {
        let mut retry_attempt = 0;

        loop {
            tracing::info!(retry_attempt, "Connecting to filtered stream");
            self.emit(StreamEvent::Connecting { retry_attempt });

            let mut session = self.connect(retry_attempt);
            let Some(error) = self.consume(&mut session).await else {
                self.stop();
                return Ok(());
            };
            retry_attempt = session.retry_attempt();
            drop(session);

            self.emit(StreamEvent::TransportFailed { code: error.code() });
            if error.is_connection_limit() {
                self.report_connection_limit(&error.to_string()).await;
            }

            match plan_recovery(error.kind(), retry_attempt, &self.policy) {
                Recovery::Reconnect {
                    delay,
                    next_attempt,
                } => {
                    tracing::warn!(
                        error = %error,
                        code = error.code(),
                        attempt = next_attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "A connection error occurred, reconnecting"
                    );
                    self.emit(StreamEvent::Reconnecting {
                        attempt: next_attempt,
                        delay,
                    });

                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => {
                            self.stop();
                            return Ok(());
                        }
                        () = self.ports.timer.sleep(delay) => {}
                    }
                    retry_attempt = next_attempt;
                }
                Recovery::Halt => {
                    tracing::error!(error = %error, code = error.code(), "Non-recoverable stream error");
                    self.halt(&error.to_string(), retry_attempt).await;
                    return Err(StreamError::Unrecoverable(error));
                }
                Recovery::Exhausted { attempts } => {
                    tracing::error!(attempts, error = %error, "Maximum reconnection attempts exceeded");
                    let stop = StreamError::MaxReconnectAttemptsExceeded(attempts);
                    self.halt(&stop.to_string(), retry_attempt).await;
                    return Err(stop);
                }
            }
        }
    }

    /// Read chunks until the session fails. Returns `None` when cancelled.
    async fn consume(&self, session: &mut StreamSession) -> Option<TransportError> {
        let idle_timeout = self.config.idle_timeout;
        let mut streaming = false;

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                next = tokio::time::timeout(idle_timeout, session.next_chunk()) => next,
            };

            let chunk = match next {
                Err(_) => return Some(TransportError::IdleTimeout(idle_timeout)),
                Ok(None) => return Some(TransportError::Closed),
                Ok(Some(Err(e))) => return Some(e),
                Ok(Some(Ok(chunk))) => chunk,
            };

            if !streaming {
                streaming = true;
                tracing::info!(retry_attempt = session.retry_attempt(), "Filtered stream connected");
                self.emit(StreamEvent::Streaming);
            }

            self.handle_chunk(session, &chunk).await;
        }
    }

    async fn handle_chunk(&self, session: &mut StreamSession, chunk: &[u8]) {
        let frame = decode_frame(chunk);
        if frame.is_decoded() {
            session.reset_retry();
        }

        match frame {
            Frame::Post(post) => self.deliver(&post).await,
            Frame::Rejected(reason) => {
                tracing::warn!(reason = %reason, "Rejected stream payload");
                self.ports
                    .reporter
                    .report("Post is in wrong format or undefined:", &reason.to_string())
                    .await;
                self.emit(StreamEvent::PayloadRejected);
            }
            Frame::ConnectionLimit(detail) => self.report_connection_limit(&detail).await,
            Frame::KeepAlive => tracing::trace!("Keep-alive received"),
            Frame::Unparseable => {
                tracing::trace!(len = chunk.len(), "Dropping undecodable chunk");
                self.emit(StreamEvent::ChunkDropped);
            }
        }
    }

    async fn deliver(&self, post: &Post) {
        let url = post.status_url(&self.config.status_url_base, &self.config.account_handle);

        match self.ports.sink.send(&url).await {
            Ok(()) => {
                tracing::debug!(id = post.id(), "Post delivered");
                self.emit(StreamEvent::PostDelivered {
                    id: post.id().to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(id = post.id(), error = %e, "Failed to deliver post");
                self.ports
                    .reporter
                    .report("Failed to deliver post:", &format!("{url}: {e}"))
                    .await;
                self.emit(StreamEvent::DeliveryFailed);
            }
        }
    }

    async fn report_connection_limit(&self, detail: &str) {
        tracing::warn!(detail, "Filtered stream connection limit reached");
        self.ports
            .reporter
            .report("Filtered stream connection limit reached:", detail)
            .await;
        self.emit(StreamEvent::ConnectionLimit);
    }

    async fn halt(&self, reason: &str, retry_attempt: u32) {
        self.ports
            .reporter
            .report("Filtered stream stopped:", reason)
            .await;
        self.emit(StreamEvent::Halted {
            reason: reason.to_string(),
            retry_attempt,
        });
    }

    fn stop(&self) {
        tracing::info!("Filtered stream stopped");
        self.emit(StreamEvent::Stopped);
    }

    /// Publish `event` without waiting on the consumer; a full channel drops it.
    fn emit(&self, event: StreamEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.event_tx.try_send(event) {
            tracing::trace!(?event, "Event channel full, dropping stream event");
        }
    }
}
