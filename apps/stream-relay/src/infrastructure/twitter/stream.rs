//! Filtered Stream Client
//!
//! Opens `GET /2/tweets/search/stream` and exposes the body as framed chunks.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;

use crate::application::ports::{ChunkStream, StreamTransport, TransportError};
use crate::infrastructure::config::{Secret, TwitterSettings};

use super::USER_AGENT;
use super::framing::frame_stream;

/// Time allowed to establish the TCP/TLS connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the filtered stream endpoint.
#[derive(Debug, Clone)]
pub struct FilteredStreamClient {
    client: Client,
    stream_url: String,
    bearer_token: Secret,
}

impl FilteredStreamClient {
    /// Create a client from Twitter settings.
    ///
    /// No overall request timeout is set because the body stays open
    /// indefinitely; the stream manager bounds the wait between chunks.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidRequest` if the HTTP client cannot be built.
    pub fn new(settings: &TwitterSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            stream_url: settings.stream_url(),
            bearer_token: settings.bearer_token.clone(),
        })
    }

    /// Stream endpoint URL.
    #[must_use]
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
}

#[async_trait]
impl StreamTransport for FilteredStreamClient {
    async fn open(&self) -> Result<ChunkStream, TransportError> {
        let response = self
            .client
            .get(&self.stream_url)
            .bearer_auth(self.bearer_token.expose())
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(status = status.as_u16(), "Filtered stream response received");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Reset(describe(&e))));
        Ok(frame_stream(body))
    }
}

fn classify_request_error(e: reqwest::Error) -> TransportError {
    if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else if is_connection_reset(&e) {
        TransportError::Reset(describe(&e))
    } else {
        TransportError::Connect(describe(&e))
    }
}

/// Whether any error in the source chain is an I/O reset.
fn is_connection_reset(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(e) = current {
        if let Some(io_error) = e.downcast_ref::<io::Error>()
            && matches!(
                io_error.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        current = e.source();
    }
    false
}

/// Error message including its sources.
fn describe(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("body read failed")]
    struct Wrapper(#[source] io::Error);

    #[test]
    fn finds_reset_in_source_chain() {
        let wrapped = Wrapper(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(is_connection_reset(&wrapped));

        let other = Wrapper(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!is_connection_reset(&other));
    }

    #[test]
    fn describe_joins_sources() {
        let wrapped = Wrapper(io::Error::other("socket closed"));
        assert_eq!(describe(&wrapped), "body read failed: socket closed");
    }
}
