//! Filtered Stream Payloads
//!
//! Decodes one line of the filtered stream body into a typed [`Frame`].
//! Every chunk the stream produces goes through [`decode_frame`], so the
//! rules for what gets delivered, reported, or dropped live in one place.
//!
//! # Wire Format
//!
//! The stream body is a sequence of `\r\n`-delimited JSON objects:
//!
//! ```json
//! {"data":{"id":"1580000000000000000","text":"gm"}}
//! ```
//!
//! Empty lines are keep-alive heartbeats sent while the stream is idle.

use serde::Deserialize;

/// Text the provider sends when too many connections are open for the app.
pub const CONNECTION_LIMIT_MARKER: &str =
    "This stream is currently at the maximum allowed connection limit.";

// =============================================================================
// Post
// =============================================================================

/// A validated post received from the filtered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    id: String,
    text: String,
}

impl Post {
    /// Create a post, rejecting empty identifiers or text.
    ///
    /// # Errors
    ///
    /// Returns `PayloadError::MissingId` or `PayloadError::MissingText` when
    /// the respective field is empty or whitespace.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Result<Self, PayloadError> {
        let id = id.into();
        let text = text.into();

        if id.trim().is_empty() {
            return Err(PayloadError::MissingId);
        }
        if text.trim().is_empty() {
            return Err(PayloadError::MissingText);
        }

        Ok(Self { id, text })
    }

    /// Post identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Post text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Public URL of the post for the given account handle.
    ///
    /// `base` is the site root without a trailing slash, e.g. `https://twitter.com`.
    #[must_use]
    pub fn status_url(&self, base: &str, handle: &str) -> String {
        format!("{}/{handle}/status/{}", base.trim_end_matches('/'), self.id)
    }
}

// =============================================================================
// Frame
// =============================================================================

/// Result of decoding one chunk from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A deliverable post.
    Post(Post),
    /// Valid JSON that is not a deliverable post.
    Rejected(PayloadError),
    /// The provider refused the connection because the limit is reached.
    ConnectionLimit(String),
    /// Empty heartbeat line.
    KeepAlive,
    /// Bytes that are not JSON (partial or malformed frame).
    Unparseable,
}

impl Frame {
    /// Whether this frame decoded as JSON, proving the connection carries
    /// well-formed data.
    #[must_use]
    pub const fn is_decoded(&self) -> bool {
        matches!(self, Self::Post(_) | Self::Rejected(_))
    }
}

/// Why a JSON payload could not be turned into a [`Post`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// No `data` object in the payload.
    #[error("payload has no data object")]
    MissingData,
    /// `data.id` missing or empty.
    #[error("payload data has no id")]
    MissingId,
    /// `data.text` missing or empty.
    #[error("payload data has no text")]
    MissingText,
    /// The provider sent an error envelope instead of data.
    #[error("provider reported errors: {0}")]
    Provider(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<EnvelopeData>,
    #[serde(default)]
    errors: Option<Vec<ProviderProblem>>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderProblem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl ProviderProblem {
    fn describe(&self) -> &str {
        self.detail
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or("unknown error")
    }
}

/// Decode one chunk from the stream.
///
/// The connection-limit marker only counts when the chunk is not a post: the
/// provider sends it either as plain text or as a problem document whose
/// `detail` is the marker. A post quoting the marker is still a post.
#[must_use]
pub fn decode_frame(raw: &[u8]) -> Frame {
    let trimmed = raw.trim_ascii();
    if trimmed.is_empty() {
        return Frame::KeepAlive;
    }

    let Ok(envelope) = serde_json::from_slice::<Envelope>(trimmed) else {
        if contains_marker(trimmed) {
            return Frame::ConnectionLimit(CONNECTION_LIMIT_MARKER.to_string());
        }
        return Frame::Unparseable;
    };

    match envelope {
        Envelope {
            data: Some(data), ..
        } => match Post::new(data.id.unwrap_or_default(), data.text.unwrap_or_default()) {
            Ok(post) => Frame::Post(post),
            Err(e) => Frame::Rejected(e),
        },
        Envelope {
            data: None,
            detail: Some(detail),
            ..
        } if detail.trim() == CONNECTION_LIMIT_MARKER => {
            Frame::ConnectionLimit(CONNECTION_LIMIT_MARKER.to_string())
        }
        Envelope {
            data: None,
            errors: Some(errors),
            ..
        } if !errors.is_empty() => {
            let summary = errors
                .iter()
                .map(ProviderProblem::describe)
                .collect::<Vec<_>>()
                .join("; ");
            Frame::Rejected(PayloadError::Provider(summary))
        }
        Envelope { data: None, .. } => Frame::Rejected(PayloadError::MissingData),
    }
}

/// Whether a raw body contains the connection-limit marker.
#[must_use]
pub fn contains_marker(raw: &[u8]) -> bool {
    let marker = CONNECTION_LIMIT_MARKER.as_bytes();
    raw.windows(marker.len()).any(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_post() {
        let frame = decode_frame(br#"{"data":{"id":"123","text":"hello"}}"#);
        assert_eq!(frame, Frame::Post(Post::new("123", "hello").unwrap()));
        assert!(frame.is_decoded());
    }

    #[test]
    fn decodes_post_with_extra_fields_and_crlf() {
        let frame = decode_frame(
            b"{\"data\":{\"id\":\"9\",\"text\":\"gm\",\"edit_history_tweet_ids\":[\"9\"]},\"matching_rules\":[{\"id\":\"1\"}]}\r\n",
        );
        assert!(matches!(frame, Frame::Post(ref p) if p.id() == "9" && p.text() == "gm"));
    }

    #[test]
    fn empty_line_is_keep_alive() {
        assert_eq!(decode_frame(b"\r\n"), Frame::KeepAlive);
        assert_eq!(decode_frame(b""), Frame::KeepAlive);
        assert!(!Frame::KeepAlive.is_decoded());
    }

    #[test]
    fn partial_json_is_unparseable() {
        assert_eq!(decode_frame(br#"{"data":{"id":"12"#), Frame::Unparseable);
        assert_eq!(decode_frame(b"not json at all"), Frame::Unparseable);
    }

    #[test]
    fn missing_text_is_rejected() {
        assert_eq!(
            decode_frame(br#"{"data":{"id":"123","text":""}}"#),
            Frame::Rejected(PayloadError::MissingText)
        );
        assert_eq!(
            decode_frame(br#"{"data":{"text":"hi"}}"#),
            Frame::Rejected(PayloadError::MissingId)
        );
    }

    #[test]
    fn object_without_data_is_rejected() {
        assert_eq!(
            decode_frame(br#"{"meta":{}}"#),
            Frame::Rejected(PayloadError::MissingData)
        );
    }

    #[test]
    fn provider_errors_are_rejected_with_summary() {
        let frame = decode_frame(
            br#"{"errors":[{"title":"operational-disconnect","detail":"This stream has been disconnected for operational reasons."}]}"#,
        );
        assert_eq!(
            frame,
            Frame::Rejected(PayloadError::Provider(
                "This stream has been disconnected for operational reasons.".to_string()
            ))
        );
    }

    #[test]
    fn connection_limit_marker_in_json_problem() {
        let frame = decode_frame(
            br#"{"title":"ConnectionException","detail":"This stream is currently at the maximum allowed connection limit.","connection_issue":"TooManyConnections","type":"https://api.twitter.com/2/problems/streaming-connection"}"#,
        );
        assert!(matches!(frame, Frame::ConnectionLimit(_)));
    }

    #[test]
    fn connection_limit_marker_in_plain_text() {
        let frame =
            decode_frame(b"This stream is currently at the maximum allowed connection limit.");
        assert!(matches!(frame, Frame::ConnectionLimit(_)));
        assert!(!frame.is_decoded());
    }

    #[test]
    fn post_quoting_the_marker_is_delivered() {
        let frame = decode_frame(
            br#"{"data":{"id":"555","text":"Got: This stream is currently at the maximum allowed connection limit. lol"}}"#,
        );
        assert!(matches!(frame, Frame::Post(ref p) if p.id() == "555"));
        assert!(frame.is_decoded());
    }

    #[test]
    fn rejected_payload_quoting_the_marker_stays_rejected() {
        let frame = decode_frame(
            br#"{"data":{"id":"","text":"This stream is currently at the maximum allowed connection limit."}}"#,
        );
        assert_eq!(frame, Frame::Rejected(PayloadError::MissingId));
    }

    #[test]
    fn problem_document_with_other_detail_is_not_a_limit() {
        let frame = decode_frame(
            br#"{"title":"ConnectionException","detail":"Mentions This stream is currently at the maximum allowed connection limit. in passing"}"#,
        );
        assert_eq!(frame, Frame::Rejected(PayloadError::MissingData));
    }

    #[test]
    fn status_url_uses_handle_and_id() {
        let post = Post::new("123", "hello").unwrap();
        assert_eq!(
            post.status_url("https://twitter.com/", "cream"),
            "https://twitter.com/cream/status/123"
        );
    }

    #[test]
    fn post_rejects_blank_fields() {
        assert_eq!(Post::new(" ", "x"), Err(PayloadError::MissingId));
        assert_eq!(Post::new("1", "  "), Err(PayloadError::MissingText));
    }
}
