//! Line Framing
//!
//! The stream body is newline-delimited JSON with `\r\n` separators. HTTP
//! chunk boundaries do not line up with records, so bytes are buffered until
//! a full line is available. Blank lines (keep-alives) are passed through as
//! empty frames.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, future, stream};

use crate::application::ports::{ChunkStream, TransportError};

/// Longest line buffered before it is flushed as a frame on its own.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Incremental splitter for `\n` / `\r\n` delimited records.
#[derive(Debug, Default)]
pub struct NdjsonFramer {
    buffer: BytesMut,
}

impl NdjsonFramer {
    /// Create an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw body bytes, returning every line they complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            frames.push(line.freeze());
        }

        if self.buffer.len() > MAX_FRAME_LEN {
            tracing::warn!(len = self.buffer.len(), "Flushing oversized stream line");
            frames.push(self.buffer.split().freeze());
        }

        frames
    }

    /// Take whatever is left after the body ends.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.split().freeze())
        }
    }

    /// Bytes waiting for a delimiter.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Re-frame a raw body stream into one item per line.
///
/// Errors pass through in order and discard any partial line. A trailing
/// line without a delimiter is emitted when the body ends cleanly.
pub fn frame_stream<S>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
{
    let framed = body
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .scan(NdjsonFramer::new(), |framer, item| {
            let frames: Vec<Result<Bytes, TransportError>> = match item {
                Some(Ok(chunk)) => framer.push(&chunk).into_iter().map(Ok).collect(),
                Some(Err(e)) => {
                    framer.buffer.clear();
                    vec![Err(e)]
                }
                None => framer.finish().into_iter().map(Ok).collect(),
            };
            future::ready(Some(stream::iter(frames)))
        })
        .flatten();

    Box::pin(framed)
}
