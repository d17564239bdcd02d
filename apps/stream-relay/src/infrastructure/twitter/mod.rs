//! Twitter API v2 Integration
//!
//! Adapters for the filtered stream and its rules endpoint.
//!
//! # Components
//!
//! - `FilteredStreamClient`: opens the long-lived stream (implements `StreamTransport`)
//! - `RulesClient`: lists, deletes and adds stream rules (implements `RulesPort`)
//! - `NdjsonFramer`: splits the body into one record per line

mod framing;
mod rules;
mod stream;

pub use framing::{MAX_FRAME_LEN, NdjsonFramer, frame_stream};
pub use rules::RulesClient;
pub use stream::FilteredStreamClient;

/// `User-Agent` sent with every Twitter request.
pub const USER_AGENT: &str = concat!("v2FilterStreamRust/", env!("CARGO_PKG_VERSION"));
