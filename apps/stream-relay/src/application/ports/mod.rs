//! Port Interfaces
//!
//! Interfaces for the external systems the relay talks to. Infrastructure
//! adapters implement these; the stream manager and rule sync only see the
//! traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamTransport`: the filtered stream connection
//! - `RulesPort`: the stream rules API
//! - `PostSink`: the destination chat channel
//! - `ErrorReporter`: the log channel
//! - `Timer`: backoff waits
//! - `TrackedRecordStore`: tracked transaction persistence

mod delivery_port;
mod rules_port;
mod stream_port;
mod timer_port;
mod tracking_port;

pub use delivery_port::{DeliveryError, ErrorReporter, PostSink};
#[cfg(test)]
pub use rules_port::MockRulesPort;
pub use rules_port::{
    NewRule, Rule, RulesError, RulesListing, RulesMeta, RulesMutation, RulesPort, RulesSummary,
};
pub use stream_port::{ChunkStream, StreamTransport, TransportError};
pub use timer_port::{Timer, TokioTimer};
pub use tracking_port::{InMemoryTrackedRecordStore, TrackedRecordStore, TrackingError};
