//! Application Services
//!
//! Orchestration over the ports: the stream connection loop, rules setup,
//! and the relay that sequences them.

mod relay;
mod rule_sync;
mod stream_manager;

pub use relay::{Relay, RelayError};
pub use rule_sync::{RuleSync, RuleSyncReport, SetupError};
pub use stream_manager::{
    StreamError, StreamEvent, StreamManager, StreamManagerConfig, StreamPorts, StreamSession,
};
