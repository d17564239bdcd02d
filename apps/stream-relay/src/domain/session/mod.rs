//! Stream Session Lifecycle
//!
//! State machine for the single filtered stream connection:
//!
//! ```text
//!              first chunk              reset-type error
//! Connecting ───────────────► Streaming ─────────────────► Reconnecting
//!     ▲                                                        │
//!     └────────────────────── backoff elapsed ─────────────────┘
//!
//! any ── non-reset error ──► Halted        any ── cancelled ──► Stopped
//! ```
//!
//! Recovery decisions are pure functions of the failure kind, the retry
//! counter, and the [`ReconnectPolicy`], so they are tested without timers
//! or sockets.

mod reconnect;

use std::fmt;
use std::time::Duration;

pub use reconnect::{ReconnectConfig, ReconnectPolicy};

/// Connection state of the stream manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Opening the stream request.
    #[default]
    Connecting,
    /// Receiving chunks.
    Streaming,
    /// Waiting out the backoff delay before reconnecting.
    Reconnecting,
    /// Stopped after a non-recoverable error.
    Halted,
    /// Stopped by shutdown.
    Stopped,
}

impl StreamState {
    /// State name for logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Halted => "halted",
            Self::Stopped => "stopped",
        }
    }

    /// Whether the manager has left the connect loop for good.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Halted | Self::Stopped)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a transport failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The connection was reset, dropped or never came up; worth retrying.
    Reset,
    /// The provider refused the request in a way retrying will not fix.
    Fatal,
}

/// What to do after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Wait `delay`, then connect again carrying `next_attempt`.
    Reconnect {
        /// Backoff delay before reconnecting.
        delay: Duration,
        /// Retry counter for the next session.
        next_attempt: u32,
    },
    /// Stop without retrying.
    Halt,
    /// The configured attempt limit is used up.
    Exhausted {
        /// Number of reconnection attempts made.
        attempts: u32,
    },
}

/// Decide how to recover from a failure seen with `retry_attempt` prior retries.
#[must_use]
pub fn plan_recovery(kind: FailureKind, retry_attempt: u32, policy: &ReconnectPolicy) -> Recovery {
    match kind {
        FailureKind::Fatal => Recovery::Halt,
        FailureKind::Reset if !policy.allows(retry_attempt) => Recovery::Exhausted {
            attempts: retry_attempt,
        },
        FailureKind::Reset => Recovery::Reconnect {
            delay: policy.delay_for(retry_attempt),
            next_attempt: retry_attempt.saturating_add(1),
        },
    }
}
