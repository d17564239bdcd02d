#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Stream Relay - Filtered Stream to Chat Channel
//!
//! Holds a single long-lived connection to the Twitter API v2 filtered
//! stream, forwards each post from one account to a Discord channel as a
//! status URL, and reconnects with capped exponential backoff when the
//! connection breaks.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `post`: Chunk decoding into typed frames
//!   - `session`: Stream state machine and reconnection policy
//!   - `tracking`: Tracked transaction records
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Stream transport, rules API, chat sink, error reporter, timer, record store
//!   - `services`: Stream manager, rule sync, relay
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `twitter`: Filtered stream and rules clients
//!   - `discord`: Post channel and log channel
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                    ┌──────────────┐    ┌───────────────┐
//! Filtered stream ──►│ NdjsonFramer │───►│ StreamManager │──► Discord channel
//!                    └──────────────┘    └───────┬───────┘
//!                                                │ StreamEvent
//!                                                ▼
//!                                     health status / metrics
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::post::{CONNECTION_LIMIT_MARKER, Frame, PayloadError, Post, decode_frame};
pub use domain::session::{
    FailureKind, ReconnectConfig, ReconnectPolicy, Recovery, StreamState, plan_recovery,
};
pub use domain::tracking::TrackedRecord;

// Services
pub use application::services::{
    Relay, RelayError, RuleSync, RuleSyncReport, SetupError, StreamError, StreamEvent,
    StreamManager, StreamManagerConfig, StreamPorts, StreamSession,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, DiscordSettings, RelayConfig, Secret, ServerSettings, StreamSettings,
    TwitterSettings,
};

// Health server
pub use infrastructure::health::{
    HealthServer, HealthServerError, HealthServerState, StreamStatus,
};

// Metrics
pub use infrastructure::metrics::{init_metrics, record_stream_event};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
