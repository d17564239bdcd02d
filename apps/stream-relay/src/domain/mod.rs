//! Domain Layer - Core relay types and business logic.
//!
//! Pure types with no I/O: payload decoding, the stream session state
//! machine with its backoff policy, and tracked transaction records.

/// Filtered stream payload decoding.
pub mod post;

/// Stream session lifecycle and reconnection policy.
pub mod session;

/// Tracked transaction records.
pub mod tracking;
