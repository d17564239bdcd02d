//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Posts**: Posts delivered, failed deliveries, rejected payloads
//! - **Stream**: Dropped chunks, connection-limit notices, current state
//! - **Reconnects**: Transport errors by code, reconnect count and delays
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::services::StreamEvent;
use crate::domain::session::StreamState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics recorder installation failure.
#[derive(Debug, thiserror::Error)]
#[error("failed to install Prometheus recorder: {0}")]
pub struct MetricsError(String);

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns `MetricsError` if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError(e.to_string()))?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "stream_relay_posts_delivered_total",
        "Total posts forwarded to the chat channel"
    );
    describe_counter!(
        "stream_relay_delivery_failures_total",
        "Total posts that could not be forwarded"
    );
    describe_counter!(
        "stream_relay_payloads_rejected_total",
        "Total JSON payloads rejected as malformed"
    );
    describe_counter!(
        "stream_relay_chunks_dropped_total",
        "Total undecodable chunks dropped"
    );
    describe_counter!(
        "stream_relay_connection_limit_total",
        "Total connection-limit notices from the provider"
    );
    describe_counter!(
        "stream_relay_transport_errors_total",
        "Total stream transport errors by code"
    );
    describe_counter!(
        "stream_relay_reconnects_total",
        "Total stream reconnection attempts"
    );
    describe_histogram!(
        "stream_relay_reconnect_delay_seconds",
        "Backoff delay before each reconnection"
    );
    describe_gauge!(
        "stream_relay_stream_state",
        "1 for the current stream state, 0 otherwise"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const STATES: [StreamState; 5] = [
    StreamState::Connecting,
    StreamState::Streaming,
    StreamState::Reconnecting,
    StreamState::Halted,
    StreamState::Stopped,
];

/// Record a stream manager event.
pub fn record_stream_event(event: &StreamEvent) {
    match event {
        StreamEvent::Connecting { .. } => set_stream_state(StreamState::Connecting),
        StreamEvent::Streaming => set_stream_state(StreamState::Streaming),
        StreamEvent::PostDelivered { .. } => {
            counter!("stream_relay_posts_delivered_total").increment(1);
        }
        StreamEvent::DeliveryFailed => {
            counter!("stream_relay_delivery_failures_total").increment(1);
        }
        StreamEvent::PayloadRejected => {
            counter!("stream_relay_payloads_rejected_total").increment(1);
        }
        StreamEvent::ChunkDropped => counter!("stream_relay_chunks_dropped_total").increment(1),
        StreamEvent::ConnectionLimit => {
            counter!("stream_relay_connection_limit_total").increment(1);
        }
        StreamEvent::TransportFailed { code } => record_transport_error(code),
        StreamEvent::Reconnecting { delay, .. } => record_reconnect(*delay),
        StreamEvent::Halted { .. } => set_stream_state(StreamState::Halted),
        StreamEvent::Stopped => set_stream_state(StreamState::Stopped),
    }
}

/// Set the stream state gauge.
pub fn set_stream_state(current: StreamState) {
    for state in STATES {
        let value = if state == current { 1.0 } else { 0.0 };
        gauge!("stream_relay_stream_state", "state" => state.as_str()).set(value);
    }
}

/// Record a stream transport error.
pub fn record_transport_error(code: &'static str) {
    counter!("stream_relay_transport_errors_total", "code" => code).increment(1);
}

/// Record a scheduled reconnection.
pub fn record_reconnect(delay: Duration) {
    counter!("stream_relay_reconnects_total").increment(1);
    histogram!("stream_relay_reconnect_delay_seconds").record(delay.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
