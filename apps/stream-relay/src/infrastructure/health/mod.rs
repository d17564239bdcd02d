//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, stream status reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (stream is open)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::StreamEvent;
use crate::domain::session::StreamState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Stream Status
// =============================================================================

/// Live view of the stream manager, fed from its events.
#[derive(Debug, Default)]
pub struct StreamStatus {
    state: RwLock<StreamState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    retry_attempt: AtomicU32,
    posts_delivered: AtomicU64,
    delivery_failures: AtomicU64,
    payloads_rejected: AtomicU64,
    chunks_dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl StreamStatus {
    /// Create a status in the `Connecting` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a stream event into the status.
    pub fn apply(&self, event: &StreamEvent) {
        match event {
            StreamEvent::Connecting { retry_attempt } => {
                *self.state.write() = StreamState::Connecting;
                self.retry_attempt.store(*retry_attempt, Ordering::Relaxed);
            }
            StreamEvent::Streaming => {
                *self.state.write() = StreamState::Streaming;
                *self.last_connected_at.write() = Some(Utc::now());
                *self.last_error.write() = None;
            }
            StreamEvent::PostDelivered { .. } => {
                self.posts_delivered.fetch_add(1, Ordering::Relaxed);
            }
            StreamEvent::DeliveryFailed => {
                self.delivery_failures.fetch_add(1, Ordering::Relaxed);
            }
            StreamEvent::PayloadRejected => {
                self.payloads_rejected.fetch_add(1, Ordering::Relaxed);
            }
            StreamEvent::ChunkDropped => {
                self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            }
            StreamEvent::ConnectionLimit => {
                *self.last_error.write() = Some("connection limit reached".to_string());
            }
            StreamEvent::TransportFailed { code } => {
                *self.last_error.write() = Some((*code).to_string());
            }
            StreamEvent::Reconnecting { attempt, .. } => {
                *self.state.write() = StreamState::Reconnecting;
                self.retry_attempt.store(*attempt, Ordering::Relaxed);
                self.reconnects.fetch_add(1, Ordering::Relaxed);
            }
            StreamEvent::Halted { reason, .. } => self.mark_halted(reason.clone()),
            StreamEvent::Stopped => *self.state.write() = StreamState::Stopped,
        }
    }

    /// Record that the relay stopped on `reason`.
    pub fn mark_halted(&self, reason: String) {
        *self.state.write() = StreamState::Halted;
        *self.last_error.write() = Some(reason);
    }

    /// Current stream state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        *self.state.read()
    }

    /// Current retry counter.
    #[must_use]
    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt.load(Ordering::Relaxed)
    }

    /// Posts forwarded since startup.
    #[must_use]
    pub fn posts_delivered(&self) -> u64 {
        self.posts_delivered.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> StreamInfo {
        let state = self.state();
        StreamInfo {
            state: state.as_str(),
            connected: state == StreamState::Streaming,
            retry_attempt: self.retry_attempt(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
            posts_delivered: self.posts_delivered(),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            payloads_rejected: self.payloads_rejected.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Stream connection status.
    pub stream: StreamInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Stream open.
    Healthy,
    /// Connecting or waiting to reconnect.
    Degraded,
    /// Stream stopped.
    Unhealthy,
}

impl From<StreamState> for HealthStatus {
    fn from(state: StreamState) -> Self {
        match state {
            StreamState::Streaming => Self::Healthy,
            StreamState::Connecting | StreamState::Reconnecting => Self::Degraded,
            StreamState::Halted | StreamState::Stopped => Self::Unhealthy,
        }
    }
}

/// Stream connection status.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Connection state.
    pub state: &'static str,
    /// Whether the stream is open.
    pub connected: bool,
    /// Current retry counter.
    pub retry_attempt: u32,
    /// When the stream last opened.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent failure.
    pub last_error: Option<String>,
    /// Posts forwarded.
    pub posts_delivered: u64,
    /// Posts that could not be forwarded.
    pub delivery_failures: u64,
    /// Payloads rejected as malformed.
    pub payloads_rejected: u64,
    /// Undecodable chunks dropped.
    pub chunks_dropped: u64,
    /// Reconnections scheduled.
    pub reconnects: u64,
}

// =============================================================================
// Health Server
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    stream: Arc<StreamStatus>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, stream: Arc<StreamStatus>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            stream,
        }
    }
}

/// Build the health and metrics routes.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.stream.state() == StreamState::Streaming {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let stream = state.stream.snapshot();

    HealthResponse {
        status: HealthStatus::from(state.stream.state()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        stream,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
