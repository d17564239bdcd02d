//! Stream Relay Binary
//!
//! Starts the filtered stream relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin stream-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TWITTER_BEARER_TOKEN`: App bearer token
//! - `TWITTER_OFFICIAL_CHANNEL_NAME`: Handle whose posts are relayed
//! - `DISCORD_BOT_TOKEN`: Bot token
//! - `DISCORD_TWEETS_CHANNEL_ID`: Destination channel id
//!
//! ## Optional
//! - `DISCORD_LOG_CHANNEL_ID`: Channel for operational errors (default: log output only)
//! - `TWITTER_API_BASE_URL`: API root (default: <https://api.twitter.com>)
//! - `DISCORD_API_BASE_URL`: API root (default: <https://discord.com/api/v10>)
//! - `STREAM_RELAY_STATUS_URL_BASE`: Status URL root (default: <https://twitter.com>)
//! - `STREAM_RELAY_IDLE_TIMEOUT_SECS`: Longest wait between chunks (default: 20)
//! - `STREAM_RELAY_RECONNECT_DELAY_INITIAL_MS`: First backoff delay (default: 1)
//! - `STREAM_RELAY_RECONNECT_DELAY_MAX_SECS`: Backoff cap (default: 64)
//! - `STREAM_RELAY_RECONNECT_DELAY_MULTIPLIER`: Backoff growth (default: 2.0)
//! - `STREAM_RELAY_RECONNECT_JITTER`: Jitter fraction (default: 0.0)
//! - `STREAM_RELAY_MAX_RECONNECT_ATTEMPTS`: Attempt limit, 0 = unlimited (default: 0)
//! - `STREAM_RELAY_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: cream-stream-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use stream_relay::application::ports::{StreamTransport, TokioTimer};
use stream_relay::infrastructure::discord::{DiscordChannel, DiscordClient, LogChannelReporter};
use stream_relay::infrastructure::health::{HealthServer, HealthServerState, StreamStatus};
use stream_relay::infrastructure::telemetry;
use stream_relay::infrastructure::twitter::{FilteredStreamClient, RulesClient};
use stream_relay::{
    ReconnectConfig, RelayConfig, Relay, RuleSync, StreamEvent, StreamManager,
    StreamManagerConfig, StreamPorts, init_metrics, record_stream_event,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the stream event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Stream Relay");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Health server
    let stream_status = Arc::new(StreamStatus::new());
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&stream_status),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Adapters
    let transport: Arc<dyn StreamTransport> = Arc::new(FilteredStreamClient::new(&config.twitter)?);
    let rules = Arc::new(RulesClient::new(&config.twitter)?);
    let discord = Arc::new(DiscordClient::new(&config.discord)?);
    let posts_channel = Arc::new(DiscordChannel::new(
        Arc::clone(&discord),
        config.discord.posts_channel_id.clone(),
    ));
    let reporter = Arc::new(LogChannelReporter::new(
        config
            .discord
            .log_channel_id
            .clone()
            .map(|id| DiscordChannel::new(Arc::clone(&discord), id)),
    ));

    // Stream events feed health state and metrics
    let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(EVENT_CHANNEL_CAPACITY);
    let event_status = Arc::clone(&stream_status);
    tokio::spawn(async move {
        handle_stream_events(event_rx, event_status).await;
    });

    let manager_config = StreamManagerConfig {
        account_handle: config.twitter.account_handle.clone(),
        status_url_base: config.twitter.status_url_base.clone(),
        idle_timeout: config.stream.idle_timeout,
        reconnect: ReconnectConfig::from_stream_settings(&config.stream),
    };
    let ports = StreamPorts {
        transport,
        sink: posts_channel,
        reporter: reporter.clone(),
        timer: Arc::new(TokioTimer),
    };
    let manager = StreamManager::new(manager_config, ports, event_tx, shutdown_token.clone());
    let rule_sync = RuleSync::new(
        rules,
        reporter.clone(),
        config.twitter.account_handle.clone(),
    );
    let relay = Relay::new(rule_sync, manager, reporter);

    let relay_status = Arc::clone(&stream_status);
    let relay_handle = tokio::spawn(async move {
        match relay.run().await {
            Ok(()) => tracing::info!("Relay stopped"),
            Err(e) => {
                relay_status.mark_halted(e.to_string());
                tracing::error!(error = %e, "Relay halted");
            }
        }
    });

    tracing::info!("Stream relay ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, relay_handle)
        .await
        .is_err()
    {
        tracing::warn!("Relay did not stop within the shutdown timeout");
    }

    tracing::info!("Stream relay stopped");
    Ok(())
}

/// Handle events from the stream manager.
async fn handle_stream_events(mut rx: mpsc::Receiver<StreamEvent>, status: Arc<StreamStatus>) {
    while let Some(event) = rx.recv().await {
        status.apply(&event);
        record_stream_event(&event);

        match &event {
            StreamEvent::Reconnecting { attempt, delay } => {
                tracing::info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Stream reconnecting"
                );
            }
            StreamEvent::Halted { reason, .. } => {
                tracing::error!(reason = %reason, "Stream halted");
            }
            _ => tracing::trace!(?event, "Stream event"),
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        account = %config.twitter.account_handle,
        posts_channel = %config.discord.posts_channel_id,
        log_channel = config.discord.log_channel_id.as_deref().unwrap_or("none"),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        stream_url = %config.twitter.stream_url(),
        rules_url = %config.twitter.rules_url(),
        idle_timeout_secs = config.stream.idle_timeout.as_secs(),
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        "Stream endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
