//! Timer Port (Driven Port)
//!
//! Backoff waits go through this port so the reconnect loop can be driven
//! without real time.

use std::time::Duration;

use async_trait::async_trait;

/// Port for suspending until a delay has elapsed.
#[async_trait]
pub trait Timer: Send + Sync {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Timer backed by the tokio clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
