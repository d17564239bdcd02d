//! Reconnection Policy
//!
//! Exponential backoff for re-opening the filtered stream. The delay for a
//! given attempt is computed from the attempt number alone, so the retry
//! counter carried by the stream session is the only state.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(64),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `StreamSettings`.
    #[must_use]
    pub const fn from_stream_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: settings.reconnect_jitter_factor,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Reconnection policy implementing capped exponential backoff with optional jitter.
///
/// # Example
///
/// ```rust
/// use stream_relay::domain::session::ReconnectPolicy;
/// use std::time::Duration;
///
/// let policy = ReconnectPolicy::default();
///
/// assert_eq!(policy.delay_for(0), Duration::from_millis(1));
/// assert_eq!(policy.delay_for(3), Duration::from_millis(8));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    /// Policy configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Whether another reconnection is allowed after `attempt` prior retries.
    #[must_use]
    pub const fn allows(&self, attempt: u32) -> bool {
        self.config.max_attempts == 0 || attempt < self.config.max_attempts
    }

    /// Delay to wait before the reconnection that follows `attempt` prior retries.
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`, then jittered.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);

        #[allow(clippy::cast_precision_loss)]
        let base_millis = self.config.initial_delay.as_millis() as f64;
        let scaled = (base_millis * self.config.multiplier.powi(exponent)).round();

        let max_millis = self.config.max_delay.as_millis();
        let millis = if scaled.is_finite() && scaled >= 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else {
            max_millis
        };

        let capped = Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX));
        self.apply_jitter(capped)
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn exact(initial_ms: u64, max_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        })
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(1));
        assert_eq!(config.max_delay, Duration::from_secs(64));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.jitter_factor.abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 0);
    }

    #[test]
    fn default_policy_counts_in_milliseconds_up_to_the_cap() {
        let policy = ReconnectPolicy::default();
        for attempt in 0..16u32 {
            assert_eq!(
                policy.delay_for(attempt),
                Duration::from_millis(1 << attempt)
            );
        }
        assert_eq!(policy.delay_for(16), Duration::from_secs(64));
        assert_eq!(policy.delay_for(40), Duration::from_secs(64));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = exact(100, 10_000);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn delay_is_capped() {
        let policy = exact(1000, 2000);
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(2000));
    }

    #[test]
    fn huge_attempt_saturates_at_cap() {
        let policy = exact(1, 64_000);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(64_000));
    }

    #[test]
    fn attempt_limit() {
        let policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 3,
            ..ReconnectConfig::default()
        });
        assert!(policy.allows(0));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn unlimited_attempts() {
        let policy = ReconnectPolicy::default();
        for attempt in [0, 1, 1000, u32::MAX] {
            assert!(policy.allows(attempt));
        }
    }

    #[test]
    fn jitter_bounds() {
        let policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        });

        for _ in 0..100 {
            let millis = policy.delay_for(0).as_millis();
            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms is above maximum 1100ms");
        }
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(attempt in 0u32..10_000, initial in 1u64..5_000, max in 1u64..120_000) {
            let policy = exact(initial, max);
            prop_assert!(policy.delay_for(attempt) <= Duration::from_millis(max));
        }

        #[test]
        fn delay_is_monotonic(attempt in 0u32..200) {
            let policy = exact(1, 64_000);
            prop_assert!(policy.delay_for(attempt) <= policy.delay_for(attempt + 1));
        }
    }
}
