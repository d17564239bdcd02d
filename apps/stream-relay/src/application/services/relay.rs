//! Relay
//!
//! Top-level flow: install the stream rules, then hand over to the stream
//! manager.

use std::sync::Arc;

use crate::application::ports::ErrorReporter;

use super::rule_sync::{RuleSync, SetupError};
use super::stream_manager::{StreamError, StreamManager};

/// Why the relay stopped.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Rules could not be installed; the stream was never opened.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// The stream manager stopped on a failure.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Rules setup followed by the stream loop.
pub struct Relay {
    rule_sync: RuleSync,
    manager: StreamManager,
    reporter: Arc<dyn ErrorReporter>,
}

impl Relay {
    /// Create a relay.
    #[must_use]
    pub fn new(rule_sync: RuleSync, manager: StreamManager, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            rule_sync,
            manager,
            reporter,
        }
    }

    /// Sync rules, then stream from `retry_attempt = 0` until stopped.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Setup` if the rules could not be installed (after
    /// reporting it) and `RelayError::Stream` if the stream manager halts.
    pub async fn run(&self) -> Result<(), RelayError> {
        match self.rule_sync.sync().await {
            Ok(report) => {
                tracing::debug!(?report, "Rules setup complete");
            }
            Err(e) => {
                tracing::error!(error = %e, "Stream rules setup failed");
                self.reporter
                    .report("Stream rules setup failed:", &e.to_string())
                    .await;
                return Err(e.into());
            }
        }

        self.manager.run().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use mockall::Sequence;
    use mockall::predicate::eq;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::application::ports::{
        ChunkStream, DeliveryError, MockRulesPort, NewRule, PostSink, Rule, RulesError,
        RulesListing, RulesMutation, StreamTransport, Timer, TransportError,
    };
    use crate::application::services::{StreamEvent, StreamManagerConfig, StreamPorts};

    /// Counts opens and cancels the run on the first one.
    struct OneShotTransport {
        opens: Mutex<u32>,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl StreamTransport for OneShotTransport {
        async fn open(&self) -> Result<ChunkStream, TransportError> {
            *self.opens.lock() += 1;
            self.cancel.cancel();
            Ok(Box::pin(futures_util::stream::pending()))
        }
    }

    struct NullSink;

    #[async_trait]
    impl PostSink for NullSink {
        async fn send(&self, _content: &str) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        reports: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ErrorReporter for RecordingReporter {
        async fn report(&self, context: &str, _detail: &str) {
            self.reports.lock().push(context.to_string());
        }
    }

    struct ImmediateTimer;

    #[async_trait]
    impl Timer for ImmediateTimer {
        async fn sleep(&self, _duration: Duration) {}
    }

    struct Fixture {
        relay: Relay,
        transport: Arc<OneShotTransport>,
        reporter: Arc<RecordingReporter>,
        events: mpsc::Receiver<StreamEvent>,
    }

    fn fixture(rules: MockRulesPort) -> Fixture {
        let cancel = CancellationToken::new();
        let transport = Arc::new(OneShotTransport {
            opens: Mutex::new(0),
            cancel: cancel.clone(),
        });
        let reporter = Arc::new(RecordingReporter::default());
        let (event_tx, events) = mpsc::channel(64);

        let ports = StreamPorts {
            transport: transport.clone(),
            sink: Arc::new(NullSink),
            reporter: reporter.clone(),
            timer: Arc::new(ImmediateTimer),
        };
        let manager = StreamManager::new(
            StreamManagerConfig::new("cream", "https://twitter.com"),
            ports,
            event_tx,
            cancel,
        );
        let rule_sync = RuleSync::new(Arc::new(rules), reporter.clone(), "cream");

        Fixture {
            relay: Relay::new(rule_sync, manager, reporter.clone()),
            transport,
            reporter,
            events,
        }
    }

    fn rule(id: &str) -> Rule {
        Rule {
            id: id.to_string(),
            value: "from:old -is:retweet".to_string(),
            tag: None,
        }
    }

    #[tokio::test]
    async fn syncs_rules_then_connects_from_zero() {
        let mut seq = Sequence::new();
        let mut rules = MockRulesPort::new();
        rules
            .expect_list_rules()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Ok(RulesListing {
                    data: Some(vec![rule("111"), rule("222")]),
                    meta: None,
                })
            });
        rules
            .expect_delete_rules()
            .with(eq(vec!["111".to_string(), "222".to_string()]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(RulesMutation::default()));
        rules
            .expect_add_rules()
            .with(eq(vec![NewRule::from_account("cream")]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(RulesMutation::default()));

        let mut f = fixture(rules);
        f.relay.run().await.unwrap();

        assert_eq!(*f.transport.opens.lock(), 1);
        assert_eq!(
            f.events.try_recv().ok(),
            Some(StreamEvent::Connecting { retry_attempt: 0 })
        );
        assert!(f.reporter.reports.lock().is_empty());
    }

    #[tokio::test]
    async fn setup_failure_is_reported_and_stream_never_opens() {
        let mut rules = MockRulesPort::new();
        rules
            .expect_list_rules()
            .returning(|| Err(RulesError::Transport("dns error".to_string())));

        let mut f = fixture(rules);
        let result = f.relay.run().await;

        assert!(matches!(result, Err(RelayError::Setup(SetupError::List(_)))));
        assert_eq!(*f.transport.opens.lock(), 0);
        assert!(f.events.try_recv().is_err());
        assert_eq!(
            *f.reporter.reports.lock(),
            vec!["Stream rules setup failed:".to_string()]
        );
    }
}
