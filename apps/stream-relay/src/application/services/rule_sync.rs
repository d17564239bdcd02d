//! Rule Sync
//!
//! Replaces whatever rules are installed on the filtered stream with the
//! single account filter the relay needs.

use std::sync::Arc;

use crate::application::ports::{ErrorReporter, NewRule, RulesError, RulesPort, RulesSummary};

/// Rules setup failure that prevents the stream from starting.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Listing installed rules failed.
    #[error("failed to list stream rules: {0}")]
    List(RulesError),

    /// Deleting installed rules failed.
    #[error("failed to delete stream rules: {0}")]
    Delete(RulesError),

    /// Adding the account filter failed.
    #[error("failed to add stream rules: {0}")]
    Add(RulesError),
}

/// Outcome of a rules sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSyncReport {
    /// Ids of the rules that were installed before the sync.
    pub removed_ids: Vec<String>,
    /// Provider counts for the delete, if one was sent.
    pub deleted: Option<RulesSummary>,
    /// Provider counts for the add.
    pub added: RulesSummary,
    /// The filter that was installed.
    pub rule: NewRule,
}

/// Installs the account filter on the stream.
pub struct RuleSync {
    rules: Arc<dyn RulesPort>,
    reporter: Arc<dyn ErrorReporter>,
    account_handle: String,
}

impl RuleSync {
    /// Create a rule sync for `account_handle`.
    #[must_use]
    pub fn new(
        rules: Arc<dyn RulesPort>,
        reporter: Arc<dyn ErrorReporter>,
        account_handle: impl Into<String>,
    ) -> Self {
        Self {
            rules,
            reporter,
            account_handle: account_handle.into(),
        }
    }

    /// List, delete and re-add the stream rules.
    ///
    /// An unexpected status from any step is reported and setup carries on;
    /// an unexpected listing status counts as "no rules installed".
    ///
    /// # Errors
    ///
    /// Returns `SetupError` when a request fails outright or its body cannot
    /// be decoded.
    pub async fn sync(&self) -> Result<RuleSyncReport, SetupError> {
        let removed_ids = match self.rules.list_rules().await {
            Ok(listing) => listing.ids(),
            Err(e @ RulesError::UnexpectedStatus { .. }) => {
                self.report_status("Failed to list stream rules:", &e).await;
                Vec::new()
            }
            Err(e) => return Err(SetupError::List(e)),
        };
        tracing::debug!(count = removed_ids.len(), "Listed stream rules");

        let deleted = if removed_ids.is_empty() {
            None
        } else {
            match self.rules.delete_rules(removed_ids.clone()).await {
                Ok(mutation) => Some(mutation.summary()),
                Err(e @ RulesError::UnexpectedStatus { .. }) => {
                    self.report_status("Failed to delete stream rules:", &e)
                        .await;
                    None
                }
                Err(e) => return Err(SetupError::Delete(e)),
            }
        };

        let rule = NewRule::from_account(&self.account_handle);
        let added = match self.rules.add_rules(vec![rule.clone()]).await {
            Ok(mutation) => mutation.summary(),
            Err(e @ RulesError::UnexpectedStatus { .. }) => {
                self.report_status("Failed to add stream rules:", &e).await;
                RulesSummary::default()
            }
            Err(e) => return Err(SetupError::Add(e)),
        };

        tracing::info!(
            rule = %rule.value,
            removed = removed_ids.len(),
            created = added.created,
            "Stream rules synced"
        );

        Ok(RuleSyncReport {
            removed_ids,
            deleted,
            added,
            rule,
        })
    }

    async fn report_status(&self, context: &str, error: &RulesError) {
        tracing::warn!(error = %error, "{context}");
        self.reporter.report(context, &error.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{MockRulesPort, Rule, RulesListing, RulesMeta, RulesMutation};

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

    fn listing(ids: &[&str]) -> RulesListing {
        RulesListing {
            data: Some(
                ids.iter()
                    .map(|id| Rule {
                        id: (*id).to_string(),
                        value: "from:someone".to_string(),
                        tag: None,
                    })
                    .collect(),
            ),
            meta: None,
        }
    }

    fn summary(created: u32, deleted: u32) -> RulesMutation {
        RulesMutation {
            data: None,
            meta: Some(RulesMeta {
                summary: Some(RulesSummary {
                    created,
                    deleted,
                    ..RulesSummary::default()
                }),
                ..RulesMeta::default()
            }),
        }
    }

    fn unexpected(status: u16) -> RulesError {
        RulesError::UnexpectedStatus {
            status,
            body: "{}".to_string(),
        }
    }

    fn sync_with(rules: MockRulesPort) -> (RuleSync, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let sync = RuleSync::new(Arc::new(rules), reporter.clone(), "cream");
        (sync, reporter)
    }

    #[tokio::test]
    async fn replaces_existing_rules() {
        let mut rules = MockRulesPort::new();
        rules
            .expect_list_rules()
            .times(1)
            .returning(|| Ok(listing(&["1", "2"])));
        rules
            .expect_delete_rules()
            .with(eq(vec!["1".to_string(), "2".to_string()]))
            .times(1)
            .returning(|_| Ok(summary(0, 2)));
        rules
            .expect_add_rules()
            .with(eq(vec![NewRule::from_account("cream")]))
            .times(1)
            .returning(|_| Ok(summary(1, 0)));

        let (sync, reporter) = sync_with(rules);
        let report = sync.sync().await.unwrap();

        assert_eq!(report.removed_ids, vec!["1", "2"]);
        assert_eq!(report.deleted.map(|s| s.deleted), Some(2));
        assert_eq!(report.added.created, 1);
        assert_eq!(report.rule.value, "from:cream -is:retweet");
        assert!(reporter.reports.lock().is_empty());
    }

    #[tokio::test]
    async fn skips_delete_when_no_rules() {
        let mut rules = MockRulesPort::new();
        rules
            .expect_list_rules()
            .returning(|| Ok(RulesListing::default()));
        rules.expect_delete_rules().never();
        rules
            .expect_add_rules()
            .times(1)
            .returning(|_| Ok(summary(1, 0)));

        let (sync, _) = sync_with(rules);
        let report = sync.sync().await.unwrap();

        assert!(report.removed_ids.is_empty());
        assert_eq!(report.deleted, None);
    }

    #[tokio::test]
    async fn unexpected_statuses_are_reported_and_setup_continues() {
        let mut rules = MockRulesPort::new();
        rules
            .expect_list_rules()
            .returning(|| Err(unexpected(503)));
        rules.expect_delete_rules().never();
        rules
            .expect_add_rules()
            .times(1)
            .returning(|_| Err(unexpected(200)));

        let (sync, reporter) = sync_with(rules);
        let report = sync.sync().await.unwrap();

        assert_eq!(report.added, RulesSummary::default());
        assert_eq!(
            *reporter.reports.lock(),
            vec![
                "Failed to list stream rules:".to_string(),
                "Failed to add stream rules:".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn unexpected_delete_status_continues_to_add() {
        let mut rules = MockRulesPort::new();
        rules
            .expect_list_rules()
            .returning(|| Ok(listing(&["7"])));
        rules
            .expect_delete_rules()
            .returning(|_| Err(unexpected(400)));
        rules
            .expect_add_rules()
            .times(1)
            .returning(|_| Ok(summary(1, 0)));

        let (sync, reporter) = sync_with(rules);
        let report = sync.sync().await.unwrap();

        assert_eq!(report.deleted, None);
        assert_eq!(reporter.reports.lock().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_a_setup_error() {
        let mut rules = MockRulesPort::new();
        rules
            .expect_list_rules()
            .returning(|| Err(RulesError::Transport("connection refused".to_string())));
        rules.expect_add_rules().never();

        let (sync, _) = sync_with(rules);
        let err = sync.sync().await.unwrap_err();

        assert!(matches!(err, SetupError::List(RulesError::Transport(_))));
    }

    #[tokio::test]
    async fn undecodable_add_response_is_a_setup_error() {
        let mut rules = MockRulesPort::new();
        rules
            .expect_list_rules()
            .returning(|| Ok(RulesListing::default()));
        rules
            .expect_add_rules()
            .returning(|_| Err(RulesError::Decode("expected value".to_string())));

        let (sync, _) = sync_with(rules);

        assert!(matches!(
            sync.sync().await,
            Err(SetupError::Add(RulesError::Decode(_)))
        ));
    }
}
