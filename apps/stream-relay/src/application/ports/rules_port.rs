//! Rules Port (Driven Port)
//!
//! Interface for the provider's filtered stream rules API, plus the wire
//! types it exchanges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Rules API error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    /// The request never got a response.
    #[error("rules request failed: {0}")]
    Transport(String),

    /// The endpoint answered with a status other than the expected one.
    #[error("rules endpoint returned status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("rules response could not be decoded: {0}")]
    Decode(String),
}

/// A rule currently installed on the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Provider-assigned rule id.
    pub id: String,
    /// Filter expression.
    pub value: String,
    /// Optional label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// A rule to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRule {
    /// Filter expression.
    pub value: String,
    /// Optional label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl NewRule {
    /// Rule matching original posts (no retweets) from `handle`.
    #[must_use]
    pub fn from_account(handle: &str) -> Self {
        Self {
            value: format!("from:{handle} -is:retweet"),
            tag: None,
        }
    }
}

/// Response metadata shared by list and mutation responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RulesMeta {
    /// When the rules were last sent.
    #[serde(default)]
    pub sent: Option<String>,
    /// Number of rules listed.
    #[serde(default)]
    pub result_count: Option<u32>,
    /// Counts for a mutation.
    #[serde(default)]
    pub summary: Option<RulesSummary>,
}

/// Mutation counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RulesSummary {
    /// Rules created.
    #[serde(default)]
    pub created: u32,
    /// Rules not created.
    #[serde(default)]
    pub not_created: u32,
    /// Rules deleted.
    #[serde(default)]
    pub deleted: u32,
    /// Rules not deleted.
    #[serde(default)]
    pub not_deleted: u32,
}

/// `GET` rules response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RulesListing {
    /// Installed rules; absent when there are none.
    #[serde(default)]
    pub data: Option<Vec<Rule>>,
    /// Listing metadata.
    #[serde(default)]
    pub meta: Option<RulesMeta>,
}

impl RulesListing {
    /// Ids of every installed rule.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.data
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|rule| rule.id.clone())
            .collect()
    }
}

/// `POST` rules (add or delete) response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RulesMutation {
    /// Rules created by an add.
    #[serde(default)]
    pub data: Option<Vec<Rule>>,
    /// Mutation metadata.
    #[serde(default)]
    pub meta: Option<RulesMeta>,
}

impl RulesMutation {
    /// Mutation counts, zero when the provider omitted them.
    #[must_use]
    pub fn summary(&self) -> RulesSummary {
        self.meta
            .as_ref()
            .and_then(|meta| meta.summary)
            .unwrap_or_default()
    }
}

/// Port for managing stream rules.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RulesPort: Send + Sync {
    /// List installed rules. Expects status 200.
    async fn list_rules(&self) -> Result<RulesListing, RulesError>;

    /// Delete rules by id. Expects status 200.
    async fn delete_rules(&self, ids: Vec<String>) -> Result<RulesMutation, RulesError>;

    /// Add rules. Expects status 201.
    async fn add_rules(&self, rules: Vec<NewRule>) -> Result<RulesMutation, RulesError>;
}
