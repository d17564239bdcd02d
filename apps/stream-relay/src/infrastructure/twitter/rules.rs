//! Stream Rules Client
//!
//! `GET` / `POST` against `/2/tweets/search/stream/rules`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{NewRule, RulesError, RulesListing, RulesMutation, RulesPort};
use crate::infrastructure::config::{Secret, TwitterSettings};

use super::USER_AGENT;

/// Timeout for each rules request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    delete: DeleteIds<'a>,
}

#[derive(Debug, Serialize)]
struct DeleteIds<'a> {
    ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    add: &'a [NewRule],
}

/// Client for the stream rules endpoint.
#[derive(Debug, Clone)]
pub struct RulesClient {
    client: Client,
    rules_url: String,
    bearer_token: Secret,
}

impl RulesClient {
    /// Create a client from Twitter settings.
    ///
    /// # Errors
    ///
    /// Returns `RulesError::Transport` if the HTTP client cannot be built.
    pub fn new(settings: &TwitterSettings) -> Result<Self, RulesError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RulesError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            rules_url: settings.rules_url(),
            bearer_token: settings.bearer_token.clone(),
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        expected: StatusCode,
    ) -> Result<T, RulesError> {
        let response = request
            .bearer_auth(self.bearer_token.expose())
            .send()
            .await
            .map_err(|e| RulesError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RulesError::Transport(e.to_string()))?;

        if status != expected {
            return Err(RulesError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| RulesError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RulesPort for RulesClient {
    async fn list_rules(&self) -> Result<RulesListing, RulesError> {
        self.execute(self.client.get(&self.rules_url), StatusCode::OK)
            .await
    }

    async fn delete_rules(&self, ids: Vec<String>) -> Result<RulesMutation, RulesError> {
        let body = DeleteRequest {
            delete: DeleteIds { ids: &ids },
        };
        self.execute(self.client.post(&self.rules_url).json(&body), StatusCode::OK)
            .await
    }

    async fn add_rules(&self, rules: Vec<NewRule>) -> Result<RulesMutation, RulesError> {
        let body = AddRequest { add: &rules };
        self.execute(
            self.client.post(&self.rules_url).json(&body),
            StatusCode::CREATED,
        )
        .await
    }
}
