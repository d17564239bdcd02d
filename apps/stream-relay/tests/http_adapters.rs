//! HTTP Adapter Integration Tests
//!
//! Exercises the Twitter and Discord clients against a mock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stream_relay::application::ports::{
    DeliveryError, NewRule, PostSink, RulesError, RulesPort, StreamTransport, TransportError,
};
use stream_relay::infrastructure::discord::{DiscordChannel, DiscordClient};
use stream_relay::infrastructure::twitter::{FilteredStreamClient, RulesClient, USER_AGENT};
use stream_relay::{DiscordSettings, Secret, TwitterSettings};

fn twitter_settings(server: &MockServer) -> TwitterSettings {
    TwitterSettings {
        bearer_token: Secret::new("test-bearer".to_string()),
        account_handle: "cream".to_string(),
        api_base_url: server.uri(),
        status_url_base: "https://twitter.com".to_string(),
    }
}

fn discord_settings(server: &MockServer) -> DiscordSettings {
    DiscordSettings {
        bot_token: Secret::new("test-bot".to_string()),
        posts_channel_id: "111".to_string(),
        log_channel_id: None,
        api_base_url: server.uri(),
    }
}

// =============================================================================
// Filtered Stream
// =============================================================================

#[tokio::test]
async fn stream_body_is_framed_per_line() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/stream"))
        .and(header("Authorization", "Bearer test-bearer"))
        .and(header("User-Agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string("\r\n{\"a\":1}\r\n{\"b\":2}\r\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = FilteredStreamClient::new(&twitter_settings(&server)).unwrap();
    let chunks: Vec<_> = client.open().await.unwrap().collect().await;

    let lines: Vec<Vec<u8>> = chunks.into_iter().map(|c| c.unwrap().to_vec()).collect();
    assert!(lines.contains(&b"{\"a\":1}".to_vec()));
    assert!(lines.contains(&b"{\"b\":2}".to_vec()));
}

#[tokio::test]
async fn stream_error_status_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/stream"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let client = FilteredStreamClient::new(&twitter_settings(&server)).unwrap();
    let Err(error) = client.open().await else {
        panic!("expected a status error");
    };

    assert_eq!(
        error,
        TransportError::Status {
            status: 401,
            body: "Unauthorized".to_string()
        }
    );
}

#[tokio::test]
async fn unreachable_stream_is_a_connect_error() {
    let server = MockServer::start().await;
    let settings = twitter_settings(&server);
    drop(server);

    let client = FilteredStreamClient::new(&settings).unwrap();
    let Err(error) = client.open().await else {
        panic!("expected a connect error");
    };

    assert!(matches!(
        error,
        TransportError::Connect(_) | TransportError::Reset(_)
    ));
}

// =============================================================================
// Rules
// =============================================================================

#[tokio::test]
async fn lists_installed_rules() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/stream/rules"))
        .and(header("Authorization", "Bearer test-bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "7", "value": "from:cream -is:retweet", "tag": "cream"}],
            "meta": {"sent": "2024-01-01T00:00:00.000Z", "result_count": 1}
        })))
        .mount(&server)
        .await;

    let client = RulesClient::new(&twitter_settings(&server)).unwrap();
    let listing = client.list_rules().await.unwrap();

    assert_eq!(listing.ids(), vec!["7".to_string()]);
    assert_eq!(listing.meta.and_then(|m| m.result_count), Some(1));
}

#[tokio::test]
async fn add_requires_created_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets/search/stream/rules"))
        .and(body_json(json!({"add": [{"value": "from:cream -is:retweet"}]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"meta": {"summary": {"created": 0}}})),
        )
        .mount(&server)
        .await;

    let client = RulesClient::new(&twitter_settings(&server)).unwrap();
    let result = client.add_rules(vec![NewRule::from_account("cream")]).await;

    assert!(matches!(
        result,
        Err(RulesError::UnexpectedStatus { status: 200, .. })
    ));
}

#[tokio::test]
async fn delete_reports_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets/search/stream/rules"))
        .and(body_json(json!({"delete": {"ids": ["7"]}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"sent": "2024-01-01T00:00:00.000Z", "summary": {"deleted": 1, "not_deleted": 0}}
        })))
        .mount(&server)
        .await;

    let client = RulesClient::new(&twitter_settings(&server)).unwrap();
    let mutation = client.delete_rules(vec!["7".to_string()]).await.unwrap();

    assert_eq!(mutation.summary().deleted, 1);
}

// =============================================================================
// Discord
// =============================================================================

#[tokio::test]
async fn posts_message_as_bot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/111/messages"))
        .and(header("Authorization", "Bot test-bot"))
        .and(header_exists("Content-Type"))
        .and(body_json(json!({"content": "https://twitter.com/cream/status/1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m1"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(DiscordClient::new(&discord_settings(&server)).unwrap());
    let channel = DiscordChannel::new(client, "111");

    channel
        .send("https://twitter.com/cream/status/1")
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_channel_is_reported_as_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/404/messages"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Unknown Channel"})))
        .mount(&server)
        .await;

    let client = Arc::new(DiscordClient::new(&discord_settings(&server)).unwrap());
    let result = DiscordChannel::new(client, "404").send("hi").await;

    assert_eq!(result, Err(DeliveryError::ChannelNotFound("404".to_string())));
}

#[tokio::test]
async fn rejected_message_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/111/messages"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Missing Access"))
        .mount(&server)
        .await;

    let client = Arc::new(DiscordClient::new(&discord_settings(&server)).unwrap());
    let result = DiscordChannel::new(client, "111").send("hi").await;

    assert!(matches!(
        result,
        Err(DeliveryError::Rejected { status: 403, ref body }) if body == "Missing Access"
    ));
}
