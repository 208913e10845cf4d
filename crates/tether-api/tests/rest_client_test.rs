#![allow(clippy::unwrap_used)]
// Integration tests for `RestClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tether_api::{Error, Origin, RestClient, Snowflake};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = RestClient::with_client(reqwest::Client::new(), base_url, 10).unwrap();
    (server, client)
}

fn token(value: &str) -> SecretString {
    value.to_string().into()
}

async fn mount_me(server: &MockServer, bearer: &str) {
    Mock::given(method("GET"))
        .and(path("/v10/users/@me"))
        .and(header("Authorization", format!("Bot {bearer}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "80351110224678912",
            "username": "tether-bot",
            "discriminator": "0",
            "bot": true
        })))
        .mount(server)
        .await;
}

async fn logged_in() -> (MockServer, RestClient) {
    let (server, client) = setup().await;
    mount_me(&server, "good-token").await;
    client.login(token("good-token")).await.unwrap();
    (server, client)
}

// ── Authentication tests ────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let (server, client) = setup().await;
    mount_me(&server, "good-token").await;

    let me = client.login(token("good-token")).await.unwrap();

    assert_eq!(me.id, Snowflake::new(80_351_110_224_678_912));
    assert_eq!(me.username, "tether-bot");
    assert!(me.bot);
}

#[tokio::test]
async fn test_login_rejected_restores_previous_token() {
    let (server, client) = logged_in().await;

    Mock::given(method("GET"))
        .and(path("/v10/users/@me"))
        .and(header("Authorization", "Bot bad-token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "401: Unauthorized"})),
        )
        .mount(&server)
        .await;

    let result = client.login(token("bad-token")).await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );

    // The earlier token is still the one in use.
    let me = client.get_current_user().await.unwrap();
    assert_eq!(me.username, "tether-bot");
}

#[tokio::test]
async fn test_request_before_login_fails() {
    let (_server, client) = setup().await;
    let result = client.get_user(Snowflake::new(1)).await;
    assert!(matches!(result, Err(Error::MissingToken)));
}

// ── Entity tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_guild_with_counts() {
    let (server, client) = logged_in().await;

    Mock::given(method("GET"))
        .and(path("/v10/guilds/123"))
        .and(query_param("with_counts", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "123",
            "name": "g",
            "approximate_member_count": 42,
            "features": ["COMMUNITY"]
        })))
        .mount(&server)
        .await;

    let guild = client.get_guild(Snowflake::new(123), true).await.unwrap();
    assert_eq!(guild.name, "g");
    assert_eq!(guild.approximate_member_count, Some(42));
    assert!(guild.extra.contains_key("features"));
}

#[tokio::test]
async fn test_fetch_channel_returns_raw_json() {
    let (server, client) = logged_in().await;

    let body = json!({ "id": "555", "type": 0, "guild_id": "123", "name": "general" });
    Mock::given(method("GET"))
        .and(path("/v10/channels/555"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let raw = client.fetch_channel(Snowflake::new(555)).await.unwrap();
    assert_eq!(raw, body);
}

#[tokio::test]
async fn test_not_found() {
    let (server, client) = logged_in().await;

    Mock::given(method("GET"))
        .and(path("/v10/users/404"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Unknown User", "code": 10013})),
        )
        .mount(&server)
        .await;

    let err = client.get_user(Snowflake::new(404)).await.unwrap_err();
    assert!(err.is_not_found(), "expected NotFound, got: {err:?}");
}

#[tokio::test]
async fn test_rate_limit_is_surfaced_not_retried() {
    let (server, client) = logged_in().await;

    Mock::given(method("GET"))
        .and(path("/v10/users/7"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "message": "You are being rate limited.",
            "retry_after": 0.75,
            "global": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.get_user(Snowflake::new(7)).await.unwrap_err();
    match err {
        Error::RateLimited {
            retry_after_secs, ..
        } => assert!((retry_after_secs - 0.75).abs() < f64::EPSILON),
        other => panic!("expected RateLimited, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_keeps_status_and_message() {
    let (server, client) = logged_in().await;

    Mock::given(method("GET"))
        .and(path("/v10/guilds/9"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = client.fetch_guild(Snowflake::new(9)).await.unwrap_err();
    match err {
        Error::Http {
            status, message, ..
        } => {
            assert_eq!(status, 503);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("expected Http error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = logged_in().await;

    Mock::given(method("GET"))
        .and(path("/v10/users/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "5"})))
        .mount(&server)
        .await;

    let err = client.get_user(Snowflake::new(5)).await.unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }));
}

// ── Gateway discovery ───────────────────────────────────────────────

#[tokio::test]
async fn test_resolve_endpoint() {
    let (server, client) = logged_in().await;

    Mock::given(method("GET"))
        .and(path("/v10/gateway/bot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "wss://gateway.example.test",
            "shards": 2,
            "session_start_limit": { "total": 1000, "remaining": 999 }
        })))
        .mount(&server)
        .await;

    let endpoint = client.resolve_endpoint().await.unwrap();
    assert_eq!(
        endpoint.url.as_str(),
        "wss://gateway.example.test/?v=10&encoding=json"
    );
    assert_eq!(endpoint.shards, 2);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_closed_client_refuses_requests() {
    let (_server, client) = logged_in().await;

    Origin::close(&client).await;

    assert!(client.is_closed());
    let result = client.fetch_user(Snowflake::new(1)).await;
    assert!(matches!(result, Err(Error::Closed)));
}
