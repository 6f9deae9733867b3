use std::time::Duration;

use client::{Client, ClientError, RequestOptions};
use config::ClientConfig;
use indoc::indoc;
use integration_tests::{MockUpstream, TestServer, upstream::PASSWORD};
use secrecy::SecretString;

const TWO_PER_MINUTE: &str = indoc! {r#"
    [admission.burst]
    enabled = false

    [admission.tiers.free]
    limit = 2
    window = "60s"
"#};

const GENEROUS: &str = indoc! {r#"
    [admission.burst]
    enabled = false

    [admission.tiers.free]
    limit = 100
    window = "60s"
"#};

fn client_config(server: &TestServer) -> ClientConfig {
    let mut config = ClientConfig::new(server.url());
    config.retry.base_delay = Duration::from_millis(20);
    config.attempt_timeout = Duration::from_secs(5);

    config
}

#[tokio::test]
async fn login_and_call_a_protected_endpoint() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(GENEROUS).await;
    let client = Client::new(client_config(&server)).unwrap();

    let error = client.get("/private").await.unwrap_err();
    assert!(matches!(error, ClientError::AuthRequired));

    client.login("alice", &SecretString::from(PASSWORD)).await.unwrap();

    let body: serde_json::Value = client.get("/private").await.unwrap().json().unwrap();
    assert_eq!(body["secret"], 42);

    client.logout().await;
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn rejected_credentials_are_cleared() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(GENEROUS).await;
    let client = Client::new(client_config(&server)).unwrap();

    client.credentials().set(SecretString::from("stale"));

    let error = client.get("/private").await.unwrap_err();

    assert!(matches!(error, ClientError::AuthExpired { ref message } if message.as_deref() == Some("Invalid token")));
    assert!(!client.is_authenticated());
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn server_rejection_surfaces_retry_after_without_retrying() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(TWO_PER_MINUTE).await;
    let client = Client::new(client_config(&server)).unwrap();

    for _ in 0..2 {
        client.request("/items", RequestOptions::get().without_auth()).await.unwrap();
    }

    let error = client
        .request("/items", RequestOptions::get().without_auth())
        .await
        .unwrap_err();

    let ClientError::RateLimited { message, retry_after } = error else {
        unreachable!("expected a server rejection, got {error:?}");
    };

    assert!(message.unwrap().contains("free tier"));
    assert!(retry_after.is_some_and(|wait| wait > Duration::from_secs(50)));
    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn transient_upstream_failures_are_retried() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(GENEROUS).await;
    let client = Client::new(client_config(&server)).unwrap();

    upstream.fail_next(2);

    let response = client
        .request("/flaky", RequestOptions::get().without_auth())
        .await
        .unwrap();

    let body: serde_json::Value = response.json().unwrap();

    assert_eq!(body["status"], "recovered");
    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn persistent_failures_stop_after_max_attempts() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(GENEROUS).await;
    let client = Client::new(client_config(&server)).unwrap();

    let error = client
        .request("/broken", RequestOptions::get().without_auth())
        .await
        .unwrap_err();

    assert!(matches!(error, ClientError::Transient { attempts: 3, .. }));
    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn self_throttle_spares_the_server() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(GENEROUS).await;

    let mut config = client_config(&server);
    config.throttle.limit = 2;

    let client = Client::new(config).unwrap();

    for _ in 0..2 {
        client.request("/items", RequestOptions::get().without_auth()).await.unwrap();
    }

    let error = client
        .request("/items", RequestOptions::get().without_auth())
        .await
        .unwrap_err();

    assert!(matches!(error, ClientError::RateLimitedLocally { .. }));
    assert_eq!(upstream.hits(), 2);
}
