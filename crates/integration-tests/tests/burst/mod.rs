use indoc::indoc;
use integration_tests::{MockUpstream, TestServer};
use reqwest::Method;

const BURST_OF_THREE: &str = indoc! {r#"
    [admission.burst]
    limit = 3
    window = "10s"

    [admission.tiers.free]
    limit = 1000
    window = "15m"

    [admission.identity]
    user_header = "x-user-id"
    role_header = "x-user-role"
    tier_header = "x-user-tier"
    trust_forwarded_headers = true
"#};

#[tokio::test]
async fn burst_guard_rejects_before_the_tier_ceiling() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(BURST_OF_THREE).await;

    for _ in 0..3 {
        let response = server.client.get_as("/items", "alice", "203.0.113.5").await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-ratelimit-limit"], "1000");
    }

    let response = server.client.get_as("/items", "alice", "203.0.113.5").await;

    assert_eq!(response.status(), 429);
    assert_eq!(response.headers()["x-ratelimit-limit"], "3");

    let retry_after: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=10).contains(&retry_after));

    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(body["limit"], 3);
    assert_eq!(body["remaining"], 0);
    assert!(body["error"].as_str().unwrap().starts_with("Too many requests in a short period"));
}

#[tokio::test]
async fn burst_guard_is_keyed_by_network_identity() {
    let upstream = MockUpstream::start().await;
    let server = TestServer::builder().upstream(&upstream).build(BURST_OF_THREE).await;

    // Rotating user ids from one address does not escape the guard.
    for user in ["u1", "u2", "u3"] {
        let response = server.client.get_as("/items", user, "203.0.113.6").await;
        assert_eq!(response.status(), 200);
    }

    let response = server.client.get_as("/items", "u4", "203.0.113.6").await;
    assert_eq!(response.status(), 429);

    // Another address has its own window.
    let response = server.client.get_as("/items", "u1", "203.0.113.7").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn forged_forwarding_headers_share_the_socket_counter() {
    let upstream = MockUpstream::start().await;

    let config = indoc! {r#"
        [admission.burst]
        limit = 3
        window = "10s"
    "#};

    let server = TestServer::builder().upstream(&upstream).build(config).await;

    let forged = |n: usize| {
        server
            .client
            .request(Method::GET, "/items")
            .header("x-forwarded-for", format!("198.51.100.{n}"))
            .header("x-user-id", format!("user-{n}"))
            .header("x-user-role", "admin")
            .send()
    };

    for n in 0..3 {
        let response = forged(n).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    }

    let response = forged(3).await.unwrap();

    assert_eq!(response.status(), 429);
    assert_eq!(response.headers()["x-ratelimit-limit"], "3");
    assert_eq!(upstream.hits(), 3);
}
